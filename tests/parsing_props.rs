use proptest::prelude::*;

use covert_imagegen::{normalize_image_url, Fingerprint, ResolvedEndpoint};

fn arb_path() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z0-9_-]{1,8}", 1..=4).prop_map(|segments| segments.join("/"))
}

fn arb_base() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just("http"), Just("https")],
        "[a-z]{1,10}",
        prop::option::of(1024u16..=65535),
    )
        .prop_map(|(scheme, host, port)| match port {
            Some(port) => format!("{scheme}://{host}.test:{port}"),
            None => format!("{scheme}://{host}.test"),
        })
}

proptest! {
    #[test]
    fn rooted_path_is_appended_to_base(base in arb_base(), path in arb_path()) {
        let endpoint = ResolvedEndpoint::parse(&base).unwrap();
        let url = normalize_image_url(&format!("/{path}"), &endpoint).unwrap();
        prop_assert_eq!(url.as_str(), format!("{base}/{path}"));
    }

    #[test]
    fn bare_path_matches_rooted_path(base in arb_base(), path in arb_path()) {
        // A bare `http...` body is taken as an absolute URL.
        prop_assume!(!path.starts_with("http"));
        let endpoint = ResolvedEndpoint::parse(&base).unwrap();
        prop_assert_eq!(
            normalize_image_url(&path, &endpoint),
            normalize_image_url(&format!("/{path}"), &endpoint)
        );
    }

    #[test]
    fn quoting_and_whitespace_are_ignored(
        base in arb_base(),
        path in arb_path(),
        lead in "[ \t\n]{0,3}",
        trail in "[ \t\n]{0,3}",
    ) {
        let endpoint = ResolvedEndpoint::parse(&base).unwrap();
        let plain = normalize_image_url(&format!("/{path}"), &endpoint);
        let wrapped = normalize_image_url(&format!("{lead}\"/{path}\"{trail}"), &endpoint);
        prop_assert_eq!(plain, wrapped);
    }

    #[test]
    fn arbitrary_bodies_never_panic(body in ".{0,64}") {
        let endpoint = ResolvedEndpoint::parse("https://svc.test").unwrap();
        let _ = normalize_image_url(&body, &endpoint);
    }

    #[test]
    fn fingerprint_text_forms_agree(bytes in prop::array::uniform32(any::<u8>())) {
        let fp = Fingerprint::from_bytes(bytes);
        prop_assert_eq!(Fingerprint::parse(&fp.to_string()).unwrap(), fp);
        prop_assert_eq!(Fingerprint::parse(&hex::encode(bytes)).unwrap(), fp);
    }

    #[test]
    fn arbitrary_pins_never_panic(raw in ".{0,80}") {
        let _ = Fingerprint::parse(&raw);
    }
}
