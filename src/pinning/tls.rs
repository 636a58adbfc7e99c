use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use super::types::Fingerprint;
use crate::error::PinError;

fn provider() -> Arc<CryptoProvider> {
    Arc::new(ring::default_provider())
}

/// Mozilla's root set, as shipped by `webpki-roots`.
pub fn web_pki_roots() -> RootCertStore {
    RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    }
}

/// Client config with ordinary chain and hostname validation against `roots`.
pub fn standard_client_config(roots: Arc<RootCertStore>) -> Result<ClientConfig, PinError> {
    Ok(ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| PinError::TlsSetup(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth())
}

/// Client config that additionally requires one of `fingerprints` in every
/// chain it accepts.
pub fn pinned_client_config(
    roots: Arc<RootCertStore>,
    fingerprints: Vec<Fingerprint>,
) -> Result<ClientConfig, PinError> {
    let verifier = PinnedServerVerifier::new(roots, fingerprints)?;
    Ok(ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| PinError::TlsSetup(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth())
}

/// Certificate verifier applied on the connection that carries the request.
///
/// The chain is first validated against the roots and the server name; only
/// then are fingerprints compared, so the pin narrows trust and never widens
/// it. A handshake that fails here never sends a byte of the request.
#[derive(Debug)]
pub struct PinnedServerVerifier {
    chain: Arc<WebPkiServerVerifier>,
    fingerprints: Vec<Fingerprint>,
}

impl PinnedServerVerifier {
    pub fn new(roots: Arc<RootCertStore>, fingerprints: Vec<Fingerprint>) -> Result<Self, PinError> {
        if fingerprints.is_empty() {
            return Err(PinError::TlsSetup("no fingerprints to pin".into()));
        }
        let chain = WebPkiServerVerifier::builder_with_provider(roots, provider())
            .build()
            .map_err(|e| PinError::TlsSetup(e.to_string()))?;
        Ok(Self {
            chain,
            fingerprints,
        })
    }

    fn pinned<'a>(&self, mut presented: impl Iterator<Item = &'a CertificateDer<'a>>) -> bool {
        presented.any(|der| self.fingerprints.contains(&Fingerprint::of_der(der)))
    }
}

impl ServerCertVerifier for PinnedServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        self.chain
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)?;

        if self.pinned(std::iter::once(end_entity).chain(intermediates)) {
            Ok(ServerCertVerified::assertion())
        } else {
            tracing::warn!(server = ?server_name, "presented chain does not carry a pinned certificate");
            Err(rustls::Error::General(PinError::FingerprintMismatch.to_string()))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.chain.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.chain.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.chain.supported_verify_schemes()
    }
}
