use std::sync::Arc;

use super::{ProcessEnv, ProxySource};

/// Settings whose presence indicates traffic may be routed through a proxy.
///
/// Covers the conventional environment variables in both cases plus the
/// JVM-style host/port properties some launchers export. `NO_PROXY` is an
/// exclusion list and is not inspected.
pub const PROXY_SETTINGS: &[&str] = &[
    "HTTP_PROXY",
    "http_proxy",
    "HTTPS_PROXY",
    "https_proxy",
    "ALL_PROXY",
    "all_proxy",
    "SOCKS_PROXY",
    "socks_proxy",
    "http.proxyHost",
    "http.proxyPort",
    "https.proxyHost",
    "https.proxyPort",
    "socksProxyHost",
    "socksProxyPort",
];

/// Inspects network configuration for signs of an interposed proxy.
///
/// False positives are acceptable, false negatives are not: a setting counts
/// as soon as it exists, whatever its value, and any unreadable setting
/// counts as a proxy.
#[derive(Clone)]
pub struct ProxyInspector {
    source: Arc<dyn ProxySource>,
}

impl Default for ProxyInspector {
    fn default() -> Self {
        Self::new(Arc::new(ProcessEnv))
    }
}

impl ProxyInspector {
    pub fn new(source: Arc<dyn ProxySource>) -> Self {
        Self { source }
    }

    pub fn suspicious_proxy_present(&self) -> bool {
        for key in PROXY_SETTINGS {
            match self.source.lookup(key) {
                Ok(Some(value)) => {
                    tracing::warn!(setting = %key, empty = value.trim().is_empty(), "proxy setting present");
                    return true;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "proxy inspection failed, assuming proxy");
                    return true;
                }
            }
        }
        false
    }
}
