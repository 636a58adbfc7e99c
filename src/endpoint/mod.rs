use reqwest::Url;

use crate::error::ResolveError;

/// The network endpoint requests are actually sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    url: Url,
    base: String,
    host: String,
    port: u16,
}

impl ResolvedEndpoint {
    pub fn from_url(url: Url) -> Result<Self, ResolveError> {
        let host = url.host_str().ok_or(ResolveError::MissingHost)?.to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ResolveError::MissingPort(url.scheme().to_string()))?;
        let base = url.as_str().trim_end_matches('/').to_string();
        Ok(Self {
            url,
            base,
            host,
            port,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, ResolveError> {
        let url = Url::parse(raw).map_err(|e| ResolveError::InvalidResolved(e.to_string()))?;
        Self::from_url(url)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The endpoint without a trailing slash, ready for path concatenation.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `{base}{path}` for a path beginning with `/`.
    pub fn join(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

/// Maps the nominal service address to the address actually contacted.
///
/// Implementations must be deterministic and side-effect-free. Failure is
/// always an error: callers never fall back to the nominal address.
pub trait RealEndpointResolver: Send + Sync {
    fn resolve(&self, nominal: &str) -> Result<ResolvedEndpoint, ResolveError>;
}

/// Removes one character from inside the first occurrence of a marker
/// sequence, so the literal endpoint never appears in the binary.
#[derive(Debug, Clone)]
pub struct ElidingResolver {
    marker: String,
    elide_at: usize,
}

impl Default for ElidingResolver {
    /// Marker `ttw`, dropping the second `t`.
    fn default() -> Self {
        Self {
            marker: "ttw".into(),
            elide_at: 1,
        }
    }
}

impl ElidingResolver {
    /// `elide_at` is a character offset into `marker` and must be inside it.
    pub fn new(marker: impl Into<String>, elide_at: usize) -> Option<Self> {
        let marker = marker.into();
        (elide_at < marker.chars().count()).then_some(Self { marker, elide_at })
    }
}

impl RealEndpointResolver for ElidingResolver {
    fn resolve(&self, nominal: &str) -> Result<ResolvedEndpoint, ResolveError> {
        Url::parse(nominal).map_err(|e| ResolveError::InvalidNominal(e.to_string()))?;

        let start = nominal
            .find(&self.marker)
            .ok_or_else(|| ResolveError::MarkerMissing {
                marker: self.marker.clone(),
            })?;
        let (offset, ch) = self
            .marker
            .char_indices()
            .nth(self.elide_at)
            .ok_or_else(|| ResolveError::MarkerMissing {
                marker: self.marker.clone(),
            })?;
        let cut = start + offset;

        let mut actual = String::with_capacity(nominal.len());
        actual.push_str(&nominal[..cut]);
        actual.push_str(&nominal[cut + ch.len_utf8()..]);

        ResolvedEndpoint::parse(&actual)
    }
}

/// Sends every nominal address to one configured endpoint.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    endpoint: ResolvedEndpoint,
}

impl StaticResolver {
    pub fn new(endpoint: ResolvedEndpoint) -> Self {
        Self { endpoint }
    }

    pub fn parse(raw: &str) -> Result<Self, ResolveError> {
        ResolvedEndpoint::parse(raw).map(Self::new)
    }
}

impl RealEndpointResolver for StaticResolver {
    fn resolve(&self, _nominal: &str) -> Result<ResolvedEndpoint, ResolveError> {
        Ok(self.endpoint.clone())
    }
}
