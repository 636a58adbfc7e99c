use std::io;

/// Errors from mapping a nominal service address to the real endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("invalid nominal url: {0}")]
    InvalidNominal(String),

    #[error("marker sequence {marker:?} not present in nominal url")]
    MarkerMissing { marker: String },

    #[error("resolved url is invalid: {0}")]
    InvalidResolved(String),

    #[error("resolved url has no host")]
    MissingHost,

    #[error("resolved url has no port and no known default for scheme {0:?}")]
    MissingPort(String),
}

/// Errors from certificate pin parsing and live verification.
#[derive(Debug, thiserror::Error)]
pub enum PinError {
    #[error("malformed pin: {0}")]
    Malformed(String),

    #[error("unsupported pin algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("pin is for host {pinned:?}, endpoint is {actual:?}")]
    HostMismatch { pinned: String, actual: String },

    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    #[error("peer presented no certificate chain")]
    NoPeerChain,

    #[error("no certificate in the presented chain matches the pin")]
    FingerprintMismatch,

    #[error("verification timed out")]
    Timeout,

    #[error("TLS setup failed: {0}")]
    TlsSetup(String),

    #[error("verification task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Failure of a single authentication or image request.
///
/// These never cross the batch boundary; they are logged and collapsed to an
/// absent result.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("malformed response body: {0}")]
    MalformedBody(String),

    #[error("response carried no signature")]
    MissingSignature,

    #[error("request timed out")]
    Timeout,
}

impl From<reqwest::Error> for AttemptError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout
        } else if let Some(status) = value.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Request(value.to_string())
        }
    }
}

/// Errors from assembling a [`ClientConfig`](crate::config::ClientConfig) or
/// a [`KeyPool`](crate::keys::KeyPool).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("key pool is empty")]
    EmptyPool,

    #[error("key pool entry {index} is not an alphanumeric token")]
    InvalidToken { index: usize },

    #[error("no certificate fingerprints configured")]
    NoPins,

    #[error("invalid range for {name}: {min}..={max}")]
    InvalidRange {
        name: &'static str,
        min: u64,
        max: u64,
    },

    #[error("{0} must be > 0")]
    Zero(&'static str),

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid base url: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Pin(#[from] PinError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors surfaced by [`CovertClient::startup`](crate::client::CovertClient::startup).
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("host reported a compromised device")]
    DeviceCompromised,
}

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Pin(#[from] PinError),

    #[error(transparent)]
    Attempt(#[from] AttemptError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Startup(#[from] StartupError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
