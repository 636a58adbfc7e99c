pub mod tls;
pub mod types;
pub mod validator;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(feature = "live-tls")]
pub mod live;

use async_trait::async_trait;

use crate::error::PinError;
use types::CertificatePin;

/// Checks the certificate chain a live host presents against a pin.
///
/// Implementations must open a real connection to `host:port`; a statically
/// bundled certificate proves nothing about the path to the server.
#[async_trait]
pub trait CertificateVerifier: Send + Sync {
    async fn verify(&self, host: &str, port: u16, pin: &CertificatePin) -> Result<(), PinError>;
}
