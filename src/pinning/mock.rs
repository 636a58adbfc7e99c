use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::types::{CertificatePin, Fingerprint};
use super::CertificateVerifier;
use crate::error::PinError;

/// Mock verifier for testing. Pretends to connect and presents a fixed chain.
///
/// # Security Warning
///
/// No network connection is made and nothing is proven about the peer. Enable
/// it only via `features = ["mock"]` for development and testing.
pub struct MockVerifier {
    behavior: Behavior,
    connections: AtomicUsize,
}

enum Behavior {
    Present(Vec<Fingerprint>),
    FailHandshake,
}

impl MockVerifier {
    /// A host presenting a chain with these certificate fingerprints.
    pub fn presenting(chain: Vec<Fingerprint>) -> Self {
        Self {
            behavior: Behavior::Present(chain),
            connections: AtomicUsize::new(0),
        }
    }

    /// A host whose TLS handshake always fails.
    pub fn failing_handshake() -> Self {
        Self {
            behavior: Behavior::FailHandshake,
            connections: AtomicUsize::new(0),
        }
    }

    /// Number of simulated connections opened so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CertificateVerifier for MockVerifier {
    async fn verify(&self, host: &str, _port: u16, pin: &CertificatePin) -> Result<(), PinError> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        pin.check_host(host)?;
        match &self.behavior {
            Behavior::FailHandshake => Err(PinError::Handshake("connection reset by peer".into())),
            Behavior::Present(chain) => {
                if chain.iter().any(|fp| pin.matches(fp)) {
                    Ok(())
                } else {
                    Err(PinError::FingerprintMismatch)
                }
            }
        }
    }
}
