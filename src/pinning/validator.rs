use std::sync::Arc;

use tokio::sync::Mutex;

use super::types::{CertificatePin, Fingerprint};
use super::CertificateVerifier;
use crate::endpoint::ResolvedEndpoint;

/// Process-lifetime cache in front of a [`CertificateVerifier`].
///
/// The first call opens a connection; every later call returns the cached
/// verdict until [`invalidate`](Self::invalidate). Concurrent first callers
/// wait on the same check instead of each connecting. Any error is a failed
/// verification.
pub struct CertificateValidator {
    verifier: Arc<dyn CertificateVerifier>,
    fingerprints: Vec<Fingerprint>,
    verdict: Mutex<Option<bool>>,
}

impl CertificateValidator {
    pub fn new(verifier: Arc<dyn CertificateVerifier>, fingerprints: Vec<Fingerprint>) -> Self {
        Self {
            verifier,
            fingerprints,
            verdict: Mutex::new(None),
        }
    }

    /// The pin applied to `endpoint`.
    pub fn pin_for(&self, endpoint: &ResolvedEndpoint) -> CertificatePin {
        CertificatePin::new(endpoint.host(), self.fingerprints.clone())
    }

    pub async fn verify(&self, endpoint: &ResolvedEndpoint) -> bool {
        let mut verdict = self.verdict.lock().await;
        if let Some(cached) = *verdict {
            return cached;
        }

        let pin = self.pin_for(endpoint);
        let fresh = match self
            .verifier
            .verify(endpoint.host(), endpoint.port(), &pin)
            .await
        {
            Ok(()) => {
                tracing::info!(host = endpoint.host(), "certificate pin verified");
                true
            }
            Err(e) => {
                tracing::warn!(host = endpoint.host(), error = %e, "certificate pin verification failed");
                false
            }
        };
        *verdict = Some(fresh);
        fresh
    }

    /// The cached verdict, if a check has completed and none is in flight.
    pub fn cached_verdict(&self) -> Option<bool> {
        self.verdict.try_lock().ok().and_then(|v| *v)
    }

    /// Drop the cached verdict so the next call reconnects.
    pub async fn invalidate(&self) {
        *self.verdict.lock().await = None;
    }
}
