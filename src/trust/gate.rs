use std::sync::Arc;

use super::{LockReason, LockdownController};
use crate::endpoint::{RealEndpointResolver, ResolvedEndpoint};
use crate::pinning::validator::CertificateValidator;
use crate::proxy::ProxyInspector;

/// The checks every request path runs before touching the network.
pub struct TrustGate {
    nominal_base: String,
    resolver: Arc<dyn RealEndpointResolver>,
    proxy: ProxyInspector,
    validator: CertificateValidator,
    lockdown: Arc<LockdownController>,
}

impl TrustGate {
    pub fn new(
        nominal_base: impl Into<String>,
        resolver: Arc<dyn RealEndpointResolver>,
        proxy: ProxyInspector,
        validator: CertificateValidator,
        lockdown: Arc<LockdownController>,
    ) -> Self {
        Self {
            nominal_base: nominal_base.into(),
            resolver,
            proxy,
            validator,
            lockdown,
        }
    }

    pub fn lockdown(&self) -> &Arc<LockdownController> {
        &self.lockdown
    }

    pub fn validator(&self) -> &CertificateValidator {
        &self.validator
    }

    pub fn is_locked(&self) -> bool {
        self.lockdown.is_locked()
    }

    /// Full check: proxy, resolution, certificate. Any failure trips the
    /// lockdown and yields `None`.
    pub async fn admit(&self) -> Option<ResolvedEndpoint> {
        if self.is_locked() {
            return None;
        }
        if self.proxy.suspicious_proxy_present() {
            self.lockdown.trip(LockReason::SuspiciousProxy);
            return None;
        }
        let endpoint = match self.resolver.resolve(&self.nominal_base) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                tracing::warn!(error = %e, "endpoint resolution failed");
                self.lockdown.trip(LockReason::ResolutionFailed);
                return None;
            }
        };
        if !self.validator.verify(&endpoint).await {
            self.lockdown.trip(LockReason::CertificateMismatch);
            return None;
        }
        Some(endpoint)
    }

    /// Endpoint for background traffic. Refuses under the same conditions as
    /// [`admit`](Self::admit) minus the certificate, and never trips.
    pub fn background_endpoint(&self) -> Option<ResolvedEndpoint> {
        if self.is_locked() || self.proxy.suspicious_proxy_present() {
            return None;
        }
        match self.resolver.resolve(&self.nominal_base) {
            Ok(endpoint) => Some(endpoint),
            Err(e) => {
                tracing::debug!(error = %e, "background traffic skipped");
                None
            }
        }
    }

    /// Whether `endpoint` carries the pinned certificate. Cached after the
    /// first check.
    pub async fn pinned(&self, endpoint: &ResolvedEndpoint) -> bool {
        !self.is_locked() && self.validator.verify(endpoint).await
    }
}
