pub mod client;
pub mod config;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod keys;
pub mod noise;
pub mod orchestrator;
pub mod pinning;
pub mod proxy;
pub mod transport;
pub mod trust;

// Re-export key types at crate root for convenience.
pub use client::{Collaborators, CovertClient, HostVerdicts};
pub use config::{BatchPolicy, ClientConfig, NoisePolicy};
pub use dispatch::{AuthDispatcher, BatchOutcome};
pub use endpoint::{ElidingResolver, RealEndpointResolver, ResolvedEndpoint, StaticResolver};
pub use error::{Error, Result};
pub use keys::{CredentialToken, KeyPool};
pub use noise::NoiseScheduler;
pub use orchestrator::{normalize_image_url, ImageRequestOrchestrator, ImageUrl};
pub use pinning::tls::PinnedServerVerifier;
pub use pinning::types::{CertificatePin, Fingerprint};
pub use pinning::validator::CertificateValidator;
pub use pinning::CertificateVerifier;
pub use proxy::{ProcessEnv, ProxyInspector, ProxySource, StaticEnv};
pub use transport::{ServiceTransport, Signature};
pub use trust::{DeniedNotice, LockReason, LockdownController, LockdownSurface, TrustGate};

#[cfg(feature = "live-tls")]
pub use pinning::live::OpensslVerifier;

#[cfg(feature = "mock")]
pub use pinning::mock::MockVerifier;
#[cfg(feature = "mock")]
pub use transport::mock::MockTransport;
