use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::dispatch::AuthDispatcher;
use crate::endpoint::RealEndpointResolver;
use crate::error::StartupError;
use crate::noise::NoiseScheduler;
use crate::orchestrator::{ImageRequestOrchestrator, ImageUrl};
use crate::pinning::validator::CertificateValidator;
use crate::pinning::CertificateVerifier;
use crate::proxy::{ProxyInspector, ProxySource};
use crate::transport::ServiceTransport;
use crate::trust::{LockReason, LockdownController, LockdownSurface, TrustGate};

/// The external capabilities a client is wired to.
pub struct Collaborators {
    pub transport: Arc<dyn ServiceTransport>,
    pub resolver: Arc<dyn RealEndpointResolver>,
    pub verifier: Arc<dyn CertificateVerifier>,
    pub proxy_source: Arc<dyn ProxySource>,
}

impl Collaborators {
    /// Pinned reqwest transport, eliding resolver, OpenSSL verifier and the
    /// process environment.
    #[cfg(feature = "live-tls")]
    pub fn live(config: &ClientConfig) -> Result<Self, crate::error::ConfigError> {
        use crate::endpoint::ElidingResolver;
        use crate::pinning::live::OpensslVerifier;
        use crate::proxy::ProcessEnv;
        use crate::transport::http::HttpTransport;

        Ok(Self {
            transport: Arc::new(HttpTransport::new(
                config.auth_timeouts,
                config.image_timeouts,
                config.fingerprints.clone(),
            )?),
            resolver: Arc::new(ElidingResolver::default()),
            verifier: Arc::new(OpensslVerifier::new(config.verify_timeout)),
            proxy_source: Arc::new(ProcessEnv),
        })
    }
}

/// What the host platform knows that this crate cannot check itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostVerdicts {
    /// Rooted or otherwise tampered device.
    pub device_compromised: bool,
}

/// Process-level entry point: owns the lockdown state, the request path and
/// the noise loop.
pub struct CovertClient {
    orchestrator: ImageRequestOrchestrator,
    noise: NoiseScheduler,
    lockdown: Arc<LockdownController>,
    scope: CancellationToken,
}

impl CovertClient {
    pub fn new(config: ClientConfig, collaborators: Collaborators) -> Self {
        let lockdown = Arc::new(LockdownController::new());
        let gate = Arc::new(TrustGate::new(
            config.nominal_base,
            collaborators.resolver,
            ProxyInspector::new(collaborators.proxy_source),
            CertificateValidator::new(collaborators.verifier, config.fingerprints),
            Arc::clone(&lockdown),
        ));
        let dispatcher = Arc::new(AuthDispatcher::new(
            collaborators.transport,
            config.key_pool,
            config.batch,
        ));

        Self {
            orchestrator: ImageRequestOrchestrator::new(Arc::clone(&gate), Arc::clone(&dispatcher)),
            noise: NoiseScheduler::new(gate, dispatcher, config.noise),
            lockdown,
            scope: CancellationToken::new(),
        }
    }

    /// Start-of-process checks, then the noise loop.
    ///
    /// A compromised device refuses to start. Otherwise the trust check runs
    /// once (a failure locks down but is not an error) and noise starts
    /// regardless; while locked its iterations send nothing.
    pub async fn startup(&self, host: HostVerdicts) -> Result<(), StartupError> {
        self.startup_without_noise(host).await?;
        self.noise.start(&self.scope);
        Ok(())
    }

    /// [`startup`](Self::startup) minus the noise loop, for one-shot hosts.
    /// The loop can still be started later through [`noise`](Self::noise).
    pub async fn startup_without_noise(&self, host: HostVerdicts) -> Result<(), StartupError> {
        if host.device_compromised {
            tracing::warn!("refusing to start on a compromised device");
            return Err(StartupError::DeviceCompromised);
        }

        let trusted = self.orchestrator.gate().admit().await.is_some();
        tracing::info!(trusted, "startup trust check complete");
        Ok(())
    }

    /// Scope the noise loop runs under; cancelled by [`shutdown`](Self::shutdown).
    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    pub async fn generate_image(&self, prompt: &str) -> Option<ImageUrl> {
        self.orchestrator.generate_image(prompt).await
    }

    pub async fn generate_image_cancellable(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Option<ImageUrl> {
        self.orchestrator
            .generate_image_cancellable(prompt, cancel)
            .await
    }

    pub fn is_locked(&self) -> bool {
        self.lockdown.is_locked()
    }

    pub fn lock_reason(&self) -> Option<LockReason> {
        self.lockdown.reason()
    }

    pub fn subscribe_lockdown(&self) -> watch::Receiver<bool> {
        self.lockdown.subscribe()
    }

    pub fn attach_surface(&self, surface: Arc<dyn LockdownSurface>) {
        self.lockdown.attach(surface);
    }

    pub fn noise(&self) -> &NoiseScheduler {
        &self.noise
    }

    /// Stop background traffic and cancel the process scope.
    pub fn shutdown(&self) {
        self.noise.stop();
        self.scope.cancel();
        tracing::info!("client shut down");
    }
}

impl Drop for CovertClient {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::StaticResolver;
    use crate::keys::KeyPool;
    use crate::pinning::mock::MockVerifier;
    use crate::pinning::types::Fingerprint;
    use crate::proxy::StaticEnv;
    use crate::transport::mock::MockTransport;
    use crate::trust::DeniedNotice;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pin() -> Fingerprint {
        Fingerprint::of_der(b"intermediate")
    }

    fn client(transport: Arc<MockTransport>, env: StaticEnv, chain: Vec<Fingerprint>) -> CovertClient {
        let config = ClientConfig::builder()
            .nominal_base("https://nominal.test")
            .key_pool(KeyPool::new(["abc123"]).unwrap())
            .fingerprint(pin())
            .build()
            .unwrap();
        CovertClient::new(
            config,
            Collaborators {
                transport,
                resolver: Arc::new(StaticResolver::parse("https://svc.test").unwrap()),
                verifier: Arc::new(MockVerifier::presenting(chain)),
                proxy_source: Arc::new(env),
            },
        )
    }

    #[derive(Default)]
    struct RecordingSurface(AtomicUsize);

    impl LockdownSurface for RecordingSurface {
        fn present(&self, notice: &DeniedNotice) {
            assert_eq!(notice, &DeniedNotice::standard());
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn compromised_device_refuses_to_start() {
        let transport = Arc::new(MockTransport::new());
        let client = client(transport.clone(), StaticEnv::new(), vec![pin()]);

        let result = client
            .startup(HostVerdicts {
                device_compromised: true,
            })
            .await;
        assert!(matches!(result, Err(StartupError::DeviceCompromised)));
        assert!(!client.noise().is_running());
        assert!(!client.is_locked());
    }

    #[tokio::test]
    async fn startup_mismatch_locks_and_covers_surfaces() {
        let transport = Arc::new(MockTransport::new());
        let client = client(
            transport,
            StaticEnv::new(),
            vec![Fingerprint::of_der(b"interceptor")],
        );
        let surface = Arc::new(RecordingSurface::default());
        client.attach_surface(surface.clone());
        let mut signal = client.subscribe_lockdown();

        client.startup(HostVerdicts::default()).await.unwrap();
        assert!(client.is_locked());
        assert_eq!(client.lock_reason(), Some(LockReason::CertificateMismatch));
        assert_eq!(surface.0.load(Ordering::SeqCst), 1);
        assert!(*signal.borrow_and_update());
        assert!(client.noise().is_running());

        assert!(client.generate_image("a red fox").await.is_none());
        client.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_startup_sends_no_background_traffic() {
        let transport = Arc::new(MockTransport::new());
        let client = client(transport.clone(), StaticEnv::new(), vec![pin()]);

        client
            .startup_without_noise(HostVerdicts::default())
            .await
            .unwrap();
        assert!(!client.is_locked());
        assert!(!client.noise().is_running());

        tokio::time::sleep(std::time::Duration::from_secs(120)).await;
        assert!(transport.auth_calls().is_empty());

        client.noise().start(client.scope());
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        assert_eq!(transport.auth_calls().len(), 1);
        client.shutdown();
    }

    #[tokio::test]
    async fn quiet_startup_still_refuses_compromised_device() {
        let client = client(Arc::new(MockTransport::new()), StaticEnv::new(), vec![pin()]);
        let result = client
            .startup_without_noise(HostVerdicts {
                device_compromised: true,
            })
            .await;
        assert!(matches!(result, Err(StartupError::DeviceCompromised)));
    }

    #[tokio::test]
    async fn trusted_startup_serves_requests() {
        let transport = Arc::new(
            MockTransport::new()
                .accept("abc123", "sig1")
                .image("sig1", "/images/x.jpg"),
        );
        let client = client(transport, StaticEnv::new(), vec![pin()]);

        client.startup(HostVerdicts::default()).await.unwrap();
        assert!(!client.is_locked());

        let url = client.generate_image("a red fox").await.unwrap();
        assert_eq!(url.as_str(), "https://svc.test/images/x.jpg");

        client.shutdown();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(!client.noise().is_running());
    }
}
