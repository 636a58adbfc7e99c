use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;

use crate::error::ConfigError;
use crate::keys::{KeyPool, DEFAULT_TOKEN_LEN};
use crate::pinning::types::Fingerprint;
use crate::transport::RequestTimeouts;

/// Shape of one authentication batch.
///
/// Only constructed through [`BatchPolicy::new`], so every instance has
/// non-empty ranges and at least one real token per batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPolicy {
    real: RangeInclusive<usize>,
    decoy: RangeInclusive<usize>,
    decoy_token_len: usize,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            real: 3..=7,
            decoy: 2..=8,
            decoy_token_len: DEFAULT_TOKEN_LEN,
        }
    }
}

impl BatchPolicy {
    pub fn new(
        real: RangeInclusive<usize>,
        decoy: RangeInclusive<usize>,
        decoy_token_len: usize,
    ) -> Result<Self, ConfigError> {
        if real.is_empty() || *real.start() == 0 {
            return Err(ConfigError::InvalidRange {
                name: "real",
                min: *real.start() as u64,
                max: *real.end() as u64,
            });
        }
        if decoy.is_empty() {
            return Err(ConfigError::InvalidRange {
                name: "decoy",
                min: *decoy.start() as u64,
                max: *decoy.end() as u64,
            });
        }
        if decoy_token_len == 0 {
            return Err(ConfigError::Zero("decoy_token_len"));
        }
        Ok(Self {
            real,
            decoy,
            decoy_token_len,
        })
    }

    /// Number of real pool tokens per batch (capped at the pool size).
    pub fn real(&self) -> RangeInclusive<usize> {
        self.real.clone()
    }

    /// Number of synthetic decoys per batch.
    pub fn decoy(&self) -> RangeInclusive<usize> {
        self.decoy.clone()
    }

    /// Length of synthetic decoy tokens.
    pub fn decoy_token_len(&self) -> usize {
        self.decoy_token_len
    }
}

/// Pacing of the background noise loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoisePolicy {
    min_interval: Duration,
    max_interval: Duration,
}

impl Default for NoisePolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(30),
        }
    }
}

impl NoisePolicy {
    pub fn new(min_interval: Duration, max_interval: Duration) -> Result<Self, ConfigError> {
        if min_interval.is_zero() {
            return Err(ConfigError::Zero("noise min_interval"));
        }
        if min_interval > max_interval {
            return Err(ConfigError::InvalidRange {
                name: "noise interval (ms)",
                min: min_interval.as_millis() as u64,
                max: max_interval.as_millis() as u64,
            });
        }
        Ok(Self {
            min_interval,
            max_interval,
        })
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }
}

/// Everything a [`CovertClient`](crate::client::CovertClient) needs besides
/// its injected collaborators.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The address as written in the build; resolved before every use.
    pub nominal_base: String,

    /// Fingerprints accepted anywhere in the resolved host's chain.
    pub fingerprints: Vec<Fingerprint>,

    /// Genuine credentials.
    pub key_pool: Arc<KeyPool>,

    pub batch: BatchPolicy,

    pub noise: NoisePolicy,

    /// Bounds for `/auth` (default: 10s connect, 10s read).
    pub auth_timeouts: RequestTimeouts,

    /// Bounds for `/generate_image` (default: 30s connect, 30s read).
    pub image_timeouts: RequestTimeouts,

    /// Bound on the live certificate check (default: 10s).
    pub verify_timeout: Duration,
}

impl ClientConfig {
    /// Create a builder for constructing a `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    nominal_base: Option<String>,
    fingerprints: Vec<Fingerprint>,
    key_pool: Option<Arc<KeyPool>>,
    batch: BatchPolicy,
    noise: NoisePolicy,
    auth_timeouts: RequestTimeouts,
    image_timeouts: RequestTimeouts,
    verify_timeout: Duration,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self {
            nominal_base: None,
            fingerprints: Vec::new(),
            key_pool: None,
            batch: BatchPolicy::default(),
            noise: NoisePolicy::default(),
            auth_timeouts: RequestTimeouts::auth(),
            image_timeouts: RequestTimeouts::image(),
            verify_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfigBuilder {
    pub fn nominal_base(mut self, url: impl Into<String>) -> Self {
        self.nominal_base = Some(url.into());
        self
    }

    pub fn fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprints.push(fingerprint);
        self
    }

    /// Parse and add a `sha256/<base64>` or hex fingerprint.
    pub fn pin(self, raw: &str) -> Result<Self, ConfigError> {
        let fingerprint = Fingerprint::parse(raw)?;
        Ok(self.fingerprint(fingerprint))
    }

    pub fn key_pool(mut self, pool: KeyPool) -> Self {
        self.key_pool = Some(Arc::new(pool));
        self
    }

    pub fn batch(mut self, batch: BatchPolicy) -> Self {
        self.batch = batch;
        self
    }

    pub fn noise(mut self, noise: NoisePolicy) -> Self {
        self.noise = noise;
        self
    }

    pub fn auth_timeouts(mut self, timeouts: RequestTimeouts) -> Self {
        self.auth_timeouts = timeouts;
        self
    }

    pub fn image_timeouts(mut self, timeouts: RequestTimeouts) -> Self {
        self.image_timeouts = timeouts;
        self
    }

    pub fn verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }

    /// Build the `ClientConfig`, validating that all values are sensible.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let nominal_base = self
            .nominal_base
            .ok_or(ConfigError::Missing("nominal_base"))?;
        Url::parse(&nominal_base).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;

        let key_pool = self.key_pool.ok_or(ConfigError::Missing("key_pool"))?;
        if self.fingerprints.is_empty() {
            return Err(ConfigError::NoPins);
        }

        for (name, timeouts) in [
            ("auth timeouts", self.auth_timeouts),
            ("image timeouts", self.image_timeouts),
        ] {
            if timeouts.connect.is_zero() || timeouts.read.is_zero() {
                return Err(ConfigError::Zero(name));
            }
        }
        if self.verify_timeout.is_zero() {
            return Err(ConfigError::Zero("verify_timeout"));
        }

        Ok(ClientConfig {
            nominal_base,
            fingerprints: self.fingerprints,
            key_pool,
            batch: self.batch,
            noise: self.noise,
            auth_timeouts: self.auth_timeouts,
            image_timeouts: self.image_timeouts,
            verify_timeout: self.verify_timeout,
        })
    }
}
