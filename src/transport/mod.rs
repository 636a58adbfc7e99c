/// reqwest/rustls transport used in production.
pub mod http;

/// In-memory transport for tests and benches.
#[cfg(any(test, feature = "mock"))]
pub mod mock;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::endpoint::ResolvedEndpoint;
use crate::error::AttemptError;
use crate::keys::CredentialToken;

pub const AUTH_PATH: &str = "/auth";
pub const GENERATE_IMAGE_PATH: &str = "/generate_image";

/// Server-issued proof of a successful real authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(String);

impl Signature {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(<{} chars>)", self.0.len())
    }
}

/// Body of a successful `/auth` response.
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub signature: Option<String>,
}

/// Body of a `/generate_image` request.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest<'a> {
    pub signature: &'a str,
    pub prompt: &'a str,
}

/// Connect and read bounds for one class of request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl RequestTimeouts {
    pub const fn new(connect: Duration, read: Duration) -> Self {
        Self { connect, read }
    }

    /// `/auth`: 10s connect, 10s read.
    pub const fn auth() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(10))
    }

    /// `/generate_image`: 30s connect, 30s read.
    pub const fn image() -> Self {
        Self::new(Duration::from_secs(30), Duration::from_secs(30))
    }
}

/// The two calls the service exposes.
///
/// Real and decoy attempts go through the same `authenticate` call; nothing in
/// the request distinguishes them.
#[async_trait]
pub trait ServiceTransport: Send + Sync {
    /// `POST {base}/auth` with `Authorization: <token>` and an empty body.
    async fn authenticate(
        &self,
        endpoint: &ResolvedEndpoint,
        token: &CredentialToken,
    ) -> Result<Signature, AttemptError>;

    /// `POST {base}/generate_image`; returns the raw response body on 2xx.
    async fn generate_image(
        &self,
        endpoint: &ResolvedEndpoint,
        token: &CredentialToken,
        request: &GenerateRequest<'_>,
    ) -> Result<String, AttemptError>;
}
