use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{GenerateRequest, ServiceTransport, Signature};
use crate::endpoint::ResolvedEndpoint;
use crate::error::AttemptError;
use crate::keys::CredentialToken;

/// A recorded `/generate_image` call.
#[derive(Debug, Clone)]
pub struct ImageCall {
    pub base: String,
    pub token: CredentialToken,
    pub signature: String,
    pub prompt: String,
}

/// In-memory service: fixed token → signature and signature → body tables.
///
/// Unknown tokens get a 401, unknown signatures a 403. Calls are recorded
/// once they complete, so counts reflect finished requests only.
#[derive(Default)]
pub struct MockTransport {
    signatures: HashMap<String, String>,
    images: HashMap<String, String>,
    auth_delay: Duration,
    image_delay: Duration,
    auth_started: AtomicUsize,
    auth_calls: Mutex<Vec<CredentialToken>>,
    image_calls: Mutex<Vec<ImageCall>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// `/auth` with `token` returns `signature`.
    pub fn accept(mut self, token: impl Into<String>, signature: impl Into<String>) -> Self {
        self.signatures.insert(token.into(), signature.into());
        self
    }

    /// `/generate_image` with `signature` returns `body`.
    pub fn image(mut self, signature: impl Into<String>, body: impl Into<String>) -> Self {
        self.images.insert(signature.into(), body.into());
        self
    }

    pub fn auth_delay(mut self, delay: Duration) -> Self {
        self.auth_delay = delay;
        self
    }

    pub fn image_delay(mut self, delay: Duration) -> Self {
        self.image_delay = delay;
        self
    }

    /// `/auth` calls that have started, finished or not.
    pub fn auth_started(&self) -> usize {
        self.auth_started.load(Ordering::SeqCst)
    }

    /// Tokens of completed `/auth` calls, in completion order.
    pub fn auth_calls(&self) -> Vec<CredentialToken> {
        lock(&self.auth_calls).clone()
    }

    pub fn image_calls(&self) -> Vec<ImageCall> {
        lock(&self.image_calls).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ServiceTransport for MockTransport {
    async fn authenticate(
        &self,
        _endpoint: &ResolvedEndpoint,
        token: &CredentialToken,
    ) -> Result<Signature, AttemptError> {
        self.auth_started.fetch_add(1, Ordering::SeqCst);
        if !self.auth_delay.is_zero() {
            tokio::time::sleep(self.auth_delay).await;
        }
        lock(&self.auth_calls).push(token.clone());
        self.signatures
            .get(token.as_str())
            .map(|s| Signature::new(s.clone()))
            .ok_or(AttemptError::Status(401))
    }

    async fn generate_image(
        &self,
        endpoint: &ResolvedEndpoint,
        token: &CredentialToken,
        request: &GenerateRequest<'_>,
    ) -> Result<String, AttemptError> {
        if !self.image_delay.is_zero() {
            tokio::time::sleep(self.image_delay).await;
        }
        lock(&self.image_calls).push(ImageCall {
            base: endpoint.base().to_string(),
            token: token.clone(),
            signature: request.signature.to_string(),
            prompt: request.prompt.to_string(),
        });
        self.images
            .get(request.signature)
            .cloned()
            .ok_or(AttemptError::Status(403))
    }
}
