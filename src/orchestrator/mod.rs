use std::fmt;
use std::sync::Arc;

use reqwest::Url;
use tokio_util::sync::CancellationToken;

use crate::dispatch::AuthDispatcher;
use crate::endpoint::ResolvedEndpoint;
use crate::transport::GenerateRequest;
use crate::trust::TrustGate;

/// Absolute URL of a generated image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUrl(Url);

impl ImageUrl {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn into_url(self) -> Url {
        self.0
    }
}

impl fmt::Display for ImageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Turn a `/generate_image` response body into an absolute URL.
///
/// The body is trimmed and one pair of surrounding double quotes removed.
/// Anything starting with `http` is taken as absolute, a leading `/` is
/// appended to the endpoint base, and any other path is joined with `/`.
pub fn normalize_image_url(body: &str, endpoint: &ResolvedEndpoint) -> Option<ImageUrl> {
    let trimmed = body.trim();
    let path = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    if path.is_empty() {
        return None;
    }

    let full = if path.starts_with("http") {
        path.to_string()
    } else if path.starts_with('/') {
        endpoint.join(path)
    } else {
        format!("{}/{}", endpoint.base(), path)
    };
    Url::parse(&full).ok().map(ImageUrl)
}

/// Runs one user-initiated image request end to end.
///
/// Every call also launches a detached cover flow that repeats the public
/// request shape and discards its result.
#[derive(Clone)]
pub struct ImageRequestOrchestrator {
    gate: Arc<TrustGate>,
    dispatcher: Arc<AuthDispatcher>,
}

impl ImageRequestOrchestrator {
    pub fn new(gate: Arc<TrustGate>, dispatcher: Arc<AuthDispatcher>) -> Self {
        Self { gate, dispatcher }
    }

    pub fn gate(&self) -> &Arc<TrustGate> {
        &self.gate
    }

    pub fn dispatcher(&self) -> &Arc<AuthDispatcher> {
        &self.dispatcher
    }

    /// Generate an image for `prompt`.
    ///
    /// `None` covers every failure: lockdown, a failed trust check, no
    /// signature, a rejected request or an unusable body. Trust failures
    /// additionally lock the process down.
    pub async fn generate_image(&self, prompt: &str) -> Option<ImageUrl> {
        if self.gate.is_locked() {
            tracing::debug!("request refused: locked down");
            return None;
        }

        self.spawn_cover(prompt);

        let endpoint = self.gate.admit().await?;
        let Some(signature) = self.dispatcher.get_signature(&endpoint).await else {
            tracing::info!("no signature obtained");
            return None;
        };
        if !self.gate.pinned(&endpoint).await {
            return None;
        }

        let token = self.dispatcher.pool().pick_real();
        let request = GenerateRequest {
            signature: signature.as_str(),
            prompt,
        };
        let body = match self
            .dispatcher
            .transport()
            .generate_image(&endpoint, &token, &request)
            .await
        {
            Ok(body) => body,
            Err(e) => {
                tracing::info!(error = %e, "image request failed");
                return None;
            }
        };

        let url = normalize_image_url(&body, &endpoint);
        if url.is_none() {
            tracing::info!("image response body is not a usable url");
        }
        url
    }

    /// [`generate_image`](Self::generate_image), returning `None` as soon as
    /// `cancel` fires. The in-flight request is dropped; an already-spawned
    /// cover flow keeps running.
    pub async fn generate_image_cancellable(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Option<ImageUrl> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("image request cancelled");
                None
            }
            url = self.generate_image(prompt) => url,
        }
    }

    fn spawn_cover(&self, prompt: &str) {
        let this = self.clone();
        let prompt = prompt.to_owned();
        tokio::spawn(async move {
            this.cover_flow(&prompt).await;
        });
    }

    async fn cover_flow(&self, prompt: &str) {
        let Some(endpoint) = self.gate.background_endpoint() else {
            return;
        };
        let Some(signature) = self.dispatcher.get_signature(&endpoint).await else {
            return;
        };
        if !self.gate.pinned(&endpoint).await {
            return;
        }

        let token = self.dispatcher.pool().pick_real();
        let request = GenerateRequest {
            signature: signature.as_str(),
            prompt,
        };
        if let Err(e) = self
            .dispatcher
            .transport()
            .generate_image(&endpoint, &token, &request)
            .await
        {
            tracing::trace!(error = %e, "cover request failed");
        }
    }
}
