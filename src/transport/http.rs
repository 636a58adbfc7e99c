use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response};
use rustls::RootCertStore;

use super::{
    AuthResponse, GenerateRequest, RequestTimeouts, ServiceTransport, Signature, AUTH_PATH,
    GENERATE_IMAGE_PATH,
};
use crate::endpoint::ResolvedEndpoint;
use crate::error::{AttemptError, ConfigError};
use crate::keys::CredentialToken;
use crate::pinning::tls;
use crate::pinning::types::Fingerprint;

/// HTTP transport over reqwest and rustls.
///
/// Environment proxies are never honoured: a configured proxy is a reason to
/// lock down, not a route. `/generate_image` travels only over HTTPS, on a
/// connection whose chain must carry one of the pinned fingerprints.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    auth_client: Client,
    image_client: Client,
}

impl HttpTransport {
    /// Chains are validated against the bundled web PKI roots.
    pub fn new(
        auth_timeouts: RequestTimeouts,
        image_timeouts: RequestTimeouts,
        fingerprints: Vec<Fingerprint>,
    ) -> Result<Self, ConfigError> {
        Self::with_roots(auth_timeouts, image_timeouts, fingerprints, tls::web_pki_roots())
    }

    pub fn with_roots(
        auth_timeouts: RequestTimeouts,
        image_timeouts: RequestTimeouts,
        fingerprints: Vec<Fingerprint>,
        roots: RootCertStore,
    ) -> Result<Self, ConfigError> {
        if fingerprints.is_empty() {
            return Err(ConfigError::NoPins);
        }
        let roots = Arc::new(roots);
        let auth_tls = tls::standard_client_config(Arc::clone(&roots))?;
        let image_tls = tls::pinned_client_config(roots, fingerprints)?;

        Ok(Self {
            auth_client: client_builder(auth_timeouts, auth_tls)
                .build()
                .map_err(client_error)?,
            image_client: client_builder(image_timeouts, image_tls)
                .https_only(true)
                .build()
                .map_err(client_error)?,
        })
    }
}

fn client_builder(timeouts: RequestTimeouts, tls: rustls::ClientConfig) -> reqwest::ClientBuilder {
    Client::builder()
        .no_proxy()
        .use_preconfigured_tls(tls)
        .connect_timeout(timeouts.connect)
        .read_timeout(timeouts.read)
}

fn client_error(e: reqwest::Error) -> ConfigError {
    ConfigError::HttpClient(e.to_string())
}

fn credential_header(token: &CredentialToken) -> Result<HeaderValue, AttemptError> {
    let mut value = HeaderValue::from_str(token.as_str())
        .map_err(|e| AttemptError::Request(format!("invalid credential header: {e}")))?;
    value.set_sensitive(true);
    Ok(value)
}

fn require_success(response: Response) -> Result<Response, AttemptError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(AttemptError::Status(status.as_u16()))
    }
}

#[async_trait]
impl ServiceTransport for HttpTransport {
    async fn authenticate(
        &self,
        endpoint: &ResolvedEndpoint,
        token: &CredentialToken,
    ) -> Result<Signature, AttemptError> {
        let response = self
            .auth_client
            .post(endpoint.join(AUTH_PATH))
            .header(AUTHORIZATION, credential_header(token)?)
            .body(Vec::<u8>::new())
            .send()
            .await?;
        let body = require_success(response)?.bytes().await?;

        let parsed: AuthResponse = serde_json::from_slice(&body)
            .map_err(|e| AttemptError::MalformedBody(e.to_string()))?;
        parsed
            .signature
            .filter(|s| !s.is_empty())
            .map(Signature::new)
            .ok_or(AttemptError::MissingSignature)
    }

    async fn generate_image(
        &self,
        endpoint: &ResolvedEndpoint,
        token: &CredentialToken,
        request: &GenerateRequest<'_>,
    ) -> Result<String, AttemptError> {
        let response = self
            .image_client
            .post(endpoint.join(GENERATE_IMAGE_PATH))
            .header(AUTHORIZATION, credential_header(token)?)
            .json(request)
            .send()
            .await?;
        Ok(require_success(response)?.text().await?)
    }
}
