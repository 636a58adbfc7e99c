#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use rustls::pki_types::PrivateKeyDer;
use rustls::RootCertStore;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use covert_imagegen::transport::http::HttpTransport;
use covert_imagegen::transport::RequestTimeouts;
use covert_imagegen::{
    ClientConfig, Collaborators, CovertClient, Fingerprint, KeyPool, MockVerifier, StaticEnv,
    StaticResolver,
};

/// A `/generate_image` request as the stub saw it.
#[derive(Debug, Clone)]
pub struct RecordedImage {
    pub authorization: String,
    pub signature: String,
    pub prompt: String,
}

#[derive(Default)]
struct Recorded {
    auth: Vec<String>,
    images: Vec<RecordedImage>,
}

#[derive(Clone)]
struct StubState {
    signatures: Arc<HashMap<String, String>>,
    images: Arc<HashMap<String, String>>,
    recorded: Arc<Mutex<Recorded>>,
}

/// Certificate authority the stub's chain is issued from.
struct Authority {
    roots: RootCertStore,
    pin: Fingerprint,
    server: Arc<rustls::ServerConfig>,
}

impl Authority {
    /// CA plus a leaf for 127.0.0.1; the served chain is leaf then CA.
    fn generate() -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "stub intermediate");
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let leaf_key = KeyPair::generate().unwrap();
        let leaf = CertificateParams::new(vec!["127.0.0.1".to_string()])
            .unwrap()
            .signed_by(&leaf_key, &ca, &ca_key)
            .unwrap();

        let mut roots = RootCertStore::empty();
        roots.add(ca.der().clone()).unwrap();

        let key = PrivateKeyDer::try_from(leaf_key.serialize_der()).unwrap();
        let server = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![leaf.der().clone(), ca.der().clone()], key)
        .unwrap();

        Self {
            roots,
            pin: Fingerprint::of_der(ca.der()),
            server: Arc::new(server),
        }
    }
}

/// Minimal image service over TLS on a loopback port.
pub struct StubService {
    pub base: String,
    roots: RootCertStore,
    pin: Fingerprint,
    state: StubState,
}

impl StubService {
    /// `signatures`: token → signature. `images`: signature → response body.
    pub async fn start(signatures: &[(&str, &str)], images: &[(&str, &str)]) -> Self {
        let state = StubState {
            signatures: Arc::new(to_map(signatures)),
            images: Arc::new(to_map(images)),
            recorded: Arc::new(Mutex::new(Recorded::default())),
        };
        let app = Router::new()
            .route("/auth", post(auth))
            .route("/generate_image", post(generate_image))
            .with_state(state.clone());

        let authority = Authority::generate();
        let acceptor = TlsAcceptor::from(Arc::clone(&authority.server));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                let service = TowerToHyperService::new(app.clone());
                tokio::spawn(async move {
                    // A client that rejects the chain ends the connection here.
                    let Ok(tls) = acceptor.accept(tcp).await else {
                        return;
                    };
                    let _ = auto::Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(tls), service)
                        .await;
                });
            }
        });

        Self {
            base: format!("https://{addr}"),
            roots: authority.roots,
            pin: authority.pin,
            state,
        }
    }

    /// Fingerprint of the intermediate the stub serves.
    pub fn pin(&self) -> Fingerprint {
        self.pin
    }

    /// Transport that trusts the stub's authority and pins `pins`.
    pub fn transport_pinned_to(&self, pins: Vec<Fingerprint>) -> HttpTransport {
        HttpTransport::with_roots(
            RequestTimeouts::auth(),
            RequestTimeouts::image(),
            pins,
            self.roots.clone(),
        )
        .unwrap()
    }

    pub fn transport(&self) -> HttpTransport {
        self.transport_pinned_to(vec![self.pin])
    }

    pub fn auth_calls(&self) -> Vec<String> {
        self.state.recorded.lock().unwrap().auth.clone()
    }

    pub fn image_calls(&self) -> Vec<RecordedImage> {
        self.state.recorded.lock().unwrap().images.clone()
    }
}

fn to_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn authorization(headers: &HeaderMap) -> String {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn auth(
    State(state): State<StubState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<Value>, StatusCode> {
    assert!(body.is_empty(), "/auth body must be empty");
    let token = authorization(&headers);
    state.recorded.lock().unwrap().auth.push(token.clone());
    state
        .signatures
        .get(&token)
        .map(|signature| Json(json!({ "signature": signature })))
        .ok_or(StatusCode::UNAUTHORIZED)
}

async fn generate_image(
    State(state): State<StubState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<String, StatusCode> {
    let signature = body["signature"].as_str().unwrap_or_default().to_string();
    let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
    state.recorded.lock().unwrap().images.push(RecordedImage {
        authorization: authorization(&headers),
        signature: signature.clone(),
        prompt,
    });
    state
        .images
        .get(&signature)
        .cloned()
        .ok_or(StatusCode::FORBIDDEN)
}

/// A client pointed at `stub` over real TLS and pinned to its intermediate;
/// the startup certificate check is mocked to present `chain`.
pub fn client_for(
    stub: &StubService,
    pool: &[&str],
    env: StaticEnv,
    chain: Vec<Fingerprint>,
) -> CovertClient {
    client_pinned_to(stub, pool, env, vec![stub.pin()], chain)
}

pub fn client_pinned_to(
    stub: &StubService,
    pool: &[&str],
    env: StaticEnv,
    pins: Vec<Fingerprint>,
    chain: Vec<Fingerprint>,
) -> CovertClient {
    let mut builder = ClientConfig::builder()
        .nominal_base(stub.base.clone())
        .key_pool(KeyPool::new(pool.iter().copied()).unwrap());
    for pin in &pins {
        builder = builder.fingerprint(*pin);
    }
    let config = builder.build().unwrap();
    CovertClient::new(
        config,
        Collaborators {
            transport: Arc::new(stub.transport_pinned_to(pins)),
            resolver: Arc::new(StaticResolver::parse(&stub.base).unwrap()),
            verifier: Arc::new(MockVerifier::presenting(chain)),
            proxy_source: Arc::new(env),
        },
    )
}
