use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use async_trait::async_trait;
use openssl::ssl::{SslConnector, SslMethod};

use super::types::{CertificatePin, Fingerprint};
use super::CertificateVerifier;
use crate::error::PinError;

/// Connect and handshake timeout for the live check.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Verifies pins over a live OpenSSL handshake.
///
/// The chain is validated against the system trust store and the hostname
/// before fingerprints are compared, so the pin narrows trust and never
/// widens it.
#[derive(Debug, Clone)]
pub struct OpensslVerifier {
    timeout: Duration,
}

impl Default for OpensslVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_VERIFY_TIMEOUT)
    }
}

impl OpensslVerifier {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CertificateVerifier for OpensslVerifier {
    async fn verify(&self, host: &str, port: u16, pin: &CertificatePin) -> Result<(), PinError> {
        pin.check_host(host)?;

        let host = host.to_string();
        let pin = pin.clone();
        let timeout = self.timeout;
        let task = tokio::task::spawn_blocking(move || handshake_and_match(&host, port, &pin, timeout));

        // Connect, read and write are each bounded; this caps the sum.
        match tokio::time::timeout(timeout * 3, task).await {
            Err(_) => Err(PinError::Timeout),
            Ok(Err(e)) => Err(PinError::Task(e.to_string())),
            Ok(Ok(result)) => result,
        }
    }
}

fn handshake_and_match(
    host: &str,
    port: u16,
    pin: &CertificatePin,
    timeout: Duration,
) -> Result<(), PinError> {
    let addr = (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| PinError::Handshake(format!("{host} did not resolve")))?;

    let tcp = TcpStream::connect_timeout(&addr, timeout)?;
    tcp.set_read_timeout(Some(timeout))?;
    tcp.set_write_timeout(Some(timeout))?;

    let connector = SslConnector::builder(SslMethod::tls())
        .map_err(|e| PinError::Handshake(format!("connector setup: {e}")))?
        .build();
    let stream = connector
        .connect(host, tcp)
        .map_err(|e| PinError::Handshake(e.to_string()))?;

    let chain = stream.ssl().peer_cert_chain().ok_or(PinError::NoPeerChain)?;
    for (depth, cert) in chain.iter().enumerate() {
        let der = cert
            .to_der()
            .map_err(|e| PinError::Handshake(format!("certificate {depth} encoding: {e}")))?;
        let presented = Fingerprint::of_der(&der);
        tracing::trace!(depth, fingerprint = %presented, "peer certificate");
        if pin.matches(&presented) {
            tracing::debug!(host, depth, "pinned certificate found in chain");
            return Ok(());
        }
    }

    Err(PinError::FingerprintMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refuses_host_outside_pin() {
        let verifier = OpensslVerifier::default();
        let pin = CertificatePin::new("svc.test", vec![Fingerprint::of_der(b"x")]);
        let err = verifier.verify("other.test", 443, &pin).await.unwrap_err();
        assert!(matches!(err, PinError::HostMismatch { .. }));
    }

    #[tokio::test]
    async fn unreachable_host_fails_verification() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let verifier = OpensslVerifier::new(Duration::from_millis(500));
        let pin = CertificatePin::new("127.0.0.1", vec![Fingerprint::of_der(b"x")]);
        assert!(verifier.verify("127.0.0.1", port, &pin).await.is_err());
    }

    #[tokio::test]
    async fn plaintext_peer_fails_handshake() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            use std::io::Write;
            if let Ok((mut stream, _)) = listener.accept() {
                let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n");
            }
        });

        let verifier = OpensslVerifier::new(Duration::from_secs(2));
        let pin = CertificatePin::new("127.0.0.1", vec![Fingerprint::of_der(b"x")]);
        let err = verifier.verify("127.0.0.1", port, &pin).await.unwrap_err();
        assert!(matches!(err, PinError::Handshake(_)));
    }
}
