use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::error::PinError;

const SHA256_PREFIX: &str = "sha256/";

/// SHA-256 over a certificate's DER encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Fingerprint of a DER-encoded certificate.
    pub fn of_der(der: &[u8]) -> Self {
        Self(Sha256::digest(der).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Accepts `sha256/<base64>` or 64 hex characters.
    pub fn parse(raw: &str) -> Result<Self, PinError> {
        let raw = raw.trim();
        let bytes = if let Some(encoded) = raw.strip_prefix(SHA256_PREFIX) {
            STANDARD
                .decode(encoded)
                .map_err(|e| PinError::Malformed(format!("base64: {e}")))?
        } else if let Some((algorithm, _)) = raw.split_once('/') {
            return Err(PinError::UnsupportedAlgorithm(algorithm.to_string()));
        } else {
            hex::decode(raw).map_err(|e| PinError::Malformed(format!("hex: {e}")))?
        };
        let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            PinError::Malformed(format!("expected 32 digest bytes, got {}", v.len()))
        })?;
        Ok(Self(bytes))
    }
}

impl FromStr for Fingerprint {
    type Err = PinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SHA256_PREFIX}{}", STANDARD.encode(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", hex::encode(self.0))
    }
}

/// The certificates a host is allowed to present.
///
/// A chain is trusted when any of its certificates matches any fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePin {
    hostname: String,
    fingerprints: Vec<Fingerprint>,
}

impl CertificatePin {
    pub fn new(hostname: impl Into<String>, fingerprints: Vec<Fingerprint>) -> Self {
        Self {
            hostname: hostname.into(),
            fingerprints,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn fingerprints(&self) -> &[Fingerprint] {
        &self.fingerprints
    }

    pub fn matches(&self, presented: &Fingerprint) -> bool {
        self.fingerprints.iter().any(|fp| fp == presented)
    }

    /// Reject verification against a host the pin was not issued for.
    pub fn check_host(&self, host: &str) -> Result<(), PinError> {
        if self.hostname.eq_ignore_ascii_case(host) {
            Ok(())
        } else {
            Err(PinError::HostMismatch {
                pinned: self.hostname.clone(),
                actual: host.to_string(),
            })
        }
    }
}
