use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::ConfigError;

/// Length of the hex digests that make up the reference key pool.
///
/// Decoys reuse it so real and synthetic credentials share one wire shape.
pub const DEFAULT_TOKEN_LEN: usize = 128;

const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

/// An opaque credential sent as the `Authorization` header.
///
/// `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CredentialToken(String);

impl CredentialToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for CredentialToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialToken(<{} chars>)", self.0.len())
    }
}

/// Whether an attempt carries a pool credential or a synthetic one.
///
/// Only ever known locally; nothing about the request reveals it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptKind {
    Real,
    Decoy,
}

/// One authentication attempt within a dispatch batch.
#[derive(Debug, Clone)]
pub struct AuthAttempt {
    pub token: CredentialToken,
    pub kind: AttemptKind,
}

impl AuthAttempt {
    pub fn real(token: CredentialToken) -> Self {
        Self {
            token,
            kind: AttemptKind::Real,
        }
    }

    pub fn decoy(token: CredentialToken) -> Self {
        Self {
            token,
            kind: AttemptKind::Decoy,
        }
    }
}

/// Immutable pool of genuine credential tokens.
#[derive(Clone)]
pub struct KeyPool {
    tokens: Vec<CredentialToken>,
}

impl fmt::Debug for KeyPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPool")
            .field("len", &self.tokens.len())
            .finish()
    }
}

impl KeyPool {
    /// Build a pool, rejecting empty pools and non-alphanumeric entries.
    /// Duplicate entries are collapsed, keeping first occurrence order.
    pub fn new<I, S>(tokens: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut pool = Vec::new();
        for (index, token) in tokens.into_iter().enumerate() {
            let token = token.into();
            if token.is_empty() || !token.bytes().all(|b| b.is_ascii_alphanumeric()) {
                return Err(ConfigError::InvalidToken { index });
            }
            if seen.insert(token.clone()) {
                pool.push(CredentialToken(token));
            }
        }
        if pool.is_empty() {
            return Err(ConfigError::EmptyPool);
        }
        Ok(Self { tokens: pool })
    }

    /// Read a newline-delimited pool. Blank lines and `#` comments are skipped.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Self::new(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(|line| line.trim_matches(|c| c == '"' || c == ',')),
        )
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t.as_str() == token)
    }

    /// A uniformly random pool token.
    pub fn pick_real(&self) -> CredentialToken {
        let mut rng = rand::thread_rng();
        // Non-empty by construction.
        self.tokens[rng.gen_range(0..self.tokens.len())].clone()
    }

    /// Up to `count` distinct pool tokens: shuffle, then take.
    pub fn pick_distinct(&self, count: usize) -> Vec<CredentialToken> {
        let mut shuffled = self.tokens.clone();
        shuffled.shuffle(&mut rand::thread_rng());
        shuffled.truncate(count);
        shuffled
    }

    /// A pseudorandom lowercase hex token of `length` characters.
    ///
    /// May collide with a pool entry; nothing relies on disjointness.
    pub fn synthesize_decoy(length: usize) -> CredentialToken {
        let mut rng = rand::thread_rng();
        let value: String = (0..length)
            .map(|_| HEX_CHARS[rng.gen_range(0..HEX_CHARS.len())] as char)
            .collect();
        CredentialToken(value)
    }
}
