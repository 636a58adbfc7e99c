/// Fail-safe detection of interposed proxies.
pub mod inspector;

use std::collections::HashMap;
use std::env::{self, VarError};

pub use inspector::ProxyInspector;

/// A value could not be read from the configuration source.
#[derive(Debug, Clone, thiserror::Error)]
#[error("cannot read proxy setting {key}: {reason}")]
pub struct ProxyLookupError {
    pub key: String,
    pub reason: String,
}

/// Where proxy configuration is read from.
pub trait ProxySource: Send + Sync {
    /// Look up a single setting. `Ok(None)` means unset.
    fn lookup(&self, key: &str) -> Result<Option<String>, ProxyLookupError>;
}

/// The live process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl ProxySource for ProcessEnv {
    fn lookup(&self, key: &str) -> Result<Option<String>, ProxyLookupError> {
        match env::var(key) {
            Ok(value) => Ok(Some(value)),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => Err(ProxyLookupError {
                key: key.to_string(),
                reason: "value is not valid unicode".into(),
            }),
        }
    }
}

/// A fixed snapshot of settings.
#[derive(Debug, Default, Clone)]
pub struct StaticEnv {
    values: HashMap<String, String>,
}

impl StaticEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for StaticEnv {
    fn from(pairs: [(K, V); N]) -> Self {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ProxySource for StaticEnv {
    fn lookup(&self, key: &str) -> Result<Option<String>, ProxyLookupError> {
        Ok(self.values.get(key).cloned())
    }
}
