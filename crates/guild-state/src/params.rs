//! Key-value parameter interface consumed by the greeting resolver.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

/// Why a parameter read failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParameterError {
    #[error("parameter not found: {0}")]
    NotFound(String),

    #[error("access denied to parameter: {0}")]
    AccessDenied(String),

    #[error("timed out reading parameter: {0}")]
    Timeout(String),

    #[error("parameter backend error: {0}")]
    Backend(String),
}

/// Read-only key-value store for operator-managed parameters.
pub trait ParameterStore: Send + Sync {
    fn get(&self, key: &str) -> Result<String, ParameterError>;
}

impl<T: ParameterStore + ?Sized> ParameterStore for Arc<T> {
    fn get(&self, key: &str) -> Result<String, ParameterError> {
        (**self).get(key)
    }
}

/// Restricts a parameter store to an explicit set of readable keys.
///
/// Reads of any other key fail with `AccessDenied` without touching the
/// underlying store.
pub struct ReadGrant<S> {
    inner: S,
    allowed: HashSet<String>,
}

impl<S: ParameterStore> ReadGrant<S> {
    pub fn new<I, K>(inner: S, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            inner,
            allowed: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl<S: ParameterStore> ParameterStore for ReadGrant<S> {
    fn get(&self, key: &str) -> Result<String, ParameterError> {
        if !self.allowed.contains(key) {
            return Err(ParameterError::AccessDenied(key.to_string()));
        }
        self.inner.get(key)
    }
}
