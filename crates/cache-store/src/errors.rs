use thiserror::Error;

use soulpilot_core_types::SoulError;

#[derive(Clone, Debug, Error)]
pub enum CacheErrKind {
    #[error("cache store read-only")]
    ReadOnly,
    #[error("entry of {bytes} bytes exceeds limit of {limit} bytes")]
    Oversize { bytes: usize, limit: usize },
    #[error("empty cache key")]
    EmptyKey,
    #[error("io failure: {0}")]
    IoFailed(String),
    #[error("entry corrupt: {0}")]
    Corrupt(String),
}

#[derive(Clone, Debug, Error)]
#[error(transparent)]
pub struct CacheError(pub CacheErrKind);

impl CacheError {
    pub fn new(kind: CacheErrKind) -> Self {
        Self(kind)
    }

    pub fn kind(&self) -> &CacheErrKind {
        &self.0
    }

    pub fn io(err: std::io::Error) -> Self {
        Self(CacheErrKind::IoFailed(err.to_string()))
    }
}

impl From<CacheErrKind> for CacheError {
    fn from(kind: CacheErrKind) -> Self {
        CacheError(kind)
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::io(err)
    }
}

impl From<CacheError> for SoulError {
    fn from(value: CacheError) -> Self {
        SoulError::new(value.to_string())
    }
}
