pub mod layout;
pub mod reader;
pub mod sweep;
pub mod writer;

use base64::{engine::general_purpose::STANDARD as Base64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{CacheErrKind, CacheError};

const ENTRY_VERSION: u32 = 1;

/// On-disk envelope. The key travels with the payload so listings can report it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    pub version: u32,
    pub key: String,
    pub stored_at: DateTime<Utc>,
    pub payload: String,
}

impl StoredEntry {
    pub fn seal(key: &str, bytes: &[u8]) -> Self {
        Self {
            version: ENTRY_VERSION,
            key: key.to_string(),
            stored_at: Utc::now(),
            payload: Base64.encode(bytes),
        }
    }

    pub fn open(&self) -> Result<Vec<u8>, CacheError> {
        if self.version != ENTRY_VERSION {
            return Err(CacheErrKind::Corrupt(format!(
                "unsupported entry version {}",
                self.version
            ))
            .into());
        }
        Base64
            .decode(self.payload.as_bytes())
            .map_err(|err| CacheErrKind::Corrupt(err.to_string()).into())
    }
}
