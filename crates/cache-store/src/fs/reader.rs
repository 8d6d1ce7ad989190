use std::io;
use std::path::Path;

use tokio::fs;

use super::StoredEntry;

/// Returns `Ok(None)` when the entry does not exist.
pub async fn read_entry(path: &Path) -> io::Result<Option<StoredEntry>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
}
