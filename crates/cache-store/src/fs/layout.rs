use std::path::{Path, PathBuf};

use crate::hash::key_digest;

/// `<namespace_root>/<first two hex chars>/<digest>.json`
pub fn entry_path(namespace_root: &Path, key: &str) -> PathBuf {
    let digest = key_digest(key);
    let shard = &digest[..2.min(digest.len())];
    namespace_root.join(shard).join(format!("{digest}.json"))
}

pub fn is_entry_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("json")
}

/// Sibling written by an interrupted atomic write: `<digest>.<nonce>.tmp`.
pub fn is_temp_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("tmp")
}
