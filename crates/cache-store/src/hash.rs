use blake3::Hasher;

/// Content address for an opaque key; used as the on-disk file stem.
pub fn key_digest(key: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(key.as_bytes());
    hasher.finalize().to_hex().to_string()
}
