use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs;

use super::layout::{is_entry_file, is_temp_file};

/// Lists entry files under every shard directory. A missing root yields nothing.
pub async fn list_entry_files(namespace_root: &Path) -> io::Result<Vec<PathBuf>> {
    list_shard_files(namespace_root, is_entry_file).await
}

/// Lists temp files left by interrupted writes.
pub async fn list_temp_files(namespace_root: &Path) -> io::Result<Vec<PathBuf>> {
    list_shard_files(namespace_root, is_temp_file).await
}

/// Deletes temp files last modified before `cutoff`. Younger ones may belong
/// to a write still in progress.
pub async fn remove_stale_temp_files(namespace_root: &Path, cutoff: SystemTime) -> io::Result<usize> {
    let mut removed = 0usize;
    for path in list_temp_files(namespace_root).await? {
        let modified = match fs::metadata(&path).await.and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err),
        };
        if modified >= cutoff {
            continue;
        }
        match fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
    }
    Ok(removed)
}

async fn list_shard_files(namespace_root: &Path, keep: fn(&Path) -> bool) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut shards = match fs::read_dir(namespace_root).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(files),
        Err(err) => return Err(err),
    };
    while let Some(shard) = shards.next_entry().await? {
        if !shard.file_type().await?.is_dir() {
            continue;
        }
        let mut entries = fs::read_dir(shard.path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if keep(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
