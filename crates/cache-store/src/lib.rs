//! Durable key → blob storage used by the agent cache.
//!
//! Keys are opaque strings; values are raw bytes. Writes are atomic (a reader
//! never observes a half-written entry) and the on-disk root is created lazily
//! on the first write.

pub mod api;
pub mod errors;
pub mod fs;
pub mod hash;
pub mod memory;
pub mod policy;

pub use api::{CacheStorage, EntryMeta, FsCacheStorage, StorageResult};
pub use errors::{CacheErrKind, CacheError};
pub use memory::MemoryCacheStorage;
pub use policy::StoragePolicy;
