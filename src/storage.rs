//! Storage adapter contract (component C).
//!
//! A thin synchronous wrapper over the external KV engine. The adapter alone decides atomicity
//! granularity: single-key writes must be atomic; multi-key writes need not be.
//! This crate treats values and machines as opaque byte blobs — the caller's serializers live
//! outside this crate.

use crate::{error::StorageResult, record::Hash32};

/// Synchronous KV + content-addressed-store contract consumed by the index, reorg reconciler,
/// and GC. All methods are synchronous: callers that need async behavior (the facade's
/// `save_async`) run them from the single async-writer task or via `spawn_blocking`.
pub trait StorageAdapter: Send + Sync + 'static {
    /// Raw namespaced byte read, used for records (metadata, manifest, contents, links,
    /// deadqueue).
    fn get_bytes(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Raw namespaced byte write. Single-key, so this alone is atomic.
    fn put_bytes(&self, key: &[u8], bytes: &[u8]) -> StorageResult<()>;

    /// Raw namespaced byte delete. No-op if the key is already absent.
    fn delete_bytes(&self, key: &[u8]) -> StorageResult<()>;

    /// Inserts or increments the refcount of a caller-hashed value.
    fn put_value(&self, hash: Hash32, value: &[u8]) -> StorageResult<()>;

    /// Decrements the refcount of a value, removing it at zero. No-op if absent.
    fn delete_value(&self, hash: Hash32) -> StorageResult<()>;

    /// Reads a value by hash.
    fn get_value(&self, hash: Hash32) -> StorageResult<Option<Vec<u8>>>;

    /// Inserts or increments the refcount of a machine. The adapter computes the content hash
    /// (unlike values, whose hash the caller already knows) and returns it.
    fn put_machine(&self, machine: &[u8]) -> StorageResult<Hash32>;

    /// Decrements the refcount of a machine, removing it at zero. No-op if absent.
    fn delete_machine(&self, hash: Hash32) -> StorageResult<()>;

    /// Reads a machine by hash.
    fn get_machine(&self, hash: Hash32) -> StorageResult<Option<Vec<u8>>>;

    /// Produces the genesis machine used to bootstrap a store with no checkpoints yet.
    fn initial_machine(&self) -> StorageResult<Vec<u8>>;

    /// Flushes and releases the underlying KV engine handle.
    fn close(&self) -> StorageResult<()>;
}
