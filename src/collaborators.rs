//! External collaborator contracts: the chain client and the caller's restore callback.
//!
//! Both are out of scope for this crate's implementation — only their contracts live here.

use async_trait::async_trait;

use crate::{
    error::{ChainClientError, RestoreError},
    record::{BlockId, Hash32},
    storage::StorageAdapter,
};

/// Canonical `(height -> header hash)` oracle. Implemented by the embedding process against its
/// view of the chain.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Returns the canonical block id at `height`. Errors are treated as transient by the
    /// reconciler: reconciliation aborts silently and retries on the next invocation.
    async fn block_id_at(&self, height: u64) -> Result<BlockId, ChainClientError>;
}

/// Capability handed to a [`RestoreCallback`], resolving the hashes named in a checkpoint's
/// manifest without exposing the rest of the storage adapter's surface.
pub struct RestoreContext<'a, S> {
    adapter: &'a S,
}

impl<'a, S: StorageAdapter> RestoreContext<'a, S> {
    pub(crate) fn new(adapter: &'a S) -> Self {
        Self { adapter }
    }

    /// Looks up a value by hash.
    pub fn value(&self, hash: Hash32) -> Option<Vec<u8>> {
        self.adapter.get_value(hash).ok().flatten()
    }

    /// Looks up a machine state by hash.
    pub fn machine(&self, hash: Hash32) -> Option<Vec<u8>> {
        self.adapter.get_machine(hash).ok().flatten()
    }
}

/// Caller-supplied reconstitution of higher-level validator state from a checkpoint blob.
pub trait RestoreCallback<S> {
    fn restore(&mut self, contents: &[u8], ctx: &RestoreContext<'_, S>) -> Result<(), RestoreError>;
}

impl<S, F> RestoreCallback<S> for F
where
    F: FnMut(&[u8], &RestoreContext<'_, S>) -> Result<(), RestoreError>,
{
    fn restore(&mut self, contents: &[u8], ctx: &RestoreContext<'_, S>) -> Result<(), RestoreError> {
        self(contents, ctx)
    }
}
