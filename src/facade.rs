//! Public facade (component H): `has_state`, `restore_latest`, `save_async`, `trim_before`,
//! `initial_machine`, `get_value`/`get_machine`, `close`. Holds no state beyond references to
//! components D-G and the storage adapter.

use std::{path::Path, sync::Arc};

use anyhow::Context;
use tracing::instrument;

use crate::{
    collaborators::{ChainClient, RestoreCallback, RestoreContext},
    config::StoreConfig,
    error::{CheckpointError, CheckpointResult, StorageError},
    gc::DeleteQueueHandle,
    index::CheckpointIndex,
    record::{BlockId, Hash32},
    storage::StorageAdapter,
    storage_sled::SledStorageAdapter,
    writer::{spawn_writer, WriterHandle},
};

/// Bounded submission channel size for the async writer.
const DEFAULT_WRITER_CAPACITY: usize = 64;

/// Composes the checkpoint index, reorg reconciler, delete queue, and async writer behind the
/// collaborator contracts.
pub struct CheckpointStore<S, C> {
    index: Arc<CheckpointIndex<S>>,
    dead_queue: Arc<DeleteQueueHandle<S>>,
    reconciler: crate::reorg::Reconciler<S, C>,
    writer: WriterHandle,
}

impl<S, C> std::fmt::Debug for CheckpointStore<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointStore").finish_non_exhaustive()
    }
}

impl<S: StorageAdapter, C: ChainClient> CheckpointStore<S, C> {
    /// Wires a pre-built storage adapter and chain client into a store, spawning the single
    /// writer task. Used directly by tests with fake adapters/clients; [`Self::open`] is the
    /// sled-backed constructor for production use.
    pub fn from_parts(adapter: Arc<S>, chain_client: Arc<C>, writer_capacity: usize) -> Self {
        let index = Arc::new(CheckpointIndex::new(Arc::clone(&adapter)));
        let dead_queue = Arc::new(DeleteQueueHandle::new(adapter));
        let (writer, task) = spawn_writer(writer_capacity);
        tokio::spawn(task);
        let reconciler = crate::reorg::Reconciler::new(
            Arc::clone(&index),
            Arc::clone(&dead_queue),
            writer.clone(),
            chain_client,
        );
        Self {
            index,
            dead_queue,
            reconciler,
            writer,
        }
    }

    /// `true` iff the store holds at least one checkpoint.
    pub fn has_state(&self) -> CheckpointResult<bool> {
        Ok(self.index.tip()?.is_some())
    }

    /// Reconciles against the chain client, then hands the current tip's contents and a
    /// [`RestoreContext`] to `callback`.
    #[instrument(skip(self, callback))]
    pub async fn restore_latest<R: RestoreCallback<S>>(&self, mut callback: R) -> CheckpointResult<()> {
        self.reconciler.reconcile().await;

        let tip = self.index.tip()?.ok_or(CheckpointError::NotFound)?;
        let contents = self.index.restore(&tip)?.ok_or(CheckpointError::NotFound)?;
        let ctx = RestoreContext::new(self.index.adapter().as_ref());
        callback.restore(&contents, &ctx)?;
        Ok(())
    }

    /// Appends a new checkpoint at the tip, routed through the async writer so it serializes with
    /// every other mutation. Resolves once the write has landed.
    #[instrument(skip(self, contents, values, machines), fields(%id))]
    pub async fn save_async(
        &self,
        id: BlockId,
        contents: Vec<u8>,
        values: Vec<(Hash32, Vec<u8>)>,
        machines: Vec<Vec<u8>>,
    ) -> CheckpointResult<()> {
        let index = Arc::clone(&self.index);
        let result = self
            .writer
            .submit_and_wait(move || -> Result<(), StorageError> {
                let prev_newest = index.tip()?.unwrap_or(id);
                index.write_checkpoint(id, prev_newest, &contents, &values, &machines)
            })
            .await;

        match result {
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => Err(err.into()),
            None => Err(CheckpointError::StorageFault(StorageError::Kv(
                "writer task unavailable".to_string(),
            ))),
        }
    }

    /// Enqueues every checkpoint older than `earliest_kept_height` for GC (best-effort). Routed
    /// through the writer so it serializes with concurrent saves/reconciliation.
    #[instrument(skip(self))]
    pub async fn trim_before(&self, earliest_kept_height: u64) {
        let index = Arc::clone(&self.index);
        let dead_queue = Arc::clone(&self.dead_queue);
        self.writer
            .submit_and_wait(move || {
                for id in index.trim_head_until(earliest_kept_height) {
                    dead_queue.enqueue(id);
                }
            })
            .await;
    }

    /// Runs one GC tick, reclaiming a bounded batch from the head of the delete queue.
    pub fn gc_tick(&self) -> usize {
        self.dead_queue.gc_tick()
    }

    pub fn initial_machine(&self) -> CheckpointResult<Vec<u8>> {
        Ok(self.index.adapter().initial_machine()?)
    }

    pub fn get_value(&self, hash: Hash32) -> CheckpointResult<Option<Vec<u8>>> {
        Ok(self.index.adapter().get_value(hash)?)
    }

    pub fn get_machine(&self, hash: Hash32) -> CheckpointResult<Option<Vec<u8>>> {
        Ok(self.index.adapter().get_machine(hash)?)
    }

    /// Flushes and releases the underlying KV engine handle. Does not stop the writer task;
    /// dropping every clone of this store's handle does that.
    pub fn close(&self) -> CheckpointResult<()> {
        Ok(self.index.adapter().close()?)
    }
}

impl<C: ChainClient> CheckpointStore<SledStorageAdapter, C> {
    /// Opens (or creates) a sled-backed store under `base_dir`, per `config`.
    pub fn open(config: &StoreConfig, base_dir: &Path, chain_client: Arc<C>) -> CheckpointResult<Self> {
        let store_dir = config.resolve_store_dir(base_dir);

        if config.force_fresh_start && store_dir.exists() {
            std::fs::remove_dir_all(&store_dir)
                .context("removing store directory for force_fresh_start")?;
        }
        std::fs::create_dir_all(&store_dir).context("creating store directory")?;

        let genesis_machine = match &config.code_file_path {
            Some(path) => std::fs::read(path).context("reading code_file_path")?,
            None => Vec::new(),
        };

        let adapter = Arc::new(SledStorageAdapter::open(&store_dir, genesis_machine)?);
        Ok(Self::from_parts(adapter, chain_client, DEFAULT_WRITER_CAPACITY))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::{
        error::{ChainClientError, RestoreError},
        storage_sled::SledStorageAdapter,
    };

    use super::*;

    struct NoBlocksChainClient;

    #[async_trait::async_trait]
    impl ChainClient for NoBlocksChainClient {
        async fn block_id_at(&self, height: u64) -> Result<BlockId, ChainClientError> {
            Err(ChainClientError(format!("no canonical block at {height}")))
        }
    }

    fn store() -> CheckpointStore<SledStorageAdapter, NoBlocksChainClient> {
        let adapter = Arc::new(SledStorageAdapter::open_temporary(b"genesis".to_vec()).unwrap());
        CheckpointStore::from_parts(adapter, Arc::new(NoBlocksChainClient), 8)
    }

    #[tokio::test]
    async fn test_empty_restore_reports_not_found() {
        let store = store();
        assert!(!store.has_state().unwrap());

        let result = store.restore_latest(|_: &[u8], _: &RestoreContext<'_, _>| Ok(())).await;
        assert!(matches!(result, Err(CheckpointError::NotFound)));
    }

    #[tokio::test]
    async fn test_single_save_then_restore() {
        let store = store();
        let id = BlockId::new(10, [0xa; 32]);
        let value_hash = [1u8; 32];

        store
            .save_async(id, b"x".to_vec(), vec![(value_hash, b"value-1".to_vec())], vec![])
            .await
            .unwrap();

        assert!(store.has_state().unwrap());

        let seen = AtomicUsize::new(0);
        store
            .restore_latest(|contents: &[u8], ctx: &RestoreContext<'_, _>| {
                assert_eq!(contents, b"x");
                assert_eq!(ctx.value(value_hash).as_deref(), Some(&b"value-1"[..]));
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_chain_of_saves_restores_the_tip() {
        let store = store();
        for height in [10u64, 11, 12] {
            let id = BlockId::new(height, [height as u8; 32]);
            store
                .save_async(id, format!("block-{height}").into_bytes(), vec![], vec![])
                .await
                .unwrap();
        }

        store
            .restore_latest(|contents: &[u8], _: &RestoreContext<'_, _>| {
                assert_eq!(contents, b"block-12");
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_metadata_surfaces_as_corrupt_not_storage_fault() {
        let store = store();
        store
            .index
            .adapter()
            .put_bytes(crate::keys::metadata_key(), b"\x00\x01garbage")
            .unwrap();

        let result = store.has_state();
        assert!(matches!(result, Err(CheckpointError::Corrupt(_))));

        let result = store
            .restore_latest(|_: &[u8], _: &RestoreContext<'_, _>| Ok(()))
            .await;
        assert!(matches!(result, Err(CheckpointError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_restore_callback_error_surfaces_to_caller() {
        let store = store();
        let id = BlockId::new(10, [0xa; 32]);
        store.save_async(id, b"x".to_vec(), vec![], vec![]).await.unwrap();

        let result = store
            .restore_latest(|_: &[u8], _: &RestoreContext<'_, _>| {
                Err(RestoreError("deserialize failed".to_string()))
            })
            .await;

        assert!(matches!(result, Err(CheckpointError::RestoreFailed(_))));
    }

    #[tokio::test]
    async fn test_trim_before_enqueues_and_gc_reclaims() {
        let store = store();
        for height in [10u64, 11, 12] {
            let id = BlockId::new(height, [height as u8; 32]);
            store.save_async(id, b"c".to_vec(), vec![], vec![]).await.unwrap();
        }

        store.trim_before(12).await;
        assert_eq!(store.dead_queue.len(), 2);

        while store.gc_tick() > 0 {}
        assert!(store.dead_queue.is_empty());
    }
}
