//! Reorg reconciler (component E): walks the tip backward against the chain client's canonical
//! view, unlinking orphaned tips until the canonical tip is found or the store empties out.
//!
//! Every truncation is routed through the [`WriterHandle`] so reconciliation still leaves the KV
//! engine mutated only by the writer task, even though the chain-client calls that drive the walk
//! are not themselves serialized by the writer.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    collaborators::ChainClient, error::StorageError, gc::DeleteQueueHandle, index::CheckpointIndex,
    storage::StorageAdapter, writer::WriterHandle,
};

/// Walks the on-disk tip backward against `C` until it matches the canonical chain.
pub struct Reconciler<S, C> {
    index: Arc<CheckpointIndex<S>>,
    dead_queue: Arc<DeleteQueueHandle<S>>,
    writer: WriterHandle,
    chain_client: Arc<C>,
}

impl<S, C> std::fmt::Debug for Reconciler<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl<S: StorageAdapter, C: ChainClient> Reconciler<S, C> {
    pub fn new(
        index: Arc<CheckpointIndex<S>>,
        dead_queue: Arc<DeleteQueueHandle<S>>,
        writer: WriterHandle,
        chain_client: Arc<C>,
    ) -> Self {
        Self {
            index,
            dead_queue,
            writer,
            chain_client,
        }
    }

    /// Truncates the current tip and enqueues it for GC as one writer job, returning the new tip
    /// (`None` once the store has emptied out) or `None` on any failure (abort).
    async fn truncate_and_enqueue(&self) -> Option<crate::record::BlockId> {
        let index = Arc::clone(&self.index);
        let dead_queue = Arc::clone(&self.dead_queue);
        let result = self
            .writer
            .submit_and_wait(move || -> Result<_, StorageError> {
                let outcome = index.truncate_tip()?;
                if let Some(outcome) = &outcome {
                    dead_queue.enqueue(outcome.removed);
                }
                Ok(outcome)
            })
            .await;

        match result {
            Some(Ok(Some(outcome))) => {
                info!(orphaned = %outcome.removed, "reconcile: unlinked orphaned tip");
                outcome.new_tip
            }
            Some(Ok(None)) => {
                warn!("reconcile: tip vanished mid-reconciliation, aborting");
                None
            }
            Some(Err(err)) => {
                warn!(%err, "reconcile: failed to truncate tip, aborting");
                None
            }
            None => {
                warn!("reconcile: writer task unavailable, aborting");
                None
            }
        }
    }

    /// Runs the reconciliation protocol once. Opportunistic: any chain-client error aborts
    /// silently, leaving the store untouched for the next invocation to retry. Safe to call
    /// repeatedly and safe to interrupt between any two steps — it always resumes from whatever
    /// metadata is currently persisted.
    pub async fn reconcile(&self) {
        let metadata = match self.index.read_metadata() {
            Ok(Some(metadata)) => metadata,
            Ok(None) => return,
            Err(err) => {
                warn!(%err, "reconcile: failed to read metadata, aborting");
                return;
            }
        };
        let mut tip = metadata.newest;

        while metadata.oldest.height < tip.height {
            let canonical = match self.chain_client.block_id_at(tip.height).await {
                Ok(id) => id,
                Err(err) => {
                    warn!(%err, "reconcile: chain client unavailable, aborting");
                    return;
                }
            };
            if canonical.header_hash == tip.header_hash {
                debug!(%tip, "reconcile: canonical tip confirmed");
                return;
            }

            match self.truncate_and_enqueue().await {
                Some(new_tip) => tip = new_tip,
                None => return,
            }
        }

        // Exactly one record remains.
        match self.chain_client.block_id_at(tip.height).await {
            Ok(canonical) if canonical.header_hash == tip.header_hash => {
                debug!(%tip, "reconcile: sole remaining record is canonical");
            }
            Ok(_) => {
                if self.truncate_and_enqueue().await.is_none() {
                    debug!("reconcile: sole remaining record orphaned, store now empty");
                }
            }
            Err(err) => {
                warn!(%err, "reconcile: chain client unavailable checking sole record, aborting");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        error::ChainClientError,
        gc::DeleteQueueHandle,
        index::CheckpointIndex,
        record::{BlockId, Hash32},
        storage_sled::SledStorageAdapter,
        writer::spawn_writer,
    };

    use super::*;

    struct FixedChainClient {
        canonical: Vec<(u64, Hash32)>,
    }

    #[async_trait::async_trait]
    impl ChainClient for FixedChainClient {
        async fn block_id_at(&self, height: u64) -> Result<BlockId, ChainClientError> {
            self.canonical
                .iter()
                .find(|(h, _)| *h == height)
                .map(|(h, hash)| BlockId::new(*h, *hash))
                .ok_or_else(|| ChainClientError(format!("no canonical block at height {height}")))
        }
    }

    fn hash(b: u8) -> Hash32 {
        [b; 32]
    }

    async fn setup() -> (
        Arc<CheckpointIndex<SledStorageAdapter>>,
        Arc<DeleteQueueHandle<SledStorageAdapter>>,
        WriterHandle,
    ) {
        let adapter = Arc::new(SledStorageAdapter::open_temporary(Vec::new()).unwrap());
        let index = Arc::new(CheckpointIndex::new(Arc::clone(&adapter)));
        let dead_queue = Arc::new(DeleteQueueHandle::new(adapter));
        let (writer, task) = spawn_writer(8);
        tokio::spawn(task);
        (index, dead_queue, writer)
    }

    #[tokio::test]
    async fn test_reconcile_noop_on_empty_store() {
        let (index, dead_queue, writer) = setup().await;
        let chain_client = Arc::new(FixedChainClient { canonical: vec![] });
        let reconciler = Reconciler::new(index, dead_queue, writer, chain_client);
        reconciler.reconcile().await; // must not panic
    }

    #[tokio::test]
    async fn test_reconcile_confirms_matching_tip() {
        let (index, dead_queue, writer) = setup().await;
        let id_a = BlockId::new(10, hash(0xa));
        index.write_checkpoint(id_a, id_a, b"a", &[], &[]).unwrap();

        let chain_client = Arc::new(FixedChainClient {
            canonical: vec![(10, hash(0xa))],
        });
        let reconciler = Reconciler::new(Arc::clone(&index), dead_queue, writer, chain_client);
        reconciler.reconcile().await;

        assert_eq!(index.tip().unwrap(), Some(id_a));
    }

    #[tokio::test]
    async fn test_reconcile_unwinds_orphaned_tip() {
        let (index, dead_queue, writer) = setup().await;
        let id_a = BlockId::new(10, hash(0xa));
        let id_b = BlockId::new(11, hash(0xb));
        let id_c = BlockId::new(12, hash(0xc));
        index.write_checkpoint(id_a, id_a, b"a", &[], &[]).unwrap();
        index.write_checkpoint(id_b, id_a, b"b", &[], &[]).unwrap();
        index.write_checkpoint(id_c, id_b, b"c", &[], &[]).unwrap();

        // Canonical chain diverges at height 12; height 11 matches.
        let chain_client = Arc::new(FixedChainClient {
            canonical: vec![(10, hash(0xa)), (11, hash(0xb)), (12, hash(0xff))],
        });
        let reconciler = Reconciler::new(
            Arc::clone(&index),
            Arc::clone(&dead_queue),
            writer,
            chain_client,
        );
        reconciler.reconcile().await;

        assert_eq!(index.tip().unwrap(), Some(id_b));
        assert_eq!(dead_queue.len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_empties_store_on_full_divergence() {
        let (index, dead_queue, writer) = setup().await;
        let id_a = BlockId::new(10, hash(0xa));
        index.write_checkpoint(id_a, id_a, b"a", &[], &[]).unwrap();

        let chain_client = Arc::new(FixedChainClient {
            canonical: vec![(10, hash(0xff))],
        });
        let reconciler = Reconciler::new(
            Arc::clone(&index),
            Arc::clone(&dead_queue),
            writer,
            chain_client,
        );
        reconciler.reconcile().await;

        assert_eq!(index.tip().unwrap(), None);
        assert_eq!(dead_queue.len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_aborts_silently_on_chain_client_error() {
        let (index, dead_queue, writer) = setup().await;
        let id_a = BlockId::new(10, hash(0xa));
        index.write_checkpoint(id_a, id_a, b"a", &[], &[]).unwrap();

        let chain_client = Arc::new(FixedChainClient { canonical: vec![] });
        let reconciler = Reconciler::new(
            Arc::clone(&index),
            Arc::clone(&dead_queue),
            writer,
            chain_client,
        );
        reconciler.reconcile().await;

        // Store is untouched: the only height has no canonical answer configured.
        assert_eq!(index.tip().unwrap(), Some(id_a));
        assert!(dead_queue.is_empty());
    }
}
