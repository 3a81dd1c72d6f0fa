//! Delete queue & GC (component F): a persisted FIFO of orphaned block ids, drained incrementally
//! so a single GC tick never has to reclaim an unbounded amount of history at once.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    keys,
    record::{from_bytes, to_bytes, BlockId, DeadQueue, Manifest},
    storage::StorageAdapter,
};

/// Handle to the singleton dead-queue record.
pub struct DeleteQueueHandle<S> {
    adapter: Arc<S>,
}

impl<S> std::fmt::Debug for DeleteQueueHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeleteQueueHandle").finish_non_exhaustive()
    }
}

impl<S: StorageAdapter> DeleteQueueHandle<S> {
    pub fn new(adapter: Arc<S>) -> Self {
        Self { adapter }
    }

    fn read(&self) -> Option<DeadQueue> {
        match self.adapter.get_bytes(keys::dead_queue_key()) {
            Ok(Some(bytes)) => match from_bytes(&bytes) {
                Ok(queue) => Some(queue),
                Err(err) => {
                    warn!(%err, "dead queue: corrupt record");
                    None
                }
            },
            Ok(None) => Some(DeadQueue::default()),
            Err(err) => {
                warn!(%err, "dead queue: failed to read");
                None
            }
        }
    }

    fn write(&self, queue: &DeadQueue) -> bool {
        match self.adapter.put_bytes(keys::dead_queue_key(), &to_bytes(queue)) {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "dead queue: failed to persist");
                false
            }
        }
    }

    /// Appends `id`. Best-effort: a corrupt existing queue or a failed write is logged and
    /// silently dropped — an occasional leaked record beats a crash.
    pub fn enqueue(&self, id: BlockId) {
        let Some(mut queue) = self.read() else {
            return;
        };
        queue.entries.push(id);
        self.write(&queue);
    }

    pub fn len(&self) -> usize {
        self.read().map(|q| q.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains `max(1, ceil(len/10))` entries from the head (zero if empty), reclaiming each
    /// entry's manifest-referenced values and machines before the entry's own records so a
    /// crashed tick leaves it recoverable on restart. Returns the number of entries drained.
    pub fn gc_tick(&self) -> usize {
        let Some(mut queue) = self.read() else {
            return 0;
        };
        if queue.entries.is_empty() {
            return 0;
        }

        let batch = std::cmp::max(1, queue.entries.len().div_ceil(10));
        let drain_count = batch.min(queue.entries.len());
        let batch_ids: Vec<BlockId> = queue.entries.drain(..drain_count).collect();

        for id in &batch_ids {
            self.reclaim_one(*id);
        }

        self.write(&queue);
        debug!(count = batch_ids.len(), "gc_tick drained entries");
        batch_ids.len()
    }

    fn reclaim_one(&self, id: BlockId) {
        let manifest: Manifest = match self.adapter.get_bytes(&keys::manifest_key(&id)) {
            Ok(Some(bytes)) => match from_bytes(&bytes) {
                Ok(manifest) => manifest,
                Err(err) => {
                    warn!(%err, %id, "gc: corrupt manifest, dropping entry");
                    return;
                }
            },
            Ok(None) => {
                debug!(%id, "gc: manifest already absent, dropping entry");
                return;
            }
            Err(err) => {
                warn!(%err, %id, "gc: failed to read manifest");
                return;
            }
        };

        for hash in &manifest.value_hashes {
            if let Err(err) = self.adapter.delete_value(*hash) {
                warn!(%err, %id, "gc: failed to delete value");
            }
        }
        for hash in &manifest.machine_hashes {
            if let Err(err) = self.adapter.delete_machine(*hash) {
                warn!(%err, %id, "gc: failed to delete machine");
            }
        }

        let _ = self.adapter.delete_bytes(&keys::contents_key(&id));
        let _ = self.adapter.delete_bytes(&keys::links_key(&id));
        // Manifest deleted last: a crashed tick leaves the entry recoverable.
        let _ = self.adapter.delete_bytes(&keys::manifest_key(&id));
    }
}
