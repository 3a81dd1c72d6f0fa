//! Checkpoint index (component D): the linked history of metadata head/tail pointers and
//! per-block prev/next links.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::{
    error::{StorageError, StorageResult},
    keys,
    record::{from_bytes, to_bytes, BlockId, Hash32, Links, Manifest, Metadata, FORMAT_VERSION},
    storage::StorageAdapter,
};

/// Result of removing the current tip from the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncateOutcome {
    /// The id that was removed and should be handed to the delete queue.
    pub removed: BlockId,
    /// The new tip, or `None` if the store is now empty.
    pub new_tip: Option<BlockId>,
}

/// The linked history of checkpoint metadata, manifests, contents, and links.
///
/// Every method here is synchronous and assumes it is the only writer in flight — that
/// invariant is enforced by the async writer (component G), not by this type.
pub struct CheckpointIndex<S> {
    adapter: Arc<S>,
}

impl<S> std::fmt::Debug for CheckpointIndex<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointIndex").finish_non_exhaustive()
    }
}

impl<S: StorageAdapter> CheckpointIndex<S> {
    pub fn new(adapter: Arc<S>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &Arc<S> {
        &self.adapter
    }

    pub fn read_metadata(&self) -> StorageResult<Option<Metadata>> {
        match self.adapter.get_bytes(keys::metadata_key())? {
            Some(bytes) => Ok(Some(from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_metadata(&self, metadata: &Metadata) -> StorageResult<()> {
        self.adapter
            .put_bytes(keys::metadata_key(), &to_bytes(metadata))
    }

    fn delete_metadata(&self) -> StorageResult<()> {
        self.adapter.delete_bytes(keys::metadata_key())
    }

    pub fn read_links(&self, id: &BlockId) -> StorageResult<Option<Links>> {
        match self.adapter.get_bytes(&keys::links_key(id))? {
            Some(bytes) => Ok(Some(from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn read_manifest(&self, id: &BlockId) -> StorageResult<Option<Manifest>> {
        match self.adapter.get_bytes(&keys::manifest_key(id))? {
            Some(bytes) => Ok(Some(from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn read_contents(&self, id: &BlockId) -> StorageResult<Option<Vec<u8>>> {
        self.adapter.get_bytes(&keys::contents_key(id))
    }

    /// Inserts a new checkpoint at the tip.
    ///
    /// `prev_newest` must equal `id` itself (self-link) if the store is empty, or the current
    /// `metadata.newest` otherwise, with `prev_newest.height < id.height`. The manifest's value
    /// hashes are exactly the hashes in `values`; its machine hashes are the ones the adapter
    /// computes while writing `machines` (the adapter, not the caller, owns machine hashing —
    /// see `StorageAdapter::put_machine`).
    #[instrument(skip(self, contents, values, machines), fields(id = %id))]
    pub fn write_checkpoint(
        &self,
        id: BlockId,
        prev_newest: BlockId,
        contents: &[u8],
        values: &[(Hash32, Vec<u8>)],
        machines: &[Vec<u8>],
    ) -> StorageResult<()> {
        let existing = self.read_metadata()?;
        match &existing {
            None => {
                if prev_newest != id {
                    return Err(StorageError::Kv(format!(
                        "write_checkpoint: store is empty but prev_newest {prev_newest} != id {id}"
                    )));
                }
            }
            Some(md) => {
                if prev_newest != md.newest {
                    return Err(StorageError::Kv(format!(
                        "write_checkpoint: prev_newest {prev_newest} != current tip {}",
                        md.newest
                    )));
                }
                if prev_newest.height >= id.height {
                    return Err(StorageError::Kv(format!(
                        "write_checkpoint: id {id} does not extend tip {prev_newest}"
                    )));
                }
            }
        }

        // (1) values, (2) machines.
        for (hash, value) in values {
            self.adapter.put_value(*hash, value)?;
        }
        let mut machine_hashes = Vec::with_capacity(machines.len());
        for machine in machines {
            machine_hashes.push(self.adapter.put_machine(machine)?);
        }
        let value_hashes = values.iter().map(|(h, _)| *h).collect();
        let manifest = Manifest {
            value_hashes,
            machine_hashes,
        };

        // (3) manifest, contents, links.
        self.adapter
            .put_bytes(&keys::manifest_key(&id), &to_bytes(&manifest))?;
        self.adapter.put_bytes(&keys::contents_key(&id), contents)?;
        let links = Links {
            prev: prev_newest,
            next: id,
        };
        self.adapter
            .put_bytes(&keys::links_key(&id), &to_bytes(&links))?;

        // (4) rewire the previous tip's `next`, unless this is the first checkpoint.
        if prev_newest != id {
            if let Some(mut prev_links) = self.read_links(&prev_newest)? {
                prev_links.next = id;
                self.adapter
                    .put_bytes(&keys::links_key(&prev_newest), &to_bytes(&prev_links))?;
            }
        }

        // (5) metadata.
        let oldest = existing.map(|m| m.oldest).unwrap_or(id);
        self.write_metadata(&Metadata {
            format_version: FORMAT_VERSION,
            oldest,
            newest: id,
        })?;

        debug!(%oldest, newest = %id, "wrote checkpoint");
        Ok(())
    }

    /// Returns the contents for `id` if it falls within `[oldest.height, newest.height]`.
    ///
    /// Range membership is checked by *height only* — two checkpoints at the same height as
    /// `oldest`/`newest` but a different header hash are not distinguished here.
    pub fn restore(&self, id: &BlockId) -> StorageResult<Option<Vec<u8>>> {
        let Some(metadata) = self.read_metadata()? else {
            return Ok(None);
        };
        if id.height < metadata.oldest.height || id.height > metadata.newest.height {
            return Ok(None);
        }
        self.read_contents(id)
    }

    pub fn tip(&self) -> StorageResult<Option<BlockId>> {
        Ok(self.read_metadata()?.map(|m| m.newest))
    }

    /// Removes the current newest checkpoint. Never follows `next` (the removed tip has none, by
    /// invariant 3 — it's always a self-link).
    #[instrument(skip(self))]
    pub fn truncate_tip(&self) -> StorageResult<Option<TruncateOutcome>> {
        let Some(metadata) = self.read_metadata()? else {
            return Ok(None);
        };
        let tip = metadata.newest;
        let Some(links) = self.read_links(&tip)? else {
            return Ok(None);
        };

        if links.is_origin(&tip) {
            // Sole remaining record: the store becomes empty.
            self.delete_metadata()?;
            debug!(%tip, "truncated sole remaining checkpoint; store is now empty");
            return Ok(Some(TruncateOutcome {
                removed: tip,
                new_tip: None,
            }));
        }

        let new_tip = links.prev;
        self.write_metadata(&Metadata {
            format_version: metadata.format_version,
            oldest: metadata.oldest,
            newest: new_tip,
        })?;

        debug!(%tip, %new_tip, "truncated tip");
        Ok(Some(TruncateOutcome {
            removed: tip,
            new_tip: Some(new_tip),
        }))
    }

    /// Repeatedly advances `oldest` while `oldest.next.height < earliest_kept_height`, returning
    /// every id that was dropped from the head. Stops (without error) on the first decode
    /// failure, when only one record remains, or when the predicate fails — best-effort.
    #[instrument(skip(self))]
    pub fn trim_head_until(&self, earliest_kept_height: u64) -> Vec<BlockId> {
        let mut removed = Vec::new();
        loop {
            let Ok(Some(metadata)) = self.read_metadata() else {
                break;
            };
            if metadata.oldest == metadata.newest {
                break;
            }
            let Ok(Some(links)) = self.read_links(&metadata.oldest) else {
                break;
            };
            if links.next.height >= earliest_kept_height {
                break;
            }
            let new_metadata = Metadata {
                format_version: metadata.format_version,
                oldest: links.next,
                newest: metadata.newest,
            };
            if self.write_metadata(&new_metadata).is_err() {
                break;
            }
            removed.push(metadata.oldest);
        }
        if !removed.is_empty() {
            debug!(count = removed.len(), "trimmed checkpoints from head");
        }
        removed
    }
}
