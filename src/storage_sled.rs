//! `sled`-backed [`StorageAdapter`] implementation.
//!
//! One `sled::Db` per store directory holding five named trees: `bytes` (namespaced records),
//! `values` + `values_rc`, and `machines` + `machines_rc` (content-addressed stores with
//! refcounting).

use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::{error::StorageResult, record::Hash32, storage::StorageAdapter};

const TREE_BYTES: &[u8] = b"bytes";
const TREE_VALUES: &[u8] = b"values";
const TREE_VALUES_RC: &[u8] = b"values_rc";
const TREE_MACHINES: &[u8] = b"machines";
const TREE_MACHINES_RC: &[u8] = b"machines_rc";

/// `sled`-backed storage adapter.
pub struct SledStorageAdapter {
    db: sled::Db,
    bytes: sled::Tree,
    values: sled::Tree,
    values_rc: sled::Tree,
    machines: sled::Tree,
    machines_rc: sled::Tree,
    genesis_machine: Vec<u8>,
}

impl std::fmt::Debug for SledStorageAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStorageAdapter")
            .field("path", &self.db.was_recovered())
            .finish_non_exhaustive()
    }
}

impl SledStorageAdapter {
    /// Opens (creating if necessary) a sled database at `path`.
    ///
    /// `genesis_machine` bootstraps [`StorageAdapter::initial_machine`] for a fresh store; it is
    /// the caller's responsibility to have produced it from `code_file_path`.
    pub fn open(path: &Path, genesis_machine: Vec<u8>) -> StorageResult<Self> {
        let db = sled::open(path)?;
        let bytes = db.open_tree(TREE_BYTES)?;
        let values = db.open_tree(TREE_VALUES)?;
        let values_rc = db.open_tree(TREE_VALUES_RC)?;
        let machines = db.open_tree(TREE_MACHINES)?;
        let machines_rc = db.open_tree(TREE_MACHINES_RC)?;

        Ok(Self {
            db,
            bytes,
            values,
            values_rc,
            machines,
            machines_rc,
            genesis_machine,
        })
    }

    /// Opens a temporary, non-persistent store. Only meant for tests.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn open_temporary(genesis_machine: Vec<u8>) -> StorageResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        let bytes = db.open_tree(TREE_BYTES)?;
        let values = db.open_tree(TREE_VALUES)?;
        let values_rc = db.open_tree(TREE_VALUES_RC)?;
        let machines = db.open_tree(TREE_MACHINES)?;
        let machines_rc = db.open_tree(TREE_MACHINES_RC)?;

        Ok(Self {
            db,
            bytes,
            values,
            values_rc,
            machines,
            machines_rc,
            genesis_machine,
        })
    }

    fn incr_rc(rc_tree: &sled::Tree, key: &[u8]) -> StorageResult<u32> {
        let next = match rc_tree.get(key)? {
            Some(bytes) => u32::from_le_bytes(bytes.as_ref().try_into().unwrap_or_default()) + 1,
            None => 1,
        };
        rc_tree.insert(key, &next.to_le_bytes())?;
        Ok(next)
    }

    /// Decrements a refcount, removing the entry when it reaches zero. Returns `true` if the
    /// backing object was removed.
    fn decr_rc(
        data_tree: &sled::Tree,
        rc_tree: &sled::Tree,
        key: &[u8],
    ) -> StorageResult<bool> {
        let Some(bytes) = rc_tree.get(key)? else {
            // Already absent: delete is idempotent.
            return Ok(false);
        };
        let count = u32::from_le_bytes(bytes.as_ref().try_into().unwrap_or_default());
        if count <= 1 {
            rc_tree.remove(key)?;
            data_tree.remove(key)?;
            Ok(true)
        } else {
            rc_tree.insert(key, &(count - 1).to_le_bytes())?;
            Ok(false)
        }
    }
}

impl StorageAdapter for SledStorageAdapter {
    fn get_bytes(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.bytes.get(key)?.map(|v| v.to_vec()))
    }

    fn put_bytes(&self, key: &[u8], bytes: &[u8]) -> StorageResult<()> {
        self.bytes.insert(key, bytes)?;
        Ok(())
    }

    fn delete_bytes(&self, key: &[u8]) -> StorageResult<()> {
        self.bytes.remove(key)?;
        Ok(())
    }

    fn put_value(&self, hash: Hash32, value: &[u8]) -> StorageResult<()> {
        let count = Self::incr_rc(&self.values_rc, &hash)?;
        if count == 1 {
            self.values.insert(hash, value)?;
        }
        trace!(hash = %hex::encode(hash), count, "put_value");
        Ok(())
    }

    fn delete_value(&self, hash: Hash32) -> StorageResult<()> {
        let removed = Self::decr_rc(&self.values, &self.values_rc, &hash)?;
        if removed {
            debug!(hash = %hex::encode(hash), "value reclaimed");
        }
        Ok(())
    }

    fn get_value(&self, hash: Hash32) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.values.get(hash)?.map(|v| v.to_vec()))
    }

    fn put_machine(&self, machine: &[u8]) -> StorageResult<Hash32> {
        let hash: Hash32 = Sha256::digest(machine).into();
        let count = Self::incr_rc(&self.machines_rc, &hash)?;
        if count == 1 {
            self.machines.insert(hash, machine)?;
        }
        trace!(hash = %hex::encode(hash), count, "put_machine");
        Ok(hash)
    }

    fn delete_machine(&self, hash: Hash32) -> StorageResult<()> {
        let removed = Self::decr_rc(&self.machines, &self.machines_rc, &hash)?;
        if removed {
            debug!(hash = %hex::encode(hash), "machine reclaimed");
        }
        Ok(())
    }

    fn get_machine(&self, hash: Hash32) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.machines.get(hash)?.map(|v| v.to_vec()))
    }

    fn initial_machine(&self) -> StorageResult<Vec<u8>> {
        Ok(self.genesis_machine.clone())
    }

    fn close(&self) -> StorageResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> SledStorageAdapter {
        SledStorageAdapter::open_temporary(b"genesis".to_vec()).unwrap()
    }

    #[test]
    fn test_value_refcounting() {
        let a = adapter();
        let hash = [1u8; 32];
        a.put_value(hash, b"hello").unwrap();
        a.put_value(hash, b"hello").unwrap(); // second reference
        assert_eq!(a.get_value(hash).unwrap().as_deref(), Some(&b"hello"[..]));

        a.delete_value(hash).unwrap();
        assert!(a.get_value(hash).unwrap().is_some(), "one reference remains");

        a.delete_value(hash).unwrap();
        assert!(a.get_value(hash).unwrap().is_none(), "last reference gone");
    }

    #[test]
    fn test_put_machine_is_content_addressed() {
        let a = adapter();
        let h1 = a.put_machine(b"state-a").unwrap();
        let h2 = a.put_machine(b"state-a").unwrap();
        assert_eq!(h1, h2);
        assert_eq!(a.get_machine(h1).unwrap().as_deref(), Some(&b"state-a"[..]));
    }

    #[test]
    fn test_delete_value_is_idempotent() {
        let a = adapter();
        a.delete_value([9u8; 32]).unwrap();
    }

    #[test]
    fn test_initial_machine_returns_genesis() {
        let a = adapter();
        assert_eq!(a.initial_machine().unwrap(), b"genesis".to_vec());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let a = adapter();
        a.put_bytes(b"metadata", b"md-bytes").unwrap();
        assert_eq!(
            a.get_bytes(b"metadata").unwrap().as_deref(),
            Some(&b"md-bytes"[..])
        );
        a.delete_bytes(b"metadata").unwrap();
        assert!(a.get_bytes(b"metadata").unwrap().is_none());
    }
}
