//! Shared test fixtures: a fake [`ChainClient`] and a temp-dir-backed store. Only compiled under
//! `cfg(test)` or the `test-utils` feature.

use std::{collections::HashMap, sync::Mutex};

use crate::{
    collaborators::ChainClient,
    error::ChainClientError,
    facade::CheckpointStore,
    record::{BlockId, Hash32},
    storage_sled::SledStorageAdapter,
};

/// In-memory canonical `(height -> header hash)` oracle, mutable after construction so tests can
/// simulate a reorg becoming visible between calls.
#[derive(Debug, Default)]
pub struct FakeChainClient {
    canonical: Mutex<HashMap<u64, Hash32>>,
}

impl FakeChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, height: u64, header_hash: Hash32) {
        self.canonical.lock().unwrap().insert(height, header_hash);
    }

    pub fn remove(&self, height: u64) {
        self.canonical.lock().unwrap().remove(&height);
    }
}

#[async_trait::async_trait]
impl ChainClient for FakeChainClient {
    async fn block_id_at(&self, height: u64) -> Result<BlockId, ChainClientError> {
        self.canonical
            .lock()
            .unwrap()
            .get(&height)
            .map(|hash| BlockId::new(height, *hash))
            .ok_or_else(|| ChainClientError(format!("no canonical block at height {height}")))
    }
}

/// Builds a `(height, header_hash)` pair for test scenarios: a 32-byte hash with `tag` in every
/// byte.
pub fn test_block(height: u64, tag: u8) -> BlockId {
    BlockId::new(height, [tag; 32])
}

/// A temporary, non-persistent store paired with a fake chain client the caller can mutate.
pub fn fresh_store() -> (CheckpointStore<SledStorageAdapter, FakeChainClient>, std::sync::Arc<FakeChainClient>) {
    let adapter = std::sync::Arc::new(SledStorageAdapter::open_temporary(Vec::new()).unwrap());
    let chain_client = std::sync::Arc::new(FakeChainClient::new());
    let store = CheckpointStore::from_parts(adapter, std::sync::Arc::clone(&chain_client), 16);
    (store, chain_client)
}
