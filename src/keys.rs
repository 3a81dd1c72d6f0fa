//! Deterministic byte keys for per-block records and singletons (component A).

use crate::record::{to_bytes, BlockId};

const MANIFEST_PREFIX: &[u8] = b"manifest:";
const CONTENTS_PREFIX: &[u8] = b"contents:";
const LINKS_PREFIX: &[u8] = b"links:";
const METADATA_KEY: &[u8] = b"metadata";
const DEAD_QUEUE_KEY: &[u8] = b"deadqueue";

fn per_block_key(prefix: &[u8], id: &BlockId) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 40);
    key.extend_from_slice(prefix);
    key.extend_from_slice(&to_bytes(id));
    key
}

pub fn manifest_key(id: &BlockId) -> Vec<u8> {
    per_block_key(MANIFEST_PREFIX, id)
}

pub fn contents_key(id: &BlockId) -> Vec<u8> {
    per_block_key(CONTENTS_PREFIX, id)
}

pub fn links_key(id: &BlockId) -> Vec<u8> {
    per_block_key(LINKS_PREFIX, id)
}

pub fn metadata_key() -> &'static [u8] {
    METADATA_KEY
}

pub fn dead_queue_key() -> &'static [u8] {
    DEAD_QUEUE_KEY
}
