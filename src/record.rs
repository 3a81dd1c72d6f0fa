//! Structured records (component B) for the on-disk wire format.
//!
//! Fields are encoded in a fixed order rather than as a self-describing map, since the store
//! controls both reader and writer. Forward tolerance of unknown trailing bytes is preserved by
//! never erroring on bytes left over after the known fields have been read.

use std::fmt;

use crate::{
    codec::{decode_vec, encode_vec, BufDecoder, Codec, Encoder},
    error::RecordError,
};

/// Current on-disk metadata format version.
pub const FORMAT_VERSION: u32 = 1;

/// 32-byte content-addressing tag used for both block header hashes and value/machine hashes.
pub type Hash32 = [u8; 32];

/// `(height, header_hash)` pair naming a chain block.
///
/// Equality and the codec consider both fields; ordering considers `height` only.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId {
    pub height: u64,
    pub header_hash: Hash32,
}

impl BlockId {
    pub fn new(height: u64, header_hash: Hash32) -> Self {
        Self {
            height,
            header_hash,
        }
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockId")
            .field("height", &self.height)
            .field("header_hash", &hex::encode(self.header_hash))
            .finish()
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.height, hex::encode(self.header_hash))
    }
}

impl PartialOrd for BlockId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BlockId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.height.cmp(&other.height)
    }
}

impl Codec for BlockId {
    fn encode(&self, enc: &mut impl Encoder) {
        self.height.encode(enc);
        self.header_hash.encode(enc);
    }

    fn decode(dec: &mut BufDecoder<'_>) -> Result<Self, RecordError> {
        let height = u64::decode(dec)?;
        let header_hash = Hash32::decode(dec)?;
        Ok(BlockId::new(height, header_hash))
    }
}

/// Singleton metadata record: present iff the store holds at least one checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub format_version: u32,
    pub oldest: BlockId,
    pub newest: BlockId,
}

impl Codec for Metadata {
    fn encode(&self, enc: &mut impl Encoder) {
        self.format_version.encode(enc);
        self.oldest.encode(enc);
        self.newest.encode(enc);
    }

    fn decode(dec: &mut BufDecoder<'_>) -> Result<Self, RecordError> {
        Ok(Metadata {
            format_version: u32::decode(dec)?,
            oldest: BlockId::decode(dec)?,
            newest: BlockId::decode(dec)?,
        })
    }
}

/// Doubly-linked chain pointers for one block.
///
/// Both fields are always a concrete [`BlockId`] — there is no optional/null representation. The
/// sentinel is a *self-link*: a freshly written tip has `next == id` (itself), and a chain's
/// origin record has `prev == id` (itself). [`Links::is_origin`] lets the index detect the sole-
/// remaining-record case directly from a block's own links, without cross-checking metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Links {
    pub prev: BlockId,
    pub next: BlockId,
}

impl Links {
    /// `true` if `id` has no recorded predecessor (its `prev` link points at itself).
    pub fn is_origin(&self, id: &BlockId) -> bool {
        self.prev == *id
    }
}

impl Codec for Links {
    fn encode(&self, enc: &mut impl Encoder) {
        self.prev.encode(enc);
        self.next.encode(enc);
    }

    fn decode(dec: &mut BufDecoder<'_>) -> Result<Self, RecordError> {
        Ok(Links {
            prev: BlockId::decode(dec)?,
            next: BlockId::decode(dec)?,
        })
    }
}

/// Ordered multiset of value/machine hashes a checkpoint's contents depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub value_hashes: Vec<Hash32>,
    pub machine_hashes: Vec<Hash32>,
}

impl Manifest {
    pub fn is_empty(&self) -> bool {
        self.value_hashes.is_empty() && self.machine_hashes.is_empty()
    }
}

impl Codec for Manifest {
    fn encode(&self, enc: &mut impl Encoder) {
        encode_vec(enc, &self.value_hashes);
        encode_vec(enc, &self.machine_hashes);
    }

    fn decode(dec: &mut BufDecoder<'_>) -> Result<Self, RecordError> {
        Ok(Manifest {
            value_hashes: decode_vec(dec)?,
            machine_hashes: decode_vec(dec)?,
        })
    }
}

/// Singleton persisted FIFO of block ids awaiting GC.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeadQueue {
    pub entries: Vec<BlockId>,
}

impl Codec for DeadQueue {
    fn encode(&self, enc: &mut impl Encoder) {
        encode_vec(enc, &self.entries);
    }

    fn decode(dec: &mut BufDecoder<'_>) -> Result<Self, RecordError> {
        Ok(DeadQueue {
            entries: decode_vec(dec)?,
        })
    }
}

/// Encodes a [`Codec`] value to a standalone byte buffer.
pub fn to_bytes<T: Codec>(value: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    value.encode(&mut buf);
    buf
}

/// Decodes a [`Codec`] value from a standalone byte buffer, tolerating trailing bytes.
pub fn from_bytes<T: Codec>(buf: &[u8]) -> Result<T, RecordError> {
    let mut dec = BufDecoder::new(buf);
    T::decode(&mut dec)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn arb_block_id() -> impl Strategy<Value = BlockId> {
        (any::<u64>(), any::<[u8; 32]>()).prop_map(|(h, hash)| BlockId::new(h, hash))
    }

    proptest! {
        #[test]
        fn test_block_id_roundtrip(id in arb_block_id()) {
            let buf = to_bytes(&id);
            assert_eq!(from_bytes::<BlockId>(&buf).unwrap(), id);
        }

        #[test]
        fn test_metadata_roundtrip(oldest in arb_block_id(), newest in arb_block_id()) {
            let md = Metadata { format_version: FORMAT_VERSION, oldest, newest };
            let buf = to_bytes(&md);
            assert_eq!(from_bytes::<Metadata>(&buf).unwrap(), md);
        }

        #[test]
        fn test_links_roundtrip(prev in arb_block_id(), next in arb_block_id()) {
            let links = Links { prev, next };
            let buf = to_bytes(&links);
            assert_eq!(from_bytes::<Links>(&buf).unwrap(), links);
        }

        #[test]
        fn test_manifest_roundtrip(
            value_hashes in prop::collection::vec(any::<[u8; 32]>(), 0..8),
            machine_hashes in prop::collection::vec(any::<[u8; 32]>(), 0..8),
        ) {
            let manifest = Manifest { value_hashes, machine_hashes };
            let buf = to_bytes(&manifest);
            assert_eq!(from_bytes::<Manifest>(&buf).unwrap(), manifest);
        }

        #[test]
        fn test_dead_queue_roundtrip(entries in prop::collection::vec(arb_block_id(), 0..8)) {
            let queue = DeadQueue { entries };
            let buf = to_bytes(&queue);
            assert_eq!(from_bytes::<DeadQueue>(&buf).unwrap(), queue);
        }
    }

    #[test]
    fn test_same_block_id_bytes_are_deterministic() {
        let id = BlockId::new(7, [9u8; 32]);
        assert_eq!(to_bytes(&id), to_bytes(&id));
    }

    #[test]
    fn test_block_id_ordering_ignores_hash() {
        let a = BlockId::new(5, [1u8; 32]);
        let b = BlockId::new(5, [2u8; 32]);
        assert_eq!(a.cmp(&b), std::cmp::Ordering::Equal);
        assert_ne!(a, b);
    }
}
