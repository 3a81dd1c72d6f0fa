//! Error taxonomy for the checkpoint store.
//!
//! Errors are categorized by how callers and internal best-effort paths should react:
//! - [`CheckpointError::NotFound`] / [`CheckpointError::Corrupt`] are returned to the caller of
//!   `restore`/`restore_latest`. A decode failure anywhere on a read path (metadata, links,
//!   contents, manifest) is reclassified from [`StorageError::Record`] into `Corrupt` by the
//!   `From<StorageError>` impl below, rather than surfacing as `StorageFault`.
//! - [`CheckpointError::StorageFault`] surfaces from a failed `save_async` completion, or any
//!   other storage-layer error that isn't a decode failure.
//! - [`CheckpointError::ChainUnavailable`] never escapes reconciliation; it's folded into a
//!   silent abort.
//! - [`CheckpointError::InitFault`] is fatal to construction only.

use thiserror::Error;

/// Top-level error type returned by the public facade.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Lookup for an id outside `[oldest, newest]`, or missing singleton at startup.
    #[error("checkpoint not found")]
    NotFound,

    /// A record failed to decode.
    #[error("corrupt record: {0}")]
    Corrupt(#[from] RecordError),

    /// The storage adapter reported a write failure.
    #[error("storage fault: {0}")]
    StorageFault(StorageError),

    /// The chain client errored while reconciliation was in progress.
    ///
    /// Never propagated out of [`crate::reorg::Reconciler::reconcile`] itself (reconciliation is
    /// opportunistic and aborts silently); kept as a variant for completeness and for tests that
    /// want to assert it *isn't* surfaced.
    #[error("chain client unavailable: {0}")]
    ChainUnavailable(String),

    /// The caller-supplied restore callback rejected the checkpoint.
    #[error("restore callback failed: {0}")]
    RestoreFailed(#[from] RestoreError),

    /// The KV adapter or code file could not be opened at construction.
    #[error("failed to initialize checkpoint store: {0}")]
    InitFault(#[from] anyhow::Error),
}

/// A storage-level decode failure is really a corrupt record, not a storage fault: classify it
/// as [`CheckpointError::Corrupt`] instead of collapsing every [`StorageError`] into
/// [`CheckpointError::StorageFault`].
impl From<StorageError> for CheckpointError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Record(e) => CheckpointError::Corrupt(e),
            other => CheckpointError::StorageFault(other),
        }
    }
}

/// Errors from the record codec (component B).
///
/// Local handlers in GC, reconciliation, and `trim_before` treat every variant as "stop this
/// operation quietly" (best-effort).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    /// Input ended before all required fields were read.
    #[error("unexpected end of input decoding {0}")]
    Truncated(&'static str),

    /// A length prefix claimed more bytes than are available or sane.
    #[error("invalid length prefix decoding {0}")]
    InvalidLength(&'static str),

    /// A fixed-size byte field (e.g. a 32-byte hash) had the wrong size.
    #[error("invalid fixed-size field {0}")]
    InvalidFixedSize(&'static str),
}

/// Errors from the storage adapter (component C).
#[derive(Debug, Error)]
pub enum StorageError {
    /// The underlying KV engine reported a failure.
    #[error("kv engine: {0}")]
    Kv(String),

    /// A decode error while reading a structured record back out of the KV engine.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// The machine codec / bootstrap path failed to produce an initial machine.
    #[error("failed to construct initial machine: {0}")]
    InitialMachine(String),
}

impl From<sled::Error> for StorageError {
    fn from(e: sled::Error) -> Self {
        StorageError::Kv(e.to_string())
    }
}

/// Error from the chain-client collaborator (component E's external dependency).
#[derive(Debug, Error)]
#[error("chain client error: {0}")]
pub struct ChainClientError(pub String);

/// Error from the caller-supplied restore callback.
#[derive(Debug, Error)]
#[error("restore callback failed: {0}")]
pub struct RestoreError(pub String);

pub type CheckpointResult<T> = Result<T, CheckpointError>;
pub type RecordResult<T> = Result<T, RecordError>;
pub type StorageResult<T> = Result<T, StorageError>;
