//! Error types for the sync client.

use serde::Serialize;
use stockpile_engine::EntityType;

/// Errors raised while syncing.
///
/// Everything except [`SyncError::TokenFetch`] is caught at the per entity
/// type boundary and recorded in the failure ledger.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(stockpile_engine::Error),

    #[error("commit error: {0}")]
    Commit(stockpile_engine::Error),

    #[error("change token fetch failed: {0}")]
    TokenFetch(String),

    #[error("entity type not registered: {0}")]
    UnknownEntity(EntityType),

    #[error("invalid catalog: {0}")]
    Catalog(stockpile_engine::Error),

    #[error("snapshot error: {0}")]
    Snapshot(stockpile_engine::Error),

    #[error("store executor stopped")]
    ExecutorStopped,
}

/// Coarse classification of a [`SyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Decode,
    Commit,
    TokenFetch,
    UnknownEntity,
    Catalog,
    Snapshot,
    ExecutorStopped,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Transport(_) => ErrorKind::Transport,
            SyncError::Decode(_) => ErrorKind::Decode,
            SyncError::Commit(_) => ErrorKind::Commit,
            SyncError::TokenFetch(_) => ErrorKind::TokenFetch,
            SyncError::UnknownEntity(_) => ErrorKind::UnknownEntity,
            SyncError::Catalog(_) => ErrorKind::Catalog,
            SyncError::Snapshot(_) => ErrorKind::Snapshot,
            SyncError::ExecutorStopped => ErrorKind::ExecutorStopped,
        }
    }

    /// Classify an engine error raised while planning against a snapshot.
    ///
    /// Parser errors and shape violations come from the remote data; anything
    /// else was raised by the store.
    pub(crate) fn from_plan(err: stockpile_engine::Error) -> Self {
        use stockpile_engine::Error;
        match err {
            Error::ShapeMismatch { .. } => SyncError::Decode(err),
            err if err.is_decode() => SyncError::Decode(err),
            err => SyncError::Commit(err),
        }
    }
}

/// Result type alias for the client.
pub type Result<T> = std::result::Result<T, SyncError>;
