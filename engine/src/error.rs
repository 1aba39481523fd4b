//! Error types for the Stockpile engine.

use crate::{EntityType, RecordKey};
use thiserror::Error;

/// All possible errors from the Stockpile engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Catalog errors
    #[error("entity type not registered: {0}")]
    UnknownEntity(EntityType),

    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    // Decode errors
    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("{entity} record has no identity in field '{field}'")]
    MissingKey { entity: EntityType, field: String },

    // Store errors
    #[error("{entity}: {detail}")]
    ShapeMismatch { entity: EntityType, detail: String },

    #[error("{entity} already holds a record with identity {key}")]
    DuplicateKey { entity: EntityType, key: RecordKey },

    #[error("{entity} holds no record with identity {key}")]
    KeyNotFound { entity: EntityType, key: RecordKey },

    // State errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl Error {
    /// Whether the error came from decoding a remote payload.
    ///
    /// Everything else originates in the catalog, the store, or a snapshot.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            Error::MissingField(_)
                | Error::TypeMismatch { .. }
                | Error::InvalidPayload(_)
                | Error::MissingKey { .. }
        )
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
