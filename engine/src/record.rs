//! Record types for cached server state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag identifying one trackable server resource, e.g. `products` or `chores`.
///
/// The set of known tags is enumerated by the [`Catalog`](crate::Catalog).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(String);

impl EntityType {
    /// Create a new entity type tag.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EntityType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Stable identity of a record: a server-assigned number or string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordKey {
    Int(i64),
    Str(String),
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Int(id) => write!(f, "{id}"),
            RecordKey::Str(id) => f.write_str(id),
        }
    }
}

impl From<i64> for RecordKey {
    fn from(id: i64) -> Self {
        RecordKey::Int(id)
    }
}

impl From<i32> for RecordKey {
    fn from(id: i32) -> Self {
        RecordKey::Int(i64::from(id))
    }
}

impl From<&str> for RecordKey {
    fn from(id: &str) -> Self {
        RecordKey::Str(id.to_string())
    }
}

/// A cached record.
///
/// Equality is structural: two records are equal when they belong to the same
/// entity type, carry the same identity, and have the same normalized payload.
/// Singleton and unkeyed records have no identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Entity type this record belongs to
    pub entity: EntityType,
    /// Identity, absent for singleton and unkeyed shapes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<RecordKey>,
    /// Normalized JSON object
    pub payload: serde_json::Value,
}

impl Record {
    /// Create a record with an identity.
    pub fn keyed(
        entity: impl Into<EntityType>,
        key: impl Into<RecordKey>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            entity: entity.into(),
            key: Some(key.into()),
            payload,
        }
    }

    /// Create a record without identity.
    pub fn unkeyed(entity: impl Into<EntityType>, payload: serde_json::Value) -> Self {
        Self {
            entity: entity.into(),
            key: None,
            payload,
        }
    }

    /// Read a payload field.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.payload.get(name)
    }
}
