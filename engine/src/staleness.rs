//! Staleness tracking.
//!
//! The server exposes one opaque change token for its whole state. The tracker
//! remembers, per entity type, the token that was current when that type was
//! last committed successfully. A type is stale whenever the remembered token
//! differs from the server's current one, including when it was never synced.

use crate::EntityType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque server state version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeToken(String);

impl ChangeToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChangeToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

/// Per entity type "last token applied" map.
///
/// [`mark_synced`](Self::mark_synced) is the only way to record success.
/// Failures are never written here, so a failed attempt leaves the type stale
/// and the next cycle retries the same delta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StalenessTracker {
    applied: BTreeMap<EntityType, ChangeToken>,
}

impl StalenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `entity` needs a fetch under `current`.
    pub fn is_stale(&self, entity: &EntityType, current: &ChangeToken) -> bool {
        self.applied.get(entity) != Some(current)
    }

    /// Record that `entity` was committed under `token`.
    pub fn mark_synced(&mut self, entity: EntityType, token: ChangeToken) {
        self.applied.insert(entity, token);
    }

    /// The token `entity` was last committed under.
    pub fn last_applied(&self, entity: &EntityType) -> Option<&ChangeToken> {
        self.applied.get(entity)
    }

    /// Forget the applied token so the next cycle refetches `entity`.
    pub fn invalidate(&mut self, entity: &EntityType) -> bool {
        self.applied.remove(entity).is_some()
    }

    /// Forget every applied token.
    pub fn invalidate_all(&mut self) {
        self.applied.clear();
    }

    /// Entity types with an applied token, in sorted order.
    pub fn synced_entities(&self) -> impl Iterator<Item = &EntityType> {
        self.applied.keys()
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}
