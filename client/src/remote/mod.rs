//! Contracts for the server side of a sync.
//!
//! The orchestrator needs two things from the server: the current change
//! token, and complete snapshots of single entity types. Both are returned as
//! raw JSON; the lenient parser normalizes snapshots before reconciliation.
//! Timeouts belong to implementations and surface as transport errors.

mod fixture;
mod mock;

pub use fixture::FixtureRemote;
pub use mock::MockRemote;

use crate::error::Result;
use async_trait::async_trait;
use stockpile_engine::{ChangeToken, EntityType};

/// Source of the server's current state version.
#[async_trait]
pub trait ChangeTokenOracle: Send + Sync {
    /// The token for the server's whole state.
    async fn change_token(&self) -> Result<ChangeToken>;
}

/// Fetches complete remote snapshots.
#[async_trait]
pub trait RemoteFetch: Send + Sync {
    /// All records of a collection-shaped entity type.
    async fn fetch_snapshot(&self, entity: &EntityType) -> Result<Vec<serde_json::Value>>;

    /// The single object of a singleton entity type.
    async fn fetch_one(&self, entity: &EntityType) -> Result<serde_json::Value>;
}
