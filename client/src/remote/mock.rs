//! Scripted in-memory server for tests.

use super::{ChangeTokenOracle, RemoteFetch};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use stockpile_engine::{ChangeToken, EntityType};

#[derive(Debug, Default)]
struct MockState {
    token: Option<ChangeToken>,
    token_failure: Option<String>,
    snapshots: HashMap<EntityType, Vec<serde_json::Value>>,
    failures: HashMap<EntityType, String>,
    fetches: HashMap<EntityType, usize>,
    token_fetches: usize,
    latency: Option<Duration>,
}

/// A mock server implementing both remote contracts.
///
/// Snapshots, tokens and failures are scripted up front and can be changed
/// between cycles. Every fetch attempt is counted, successful or not.
#[derive(Debug, Default)]
pub struct MockRemote {
    state: Mutex<MockState>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the current change token and clears any token failure.
    pub fn set_token(&self, token: impl Into<String>) {
        let mut state = self.state.lock();
        state.token = Some(ChangeToken::new(token));
        state.token_failure = None;
    }

    /// Makes token fetches fail.
    pub fn fail_token(&self, message: impl Into<String>) {
        self.state.lock().token_failure = Some(message.into());
    }

    /// Sets the snapshot served for `entity`.
    pub fn set_snapshot(&self, entity: impl Into<EntityType>, records: Vec<serde_json::Value>) {
        self.state.lock().snapshots.insert(entity.into(), records);
    }

    /// Sets the object served for a singleton `entity`.
    pub fn set_object(&self, entity: impl Into<EntityType>, object: serde_json::Value) {
        self.set_snapshot(entity, vec![object]);
    }

    /// Makes fetches of `entity` fail with a transport error.
    pub fn fail(&self, entity: impl Into<EntityType>, message: impl Into<String>) {
        self.state
            .lock()
            .failures
            .insert(entity.into(), message.into());
    }

    /// Stops failing fetches of `entity`.
    pub fn heal(&self, entity: impl Into<EntityType>) {
        self.state.lock().failures.remove(&entity.into());
    }

    /// Delays every fetch by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = Some(latency);
    }

    /// Fetch attempts for `entity`.
    pub fn fetch_count(&self, entity: impl Into<EntityType>) -> usize {
        self.state
            .lock()
            .fetches
            .get(&entity.into())
            .copied()
            .unwrap_or(0)
    }

    /// Fetch attempts across all entity types.
    pub fn total_fetches(&self) -> usize {
        self.state.lock().fetches.values().sum()
    }

    /// Token fetch attempts.
    pub fn token_fetch_count(&self) -> usize {
        self.state.lock().token_fetches
    }

    fn fetch(&self, entity: &EntityType) -> (Option<Duration>, Result<Vec<serde_json::Value>>) {
        let mut state = self.state.lock();
        *state.fetches.entry(entity.clone()).or_default() += 1;

        let result = if let Some(message) = state.failures.get(entity) {
            Err(SyncError::Transport(message.clone()))
        } else {
            state
                .snapshots
                .get(entity)
                .cloned()
                .ok_or_else(|| SyncError::Transport(format!("no snapshot scripted for {entity}")))
        };
        (state.latency, result)
    }
}

#[async_trait]
impl ChangeTokenOracle for MockRemote {
    async fn change_token(&self) -> Result<ChangeToken> {
        let mut state = self.state.lock();
        state.token_fetches += 1;

        if let Some(message) = &state.token_failure {
            return Err(SyncError::Transport(message.clone()));
        }
        state
            .token
            .clone()
            .ok_or_else(|| SyncError::Transport("no change token scripted".into()))
    }
}

#[async_trait]
impl RemoteFetch for MockRemote {
    async fn fetch_snapshot(&self, entity: &EntityType) -> Result<Vec<serde_json::Value>> {
        let (latency, result) = self.fetch(entity);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        result
    }

    async fn fetch_one(&self, entity: &EntityType) -> Result<serde_json::Value> {
        let records = self.fetch_snapshot(entity).await?;
        records
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::Transport(format!("no object scripted for {entity}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn scripted_responses() {
        let remote = MockRemote::new();
        remote.set_token("t1");
        remote.set_snapshot("products", vec![json!({"id": 1})]);
        remote.set_object("user_settings", json!({"locale": "en"}));

        assert_eq!(remote.change_token().await.unwrap(), ChangeToken::new("t1"));
        assert_eq!(
            remote.fetch_snapshot(&"products".into()).await.unwrap(),
            vec![json!({"id": 1})]
        );
        assert_eq!(
            remote.fetch_one(&"user_settings".into()).await.unwrap(),
            json!({"locale": "en"})
        );
        assert_eq!(remote.fetch_count("products"), 1);
        assert_eq!(remote.total_fetches(), 2);
        assert_eq!(remote.token_fetch_count(), 1);
    }

    #[tokio::test]
    async fn scripted_failures() {
        let remote = MockRemote::new();
        assert!(remote.change_token().await.is_err());

        remote.set_token("t1");
        remote.fail_token("offline");
        assert_eq!(
            remote.change_token().await,
            Err(SyncError::Transport("offline".into()))
        );

        remote.set_snapshot("stock", vec![]);
        remote.fail("stock", "502");
        assert!(remote.fetch_snapshot(&"stock".into()).await.is_err());
        remote.heal("stock");
        assert!(remote.fetch_snapshot(&"stock".into()).await.is_ok());
        assert_eq!(remote.fetch_count("stock"), 2);

        assert!(remote.fetch_snapshot(&"chores".into()).await.is_err());
    }
}
