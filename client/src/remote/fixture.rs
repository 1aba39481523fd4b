//! Server responses recorded on disk.
//!
//! Layout:
//!
//! ```text
//! fixtures/
//!   change_token        # the current token, surrounding whitespace ignored
//!   products.json       # JSON array for collection shapes
//!   user_settings.json  # JSON object for singletons
//! ```

use super::{ChangeTokenOracle, RemoteFetch};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use stockpile_engine::{ChangeToken, EntityType, Error};

/// Reads tokens and snapshots from a directory.
#[derive(Debug, Clone)]
pub struct FixtureRemote {
    dir: PathBuf,
}

impl FixtureRemote {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read(&self, name: &str) -> Result<String> {
        let path = self.dir.join(name);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SyncError::Transport(format!("{}: {e}", path.display())))
    }

    async fn read_json(&self, entity: &EntityType) -> Result<serde_json::Value> {
        let text = self.read(&format!("{entity}.json")).await?;
        serde_json::from_str(&text).map_err(|e| {
            SyncError::Decode(Error::InvalidPayload(format!("{entity}.json: {e}")))
        })
    }
}

#[async_trait]
impl ChangeTokenOracle for FixtureRemote {
    async fn change_token(&self) -> Result<ChangeToken> {
        let token = self.read("change_token").await?;
        Ok(ChangeToken::new(token.trim()))
    }
}

#[async_trait]
impl RemoteFetch for FixtureRemote {
    async fn fetch_snapshot(&self, entity: &EntityType) -> Result<Vec<serde_json::Value>> {
        match self.read_json(entity).await? {
            serde_json::Value::Array(records) => Ok(records),
            _ => Err(SyncError::Decode(Error::InvalidPayload(format!(
                "{entity}.json must hold an array"
            )))),
        }
    }

    async fn fetch_one(&self, entity: &EntityType) -> Result<serde_json::Value> {
        self.read_json(entity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn reads_fixture_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("change_token"), "2024-05-01 10:00:00\n").unwrap();
        std::fs::write(dir.path().join("products.json"), r#"[{"id": "1", "name": "Flour"}]"#)
            .unwrap();
        std::fs::write(dir.path().join("user_settings.json"), r#"{"locale": "en"}"#).unwrap();

        let remote = FixtureRemote::new(dir.path());
        assert_eq!(remote.dir(), dir.path());
        assert_eq!(
            remote.change_token().await.unwrap(),
            ChangeToken::new("2024-05-01 10:00:00")
        );
        assert_eq!(
            remote.fetch_snapshot(&"products".into()).await.unwrap(),
            vec![json!({"id": "1", "name": "Flour"})]
        );
        assert_eq!(
            remote.fetch_one(&"user_settings".into()).await.unwrap(),
            json!({"locale": "en"})
        );
    }

    #[tokio::test]
    async fn missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stock.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("chores.json"), r#"{"id": 1}"#).unwrap();
        let remote = FixtureRemote::new(dir.path());

        let err = remote.change_token().await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));

        let err = remote.fetch_snapshot(&"products".into()).await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));

        let err = remote.fetch_snapshot(&"stock".into()).await.unwrap_err();
        assert!(matches!(err, SyncError::Decode(_)));

        let err = remote.fetch_snapshot(&"chores".into()).await.unwrap_err();
        assert!(matches!(err, SyncError::Decode(Error::InvalidPayload(_))));
    }
}
