//! Configuration for the sync client.

use std::env;
use std::path::PathBuf;
use stockpile_engine::EntityType;

/// Default bound of the raw error history.
pub const DEFAULT_ERROR_HISTORY: usize = 50;

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// How many raw errors the ledger keeps, oldest dropped first.
    pub max_error_history: usize,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self {
            max_error_history: DEFAULT_ERROR_HISTORY,
        }
    }

    /// Sets the raw error history bound.
    pub fn with_max_error_history(mut self, max: usize) -> Self {
        self.max_error_history = max;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Binary configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory of recorded server responses
    pub fixtures: PathBuf,
    /// Cache snapshot file
    pub cache_path: PathBuf,
    /// Core types to sync, catalog defaults when unset
    pub core_types: Option<Vec<EntityType>>,
    /// Derived types to sync, catalog defaults when unset
    pub derived_types: Option<Vec<EntityType>>,
    pub sync: SyncConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let fixtures = lookup("STOCKPILE_FIXTURES")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingFixtures)?;

        let cache_path = lookup("STOCKPILE_CACHE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("stockpile-cache.json"));

        let mut sync = SyncConfig::new();
        if let Some(raw) = lookup("STOCKPILE_ERROR_HISTORY") {
            sync.max_error_history = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidErrorHistory(raw.clone()))?;
        }

        Ok(Self {
            fixtures,
            cache_path,
            core_types: lookup("STOCKPILE_CORE_TYPES").map(|v| entity_list(&v)),
            derived_types: lookup("STOCKPILE_DERIVED_TYPES").map(|v| entity_list(&v)),
            sync,
        })
    }
}

fn entity_list(raw: &str) -> Vec<EntityType> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(EntityType::from)
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("STOCKPILE_FIXTURES environment variable is required")]
    MissingFixtures,

    #[error("Invalid STOCKPILE_ERROR_HISTORY value: {0}")]
    InvalidErrorHistory(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn sync_config_builder() {
        assert_eq!(SyncConfig::default().max_error_history, DEFAULT_ERROR_HISTORY);
        let config = SyncConfig::new().with_max_error_history(5);
        assert_eq!(config.max_error_history, 5);
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(&[("STOCKPILE_FIXTURES", "fixtures")])).unwrap();
        assert_eq!(config.fixtures, PathBuf::from("fixtures"));
        assert_eq!(config.cache_path, PathBuf::from("stockpile-cache.json"));
        assert!(config.core_types.is_none());
        assert!(config.derived_types.is_none());
        assert_eq!(config.sync, SyncConfig::default());
    }

    #[test]
    fn entity_lists() {
        let config = Config::from_lookup(lookup(&[
            ("STOCKPILE_FIXTURES", "fixtures"),
            ("STOCKPILE_CORE_TYPES", "products, chores,,stock "),
            ("STOCKPILE_DERIVED_TYPES", ""),
            ("STOCKPILE_ERROR_HISTORY", "10"),
        ]))
        .unwrap();

        assert_eq!(
            config.core_types,
            Some(vec!["products".into(), "chores".into(), "stock".into()])
        );
        assert_eq!(config.derived_types, Some(vec![]));
        assert_eq!(config.sync.max_error_history, 10);
    }

    #[test]
    fn errors() {
        assert!(matches!(
            Config::from_lookup(lookup(&[])),
            Err(ConfigError::MissingFixtures)
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[
                ("STOCKPILE_FIXTURES", "fixtures"),
                ("STOCKPILE_ERROR_HISTORY", "many"),
            ])),
            Err(ConfigError::InvalidErrorHistory(v)) if v == "many"
        ));
    }
}
