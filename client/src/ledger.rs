//! Failure and retry ledger.
//!
//! Tracks which entity types failed in their latest attempt, plus a bounded
//! history of raw errors. Entries are cleared only by a later success.

use crate::SyncError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use stockpile_engine::EntityType;

/// Whether a type was requested as core data or as a derived view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Core,
    Derived,
}

/// Latest failure of one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncFailure {
    pub entity: EntityType,
    pub category: Category,
    /// Error of the most recent attempt
    pub error: SyncError,
    pub first_observed_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
    /// Consecutive failed attempts
    pub attempts: u32,
}

/// One raw error, in the order it was observed.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEntry {
    /// `None` for cycle-level errors such as a failed token fetch
    pub entity: Option<EntityType>,
    pub error: SyncError,
    pub at: DateTime<Utc>,
}

/// Failed entity types and recent errors.
#[derive(Debug, Clone)]
pub struct FailureLedger {
    failures: BTreeMap<EntityType, SyncFailure>,
    errors: VecDeque<ErrorEntry>,
    max_errors: usize,
}

impl FailureLedger {
    pub fn new(max_errors: usize) -> Self {
        Self {
            failures: BTreeMap::new(),
            errors: VecDeque::new(),
            max_errors,
        }
    }

    /// Record a failed attempt for `entity`.
    pub fn record_failure(
        &mut self,
        entity: &EntityType,
        category: Category,
        error: SyncError,
        at: DateTime<Utc>,
    ) {
        self.push_error(Some(entity.clone()), error.clone(), at);

        self.failures
            .entry(entity.clone())
            .and_modify(|failure| {
                failure.category = category;
                failure.error = error.clone();
                failure.last_attempt_at = at;
                failure.attempts += 1;
            })
            .or_insert_with(|| SyncFailure {
                entity: entity.clone(),
                category,
                error,
                first_observed_at: at,
                last_attempt_at: at,
                attempts: 1,
            });
    }

    /// Record an error that is not tied to one entity type.
    pub fn record_cycle_error(&mut self, error: SyncError, at: DateTime<Utc>) {
        self.push_error(None, error, at);
    }

    fn push_error(&mut self, entity: Option<EntityType>, error: SyncError, at: DateTime<Utc>) {
        if self.max_errors == 0 {
            return;
        }
        while self.errors.len() >= self.max_errors {
            self.errors.pop_front();
        }
        self.errors.push_back(ErrorEntry { entity, error, at });
    }

    /// Forget the failure of `entity`. Returns whether it was failed.
    pub fn clear(&mut self, entity: &EntityType) -> bool {
        self.failures.remove(entity).is_some()
    }

    /// Forget everything, including the error history.
    pub fn clear_all(&mut self) {
        self.failures.clear();
        self.errors.clear();
    }

    pub fn failure(&self, entity: &EntityType) -> Option<&SyncFailure> {
        self.failures.get(entity)
    }

    pub fn is_failed(&self, entity: &EntityType) -> bool {
        self.failures.contains_key(entity)
    }

    /// Failed entity types in sorted order.
    pub fn failed_types(&self) -> Vec<EntityType> {
        self.failures.keys().cloned().collect()
    }

    /// Raw errors, oldest first.
    pub fn last_errors(&self) -> Vec<ErrorEntry> {
        self.errors.iter().cloned().collect()
    }

    /// The failed types split by category, in the order they first failed.
    pub fn retry_plan(&self) -> (Vec<EntityType>, Vec<EntityType>) {
        let mut failures: Vec<&SyncFailure> = self.failures.values().collect();
        failures.sort_by_key(|f| f.first_observed_at);

        let (core, derived): (Vec<_>, Vec<_>) = failures
            .into_iter()
            .partition(|f| f.category == Category::Core);
        (
            core.into_iter().map(|f| f.entity.clone()).collect(),
            derived.into_iter().map(|f| f.entity.clone()).collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl Default for FailureLedger {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_ERROR_HISTORY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn transport(msg: &str) -> SyncError {
        SyncError::Transport(msg.into())
    }

    #[test]
    fn record_and_clear() {
        let mut ledger = FailureLedger::default();
        let t0 = Utc::now();
        let stock = EntityType::from("stock");

        ledger.record_failure(&stock, Category::Core, transport("timeout"), t0);
        ledger.record_failure(
            &stock,
            Category::Core,
            transport("refused"),
            t0 + Duration::seconds(5),
        );

        let failure = ledger.failure(&stock).unwrap();
        assert_eq!(failure.attempts, 2);
        assert_eq!(failure.first_observed_at, t0);
        assert_eq!(failure.last_attempt_at, t0 + Duration::seconds(5));
        assert_eq!(failure.error, transport("refused"));
        assert_eq!(ledger.last_errors().len(), 2);

        assert!(ledger.clear(&stock));
        assert!(!ledger.is_failed(&stock));
        // History outlives the failure
        assert_eq!(ledger.last_errors().len(), 2);
    }

    #[test]
    fn error_history_is_bounded() {
        let mut ledger = FailureLedger::new(3);
        let t0 = Utc::now();
        for i in 0..5 {
            ledger.record_cycle_error(SyncError::TokenFetch(format!("e{i}")), t0);
        }

        let errors = ledger.last_errors();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].error, SyncError::TokenFetch("e2".into()));
        assert_eq!(errors[2].error, SyncError::TokenFetch("e4".into()));
        assert!(errors.iter().all(|e| e.entity.is_none()));
        assert!(ledger.is_empty());
    }

    #[test]
    fn zero_history_keeps_nothing() {
        let mut ledger = FailureLedger::new(0);
        ledger.record_failure(&"stock".into(), Category::Core, transport("x"), Utc::now());
        assert!(ledger.last_errors().is_empty());
        assert!(ledger.is_failed(&"stock".into()));
    }

    #[test]
    fn retry_plan_splits_categories() {
        let mut ledger = FailureLedger::default();
        let t0 = Utc::now();
        ledger.record_failure(
            &"volatile_stock".into(),
            Category::Derived,
            transport("x"),
            t0,
        );
        ledger.record_failure(
            &"stock".into(),
            Category::Core,
            transport("x"),
            t0 + Duration::seconds(1),
        );
        ledger.record_failure(&"chores".into(), Category::Core, transport("x"), t0);

        let (core, derived) = ledger.retry_plan();
        assert_eq!(core, vec![EntityType::from("chores"), EntityType::from("stock")]);
        assert_eq!(derived, vec![EntityType::from("volatile_stock")]);
        assert_eq!(ledger.failed_types().len(), 3);
    }
}
