//! Sync orchestration.
//!
//! A cycle fetches the change token once, then walks the requested entity
//! types in order (core before derived). Each type is skipped when its
//! applied token is current, otherwise fetched, normalized, reconciled and
//! committed. Failures are caught per type and recorded in the ledger; only a
//! failed token fetch aborts the cycle.
//!
//! Cycles that overlap on the same type are serialized by a per-type lock.
//! The staleness check runs after the lock is taken, so the later cycle
//! usually finds the type already current and skips it.
//!
//! Links of derived composites are rewired whenever they or one of their
//! target collections commit, independent of the derived type's own token.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::executor::StoreExecutor;
use crate::ledger::{Category, ErrorEntry, FailureLedger, SyncFailure};
use crate::remote::{ChangeTokenOracle, RemoteFetch};
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use stockpile_engine::{
    CacheSnapshot, Catalog, ChangeToken, EntityDescriptor, EntityType, LocalStore,
    ReconcileOutcome, RecordKey, Reconciler, Shape, StalenessTracker,
};
use tokio::sync::watch;

/// Observable sync state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStatus {
    /// Types currently being fetched or committed
    pub in_flight: BTreeSet<EntityType>,
    /// Types whose latest attempt failed
    pub failed: Vec<EntityType>,
    /// Recent raw errors, oldest first
    pub last_errors: Vec<ErrorEntry>,
}

impl SyncStatus {
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }
}

/// Result of one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Types fetched and committed, with what changed
    pub synced: Vec<(EntityType, ReconcileOutcome)>,
    /// Types whose applied token was already current
    pub skipped: Vec<EntityType>,
    /// Types that failed, with the error recorded in the ledger
    pub failed: Vec<(EntityType, SyncError)>,
}

impl SyncReport {
    /// Whether every requested type is now current.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn outcome(&self, entity: &EntityType) -> Option<&ReconcileOutcome> {
        self.synced
            .iter()
            .find(|(synced, _)| synced == entity)
            .map(|(_, outcome)| outcome)
    }

    pub fn error(&self, entity: &EntityType) -> Option<&SyncError> {
        self.failed
            .iter()
            .find(|(failed, _)| failed == entity)
            .map(|(_, error)| error)
    }

    pub fn is_skipped(&self, entity: &EntityType) -> bool {
        self.skipped.contains(entity)
    }
}

/// Keeps the local cache in step with the server.
pub struct SyncOrchestrator<O, R> {
    catalog: Arc<Catalog>,
    oracle: Arc<O>,
    remote: Arc<R>,
    store: StoreExecutor,
    tracker: RwLock<StalenessTracker>,
    ledger: Mutex<FailureLedger>,
    in_flight: DashSet<EntityType>,
    locks: DashMap<EntityType, Arc<tokio::sync::Mutex<()>>>,
    status: watch::Sender<SyncStatus>,
}

impl<O, R> SyncOrchestrator<O, R>
where
    O: ChangeTokenOracle,
    R: RemoteFetch,
{
    /// Create an orchestrator with the default configuration.
    pub fn new(
        catalog: Catalog,
        oracle: Arc<O>,
        remote: Arc<R>,
        store: StoreExecutor,
    ) -> Result<Self> {
        Self::with_config(catalog, oracle, remote, store, SyncConfig::default())
    }

    /// Create an orchestrator. Fails when the catalog is inconsistent.
    pub fn with_config(
        catalog: Catalog,
        oracle: Arc<O>,
        remote: Arc<R>,
        store: StoreExecutor,
        config: SyncConfig,
    ) -> Result<Self> {
        catalog.validate().map_err(SyncError::Catalog)?;
        let (status, _) = watch::channel(SyncStatus::default());

        Ok(Self {
            catalog: Arc::new(catalog),
            oracle,
            remote,
            store,
            tracker: RwLock::new(StalenessTracker::new()),
            ledger: Mutex::new(FailureLedger::new(config.max_error_history)),
            in_flight: DashSet::new(),
            locks: DashMap::new(),
            status,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Executor owning the local store.
    pub fn store(&self) -> &StoreExecutor {
        &self.store
    }

    /// Run one cycle over `core` then `derived` types.
    ///
    /// Returns an error only when the change token cannot be fetched; every
    /// other failure is reported per type.
    pub async fn sync(&self, core: &[EntityType], derived: &[EntityType]) -> Result<SyncReport> {
        tracing::info!(core = core.len(), derived = derived.len(), "Sync cycle started");

        let token = match self.oracle.change_token().await {
            Ok(token) => token,
            Err(err) => {
                let err = SyncError::TokenFetch(err.to_string());
                tracing::error!(error = %err, "Sync cycle aborted");
                self.ledger.lock().record_cycle_error(err.clone(), Utc::now());
                self.publish();
                return Err(err);
            }
        };

        let mut report = SyncReport::default();
        let requested = core
            .iter()
            .map(|entity| (entity, Category::Core))
            .chain(derived.iter().map(|entity| (entity, Category::Derived)));

        for (entity, category) in requested {
            match self.sync_entity(entity, category, &token).await {
                Ok(Some(outcome)) => report.synced.push((entity.clone(), outcome)),
                Ok(None) => report.skipped.push(entity.clone()),
                Err(err) => report.failed.push((entity.clone(), err)),
            }
        }

        tracing::info!(
            token = %token,
            synced = report.synced.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Sync cycle finished"
        );
        Ok(report)
    }

    /// Re-run a cycle over exactly the currently failed types.
    pub async fn retry(&self) -> Result<SyncReport> {
        let (core, derived) = self.ledger.lock().retry_plan();
        if core.is_empty() && derived.is_empty() {
            tracing::debug!("Nothing to retry");
            return Ok(SyncReport::default());
        }

        tracing::info!(core = core.len(), derived = derived.len(), "Retrying failed types");
        self.sync(&core, &derived).await
    }

    async fn sync_entity(
        &self,
        entity: &EntityType,
        category: Category,
        token: &ChangeToken,
    ) -> Result<Option<ReconcileOutcome>> {
        let Some(descriptor) = self.catalog.get(entity) else {
            let err = SyncError::UnknownEntity(entity.clone());
            self.record_failure(entity, category, err.clone());
            return Err(err);
        };

        let lock = self.lock_for(entity);
        let _guard = lock.lock().await;

        self.in_flight.insert(entity.clone());
        self.publish();

        if !self.tracker.read().is_stale(entity, token) {
            tracing::debug!(entity = %entity, "Up to date, skipping");
            self.in_flight.remove(entity);
            self.ledger.lock().clear(entity);
            self.publish();
            return Ok(None);
        }

        let result = self.fetch_and_commit(descriptor).await;

        self.in_flight.remove(entity);
        match result {
            Ok(outcome) => {
                self.tracker
                    .write()
                    .mark_synced(entity.clone(), token.clone());
                self.ledger.lock().clear(entity);
                self.publish();

                tracing::info!(
                    entity = %entity,
                    inserted = outcome.inserted,
                    replaced = outcome.replaced,
                    deleted = outcome.deleted,
                    untouched = outcome.untouched,
                    links = outcome.links_written,
                    "Committed"
                );
                if outcome.duplicates_dropped > 0 {
                    tracing::warn!(
                        entity = %entity,
                        dropped = outcome.duplicates_dropped,
                        "Remote snapshot repeated identities"
                    );
                }
                Ok(Some(outcome))
            }
            Err(err) => {
                tracing::warn!(entity = %entity, error = %err, "Sync failed");
                self.record_failure(entity, category, err.clone());
                Err(err)
            }
        }
    }

    async fn fetch_and_commit(&self, descriptor: &EntityDescriptor) -> Result<ReconcileOutcome> {
        let entity = &descriptor.entity;
        let raw = match descriptor.shape {
            Shape::Singleton => vec![self.remote.fetch_one(entity).await?],
            _ => self.remote.fetch_snapshot(entity).await?,
        };
        let remote = descriptor.normalize_all(raw).map_err(SyncError::Decode)?;

        let descriptor = descriptor.clone();
        let catalog = Arc::clone(&self.catalog);
        self.store
            .run(move |store| reconcile_into(store, &catalog, &descriptor, remote))
            .await?
    }

    /// Drop the applied tokens of `entities` so the next cycle refetches them.
    pub fn invalidate(&self, entities: &[EntityType]) {
        let mut tracker = self.tracker.write();
        for entity in entities {
            if tracker.invalidate(entity) {
                tracing::debug!(entity = %entity, "Invalidated");
            }
        }
    }

    /// Drop every cached record, token and failure.
    pub async fn reset(&self) -> Result<()> {
        self.store.clear_all().await?;
        self.tracker.write().invalidate_all();
        self.ledger.lock().clear_all();
        self.publish();
        tracing::info!("Cache reset");
        Ok(())
    }

    /// Last applied token of `entity`.
    pub fn last_applied(&self, entity: &EntityType) -> Option<ChangeToken> {
        self.tracker.read().last_applied(entity).cloned()
    }

    /// Latest failure of `entity`, if its latest attempt failed.
    pub fn failure(&self, entity: &EntityType) -> Option<SyncFailure> {
        self.ledger.lock().failure(entity).cloned()
    }

    /// Current observable state.
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Receive every change of the observable state.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Capture records, links and tokens.
    pub async fn export_snapshot(&self) -> Result<CacheSnapshot> {
        // Tokens are read first: a commit landing in between leaves them
        // older than the data, which only causes a refetch after restore
        let tracker = self.tracker.read().clone();
        let catalog = Arc::clone(&self.catalog);
        self.store
            .run(move |store| CacheSnapshot::capture(&*store, &catalog, &tracker))
            .await
    }

    /// Replace the cache with `snapshot`.
    ///
    /// A snapshot that fails validation leaves the cache untouched. A failed
    /// apply leaves it empty and every type stale.
    pub async fn restore_snapshot(&self, snapshot: CacheSnapshot) -> Result<()> {
        snapshot.validate(&self.catalog).map_err(SyncError::Snapshot)?;
        let (changes, tokens) = snapshot.into_parts();

        let restored = self
            .store
            .run(move |store| {
                store.clear_all();
                let applied = changes.iter().try_for_each(|set| store.apply(set));
                if applied.is_err() {
                    store.clear_all();
                }
                applied
            })
            .await?;

        self.ledger.lock().clear_all();
        match restored {
            Ok(()) => {
                *self.tracker.write() = tokens;
                self.publish();
                tracing::info!("Cache restored");
                Ok(())
            }
            Err(err) => {
                self.tracker.write().invalidate_all();
                self.publish();
                Err(SyncError::Snapshot(err))
            }
        }
    }

    fn lock_for(&self, entity: &EntityType) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.locks.entry(entity.clone()).or_default().value())
    }

    fn record_failure(&self, entity: &EntityType, category: Category, err: SyncError) {
        self.ledger
            .lock()
            .record_failure(entity, category, err, Utc::now());
        self.publish();
    }

    fn publish(&self) {
        let ledger = self.ledger.lock();
        let status = SyncStatus {
            in_flight: self.in_flight.iter().map(|e| e.key().clone()).collect(),
            failed: ledger.failed_types(),
            last_errors: ledger.last_errors(),
        };
        drop(ledger);
        self.status.send_replace(status);
    }
}

/// Plan and commit one snapshot, then wire links.
///
/// A derived composite rewires its own records. A keyed collection rewires
/// every derived composite that refers to it, since its identities may have
/// changed. Runs on the store executor, so no other commit interleaves.
fn reconcile_into(
    store: &mut dyn LocalStore,
    catalog: &Catalog,
    descriptor: &EntityDescriptor,
    remote: Vec<stockpile_engine::Record>,
) -> Result<ReconcileOutcome> {
    let local = store.query(&descriptor.entity);
    let plan = Reconciler::new(descriptor)
        .plan(local, remote)
        .map_err(SyncError::from_plan)?;
    store.apply(&plan.changes).map_err(SyncError::Commit)?;
    let mut outcome = plan.outcome;

    match descriptor.shape {
        Shape::DerivedComposite => outcome.absorb(wire_links(store, descriptor)?),
        Shape::KeyedCollection => {
            let dependents = catalog
                .entities_with_shape(&[Shape::DerivedComposite])
                .into_iter()
                .filter_map(|entity| catalog.get(&entity))
                .filter(|derived| {
                    derived
                        .relations
                        .iter()
                        .any(|relation| relation.target == descriptor.entity)
                });
            for derived in dependents {
                wire_links(store, derived)?;
            }
        }
        Shape::Singleton | Shape::UnkeyedArray => {}
    }

    Ok(outcome)
}

/// Resolve the relations of every committed record of `descriptor` against
/// the committed identities of their targets and write the links that differ.
fn wire_links(
    store: &mut dyn LocalStore,
    descriptor: &EntityDescriptor,
) -> Result<ReconcileOutcome> {
    let targets: BTreeMap<EntityType, BTreeSet<RecordKey>> = descriptor
        .relations
        .iter()
        .map(|relation| (relation.target.clone(), store.identities(&relation.target)))
        .collect();
    let records = store.query(&descriptor.entity);
    let current = store.links(&descriptor.entity);

    let links = Reconciler::new(descriptor)
        .plan_links(&records, &current, &targets)
        .map_err(SyncError::from_plan)?;
    if !links.changes.is_empty() {
        store.apply(&links.changes).map_err(SyncError::Commit)?;
        tracing::debug!(
            entity = %descriptor.entity,
            links = links.outcome.links_written,
            "Wired derived records"
        );
    }
    Ok(links.outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockRemote;
    use serde_json::json;
    use stockpile_engine::{EntityDescriptor, FieldDef, FieldType, KeyKind, MemoryStore};

    fn catalog() -> Catalog {
        Catalog::new()
            .with(
                EntityDescriptor::keyed("products", "id", KeyKind::Int)
                    .with_field(FieldDef::required("name", FieldType::String)),
            )
            .with(EntityDescriptor::keyed("chores", "id", KeyKind::Int))
    }

    fn orchestrator(remote: &Arc<MockRemote>) -> SyncOrchestrator<MockRemote, MockRemote> {
        SyncOrchestrator::new(
            catalog(),
            Arc::clone(remote),
            Arc::clone(remote),
            StoreExecutor::spawn(MemoryStore::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn rejects_invalid_catalog() {
        let remote = Arc::new(MockRemote::new());
        let catalog = Catalog::new().with(
            EntityDescriptor::derived("volatile_stock", "product_id", KeyKind::Int)
                .with_relation("product_id", "products", KeyKind::Int),
        );
        let result = SyncOrchestrator::new(
            catalog,
            Arc::clone(&remote),
            Arc::clone(&remote),
            StoreExecutor::spawn(MemoryStore::new()),
        );
        assert!(matches!(result, Err(SyncError::Catalog(_))));
    }

    #[tokio::test]
    async fn status_tracks_failures() {
        let remote = Arc::new(MockRemote::new());
        remote.set_token("t1");
        remote.fail("products", "timeout");
        remote.set_snapshot("chores", vec![]);

        let sync = orchestrator(&remote);
        let mut updates = sync.subscribe();

        let report = sync
            .sync(&["products".into(), "chores".into()], &[])
            .await
            .unwrap();
        assert!(!report.is_clean());
        assert!(updates.has_changed().unwrap());

        let status = updates.borrow_and_update().clone();
        assert!(status.is_idle());
        assert_eq!(status.failed, vec![EntityType::from("products")]);
        assert_eq!(status.last_errors.len(), 1);
        assert_eq!(
            status.last_errors[0].entity,
            Some(EntityType::from("products"))
        );
        assert_eq!(sync.status(), status);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let remote = Arc::new(MockRemote::new());
        remote.set_token("t1");
        remote.set_snapshot("chores", vec![json!({"id": 1})]);
        let sync = orchestrator(&remote);
        let chores = EntityType::from("chores");

        sync.sync(&[chores.clone()], &[]).await.unwrap();
        assert_eq!(sync.last_applied(&chores), Some(ChangeToken::new("t1")));

        sync.invalidate(&[chores.clone()]);
        assert_eq!(sync.last_applied(&chores), None);

        let report = sync.sync(&[chores.clone()], &[]).await.unwrap();
        assert!(report.outcome(&chores).unwrap().is_noop());
        assert_eq!(remote.fetch_count("chores"), 2);
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let remote = Arc::new(MockRemote::new());
        remote.set_token("t1");
        remote.set_snapshot("chores", vec![json!({"id": 1})]);
        remote.fail("products", "timeout");
        let sync = orchestrator(&remote);

        sync.sync(&["chores".into(), "products".into()], &[])
            .await
            .unwrap();
        sync.reset().await.unwrap();

        assert!(sync.store().query(&"chores".into()).await.unwrap().is_empty());
        assert_eq!(sync.last_applied(&"chores".into()), None);
        assert_eq!(sync.status(), SyncStatus::default());
    }
}
