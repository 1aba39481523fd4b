//! Reconciliation of remote snapshots against the local cache.
//!
//! The remote side always delivers the complete current truth for an entity
//! type, never a delta. Reconciliation turns that snapshot plus the current
//! local slice into the minimal [`ChangeSet`] that makes the slice match.
//!
//! # Algorithm (keyed shapes)
//!
//! 1. Index local records by identity
//! 2. Index the remote snapshot by identity (first occurrence wins)
//! 3. Delete local identities missing remotely
//! 4. Insert remote identities missing locally
//! 5. Replace (delete + insert) identities whose values differ
//! 6. Leave equal records untouched
//!
//! Singletons are replaced only when they differ, unkeyed arrays are replaced
//! wholesale. Derived composites reconcile like keyed collections and then
//! get a second, link-only plan from [`Reconciler::plan_links`] once their own
//! commit and the commits of the collections they refer to have landed.

use crate::{
    error::Result, store::LinkTable, EntityDescriptor, EntityType, Error, Record, RecordKey,
    Shape,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A resolved by-identity relation of one derived record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkChange {
    /// Derived record being wired
    pub key: RecordKey,
    /// Relation field
    pub field: String,
    /// Target identity, `None` for "no relation"
    pub target: Option<RecordKey>,
}

/// Mutations for one entity type, applied atomically by a
/// [`LocalStore`](crate::LocalStore).
///
/// Stores apply `clear` first, then `deletes`, then `inserts`, then `links`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    pub entity: EntityType,
    /// Drop the whole slice before applying the rest
    pub clear: bool,
    pub deletes: Vec<RecordKey>,
    pub inserts: Vec<Record>,
    pub links: Vec<LinkChange>,
}

impl ChangeSet {
    /// Create an empty change set.
    pub fn new(entity: impl Into<EntityType>) -> Self {
        Self {
            entity: entity.into(),
            clear: false,
            deletes: Vec::new(),
            inserts: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Whether applying this change set would leave the store as it is.
    pub fn is_empty(&self) -> bool {
        !self.clear && self.deletes.is_empty() && self.inserts.is_empty() && self.links.is_empty()
    }
}

/// What a reconciliation did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub inserted: usize,
    pub replaced: usize,
    pub deleted: usize,
    pub untouched: usize,
    /// Remote records dropped because their identity was already seen
    pub duplicates_dropped: usize,
    pub links_written: usize,
}

impl ReconcileOutcome {
    /// Whether nothing was written.
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.replaced == 0 && self.deleted == 0 && self.links_written == 0
    }

    /// Fold a follow-up outcome (e.g. link wiring) into this one.
    pub fn absorb(&mut self, other: ReconcileOutcome) {
        self.inserted += other.inserted;
        self.replaced += other.replaced;
        self.deleted += other.deleted;
        self.untouched += other.untouched;
        self.duplicates_dropped += other.duplicates_dropped;
        self.links_written += other.links_written;
    }
}

/// A change set together with its summary.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub changes: ChangeSet,
    pub outcome: ReconcileOutcome,
}

impl Plan {
    fn empty(entity: &EntityType) -> Self {
        Self {
            changes: ChangeSet::new(entity.clone()),
            outcome: ReconcileOutcome::default(),
        }
    }
}

/// Computes change sets for one entity type.
///
/// The reconciler never touches a store; it only plans.
pub struct Reconciler<'a> {
    descriptor: &'a EntityDescriptor,
}

impl<'a> Reconciler<'a> {
    pub fn new(descriptor: &'a EntityDescriptor) -> Self {
        Self { descriptor }
    }

    fn entity(&self) -> &EntityType {
        &self.descriptor.entity
    }

    /// Plan the mutations that turn `local` into `remote`.
    ///
    /// `local` is the current slice for the entity type, `remote` the
    /// normalized snapshot (exactly one record for singletons).
    pub fn plan(&self, local: Vec<Record>, remote: Vec<Record>) -> Result<Plan> {
        if let Some(stray) = local.iter().chain(&remote).find(|r| &r.entity != self.entity()) {
            return Err(self.shape_mismatch(format!("received a {} record", stray.entity)));
        }

        match self.descriptor.shape {
            Shape::KeyedCollection | Shape::DerivedComposite => self.plan_keyed(local, remote),
            Shape::Singleton => self.plan_singleton(local, remote),
            Shape::UnkeyedArray => Ok(self.plan_unkeyed(local, remote)),
        }
    }

    fn plan_keyed(&self, local: Vec<Record>, remote: Vec<Record>) -> Result<Plan> {
        let mut local_index = BTreeMap::new();
        for record in local {
            let key = record
                .key
                .clone()
                .ok_or_else(|| self.shape_mismatch("local record without identity".into()))?;
            local_index.insert(key, record);
        }

        let mut plan = Plan::empty(self.entity());
        let mut seen = BTreeSet::new();
        let mut replaced = Vec::new();

        for record in remote {
            let key = record.key.clone().ok_or_else(|| self.missing_key())?;
            if !seen.insert(key.clone()) {
                plan.outcome.duplicates_dropped += 1;
                continue;
            }

            match local_index.get(&key) {
                None => {
                    plan.outcome.inserted += 1;
                    plan.changes.inserts.push(record);
                }
                Some(existing) if *existing == record => {
                    plan.outcome.untouched += 1;
                }
                Some(_) => {
                    plan.outcome.replaced += 1;
                    replaced.push(key);
                    plan.changes.inserts.push(record);
                }
            }
        }

        for key in local_index.into_keys() {
            if !seen.contains(&key) {
                plan.outcome.deleted += 1;
                plan.changes.deletes.push(key);
            }
        }
        plan.changes.deletes.extend(replaced);

        Ok(plan)
    }

    fn plan_singleton(&self, local: Vec<Record>, mut remote: Vec<Record>) -> Result<Plan> {
        if remote.len() != 1 {
            return Err(self.shape_mismatch(format!(
                "singleton snapshot holds {} records",
                remote.len()
            )));
        }
        let incoming = remote.remove(0);

        let mut plan = Plan::empty(self.entity());
        if let [persisted] = local.as_slice() {
            if *persisted == incoming {
                plan.outcome.untouched = 1;
                return Ok(plan);
            }
        }

        plan.changes.clear = true;
        plan.changes.inserts.push(incoming);
        match local.len() {
            0 => plan.outcome.inserted = 1,
            n => {
                plan.outcome.replaced = 1;
                plan.outcome.deleted = n - 1;
            }
        }
        Ok(plan)
    }

    fn plan_unkeyed(&self, local: Vec<Record>, remote: Vec<Record>) -> Plan {
        let mut plan = Plan::empty(self.entity());
        plan.changes.clear = true;
        plan.outcome.deleted = local.len();
        plan.outcome.inserted = remote.len();
        plan.changes.inserts = remote;
        plan
    }

    /// Plan link writes for the committed records of a derived composite.
    ///
    /// Each relation field is resolved against `targets`, the committed
    /// identities of the referenced collections. References that are absent,
    /// unparsable, or point at an identity that is not committed resolve to
    /// "no relation". Only links that differ from `current` are written.
    pub fn plan_links(
        &self,
        records: &[Record],
        current: &LinkTable,
        targets: &BTreeMap<EntityType, BTreeSet<RecordKey>>,
    ) -> Result<Plan> {
        if self.descriptor.shape != Shape::DerivedComposite {
            return Err(self.shape_mismatch("only derived composites carry links".into()));
        }

        let mut plan = Plan::empty(self.entity());
        for record in records {
            let key = record
                .key
                .as_ref()
                .ok_or_else(|| self.shape_mismatch("local record without identity".into()))?;
            let stored = current.get(key);

            for relation in &self.descriptor.relations {
                let resolved = relation
                    .kind
                    .parse(&relation.field, record.field(&relation.field))
                    .ok()
                    .flatten()
                    .filter(|target| {
                        targets
                            .get(&relation.target)
                            .is_some_and(|committed| committed.contains(target))
                    });

                let existing = stored.and_then(|links| links.get(&relation.field));
                if existing != Some(&resolved) {
                    plan.outcome.links_written += 1;
                    plan.changes.links.push(LinkChange {
                        key: key.clone(),
                        field: relation.field.clone(),
                        target: resolved,
                    });
                }
            }
        }
        Ok(plan)
    }

    fn missing_key(&self) -> Error {
        Error::MissingKey {
            entity: self.entity().clone(),
            field: self
                .descriptor
                .key
                .as_ref()
                .map(|spec| spec.field.clone())
                .unwrap_or_default(),
        }
    }

    fn shape_mismatch(&self, detail: String) -> Error {
        Error::ShapeMismatch {
            entity: self.entity().clone(),
            detail,
        }
    }
}
