//! Snapshot types for persisting and restoring the cache.
//!
//! A [`CacheSnapshot`] bundles every cached record, every derived link and the
//! staleness tokens into one serializable value. Restoring a snapshot brings
//! back both the data and the knowledge of which server state it reflects, so
//! a restarted client only fetches what changed in the meantime.

use crate::{
    error::Result, store::LocalStore, Catalog, ChangeSet, EntityType, Error, LinkChange, Record,
    Shape, StalenessTracker,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time snapshot of the cache.
///
/// Uses BTreeMap for deterministic serialization order. Links are stored as
/// entries rather than maps because identities are not valid JSON object keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Cached records by entity type
    pub records: BTreeMap<EntityType, Vec<Record>>,
    /// Derived links by entity type
    #[serde(default)]
    pub links: BTreeMap<EntityType, Vec<LinkChange>>,
    /// Applied change tokens
    pub tokens: StalenessTracker,
}

impl CacheSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            ..Default::default()
        }
    }

    /// Capture every cataloged entity type from `store`.
    pub fn capture<S: LocalStore + ?Sized>(
        store: &S,
        catalog: &Catalog,
        tracker: &StalenessTracker,
    ) -> Self {
        let mut snapshot = Self::new();
        snapshot.tokens = tracker.clone();

        for entity in catalog.entities() {
            let records = store.query(entity);
            if !records.is_empty() {
                snapshot.records.insert(entity.clone(), records);
            }

            let links: Vec<LinkChange> = store
                .links(entity)
                .into_iter()
                .flat_map(|(key, fields)| {
                    fields.into_iter().map(move |(field, target)| LinkChange {
                        key: key.clone(),
                        field,
                        target,
                    })
                })
                .collect();
            if !links.is_empty() {
                snapshot.links.insert(entity.clone(), links);
            }
        }
        snapshot
    }

    /// Count records across all entity types.
    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    /// Count links across all entity types.
    pub fn link_count(&self) -> usize {
        self.links.values().map(Vec::len).sum()
    }

    /// Validate the snapshot against a catalog.
    pub fn validate(&self, catalog: &Catalog) -> Result<()> {
        for (entity, records) in &self.records {
            let descriptor = catalog.require(entity)?;

            if descriptor.shape == Shape::Singleton && records.len() > 1 {
                return Err(Error::InvalidSnapshot(format!(
                    "singleton {entity} holds {} records",
                    records.len()
                )));
            }

            for record in records {
                if &record.entity != entity {
                    return Err(Error::InvalidSnapshot(format!(
                        "{} record filed under {entity}",
                        record.entity
                    )));
                }
                if descriptor.shape.is_keyed() != record.key.is_some() {
                    return Err(Error::InvalidSnapshot(format!(
                        "{entity} record identity does not match its {:?} shape",
                        descriptor.shape
                    )));
                }
            }
        }

        for (entity, links) in &self.links {
            let descriptor = catalog.require(entity)?;
            if descriptor.shape != Shape::DerivedComposite {
                return Err(Error::InvalidSnapshot(format!(
                    "{entity} carries links but is not a derived composite"
                )));
            }

            let keys: BTreeSet<_> = self
                .records
                .get(entity)
                .into_iter()
                .flatten()
                .filter_map(|r| r.key.as_ref())
                .collect();
            if let Some(dangling) = links.iter().find(|l| !keys.contains(&l.key)) {
                return Err(Error::InvalidSnapshot(format!(
                    "{entity} link for missing record {}",
                    dangling.key
                )));
            }
        }

        for entity in self.tokens.synced_entities() {
            catalog.require(entity)?;
        }

        Ok(())
    }

    /// Split into one clearing change set per entity type plus the tokens.
    pub fn into_parts(self) -> (Vec<ChangeSet>, StalenessTracker) {
        let mut changes: BTreeMap<EntityType, ChangeSet> = BTreeMap::new();

        for (entity, records) in self.records {
            let set = changes
                .entry(entity.clone())
                .or_insert_with(|| ChangeSet::new(entity));
            set.clear = true;
            set.inserts = records;
        }
        for (entity, links) in self.links {
            let set = changes
                .entry(entity.clone())
                .or_insert_with(|| ChangeSet::new(entity));
            set.clear = true;
            set.links = links;
        }

        (changes.into_values().collect(), self.tokens)
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Serialize to pretty JSON with deterministic ordering.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        Ok(snapshot)
    }
}

/// Metadata about a snapshot (without the full data).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub format_version: u32,
    /// Entity types with at least one record
    pub entity_count: usize,
    pub record_count: usize,
    pub link_count: usize,
    /// Entity types with an applied token
    pub synced_count: usize,
}

impl From<&CacheSnapshot> for SnapshotMetadata {
    fn from(snapshot: &CacheSnapshot) -> Self {
        Self {
            format_version: snapshot.format_version,
            entity_count: snapshot.records.len(),
            record_count: snapshot.record_count(),
            link_count: snapshot.link_count(),
            synced_count: snapshot.tokens.len(),
        }
    }
}
