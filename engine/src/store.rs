//! Local store - the persisted cache the engine reconciles into.
//!
//! [`LocalStore`] is the seam to whatever database backs the cache. The engine
//! only needs four things from it: read a slice, read identities and links,
//! and apply one [`ChangeSet`] atomically. [`MemoryStore`] is the in-memory
//! implementation used by the client and by tests.

use crate::{error::Result, ChangeSet, EntityType, Error, Record, RecordKey};
use std::collections::{BTreeMap, BTreeSet};

/// Relation field -> target identity for one derived record.
pub type LinkMap = BTreeMap<String, Option<RecordKey>>;

/// Links of every record of one derived entity type.
pub type LinkTable = BTreeMap<RecordKey, LinkMap>;

/// Persistence seam for cached records.
pub trait LocalStore {
    /// All records of `entity`. Keyed records come back in identity order.
    fn query(&self, entity: &EntityType) -> Vec<Record>;

    /// Identities of all keyed records of `entity`.
    fn identities(&self, entity: &EntityType) -> BTreeSet<RecordKey>;

    /// Links of all records of `entity`.
    fn links(&self, entity: &EntityType) -> LinkTable;

    /// Apply a change set as one transaction.
    ///
    /// Either every mutation lands or none does.
    fn apply(&mut self, changes: &ChangeSet) -> Result<()>;

    /// Drop every record and link.
    fn clear_all(&mut self);
}

#[derive(Debug, Clone, Default)]
struct Partition {
    keyed: BTreeMap<RecordKey, Record>,
    unkeyed: Vec<Record>,
    links: LinkTable,
}

/// In-memory [`LocalStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    partitions: BTreeMap<EntityType, Partition>,
    commits: usize,
    mutations: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of non-empty change sets committed so far.
    pub fn commit_count(&self) -> usize {
        self.commits
    }

    /// Number of individual mutations committed so far.
    ///
    /// A clear counts as one mutation, as does each delete, insert and link.
    pub fn mutation_count(&self) -> usize {
        self.mutations
    }

    /// Look up a single keyed record.
    pub fn get(&self, entity: &EntityType, key: &RecordKey) -> Option<&Record> {
        self.partitions.get(entity)?.keyed.get(key)
    }

    /// Number of records of `entity`.
    pub fn count(&self, entity: &EntityType) -> usize {
        self.partitions
            .get(entity)
            .map(|p| p.keyed.len() + p.unkeyed.len())
            .unwrap_or(0)
    }

    fn staged(&self, changes: &ChangeSet) -> Result<Partition> {
        let mut partition = if changes.clear {
            Partition::default()
        } else {
            self.partitions.get(&changes.entity).cloned().unwrap_or_default()
        };

        for key in &changes.deletes {
            if partition.keyed.remove(key).is_none() {
                return Err(Error::KeyNotFound {
                    entity: changes.entity.clone(),
                    key: key.clone(),
                });
            }
            partition.links.remove(key);
        }

        for record in &changes.inserts {
            if record.entity != changes.entity {
                return Err(Error::ShapeMismatch {
                    entity: changes.entity.clone(),
                    detail: format!("cannot insert a {} record", record.entity),
                });
            }
            match &record.key {
                Some(key) if partition.keyed.contains_key(key) => {
                    return Err(Error::DuplicateKey {
                        entity: changes.entity.clone(),
                        key: key.clone(),
                    });
                }
                Some(key) => {
                    partition.keyed.insert(key.clone(), record.clone());
                }
                None => partition.unkeyed.push(record.clone()),
            }
        }

        for link in &changes.links {
            if !partition.keyed.contains_key(&link.key) {
                return Err(Error::KeyNotFound {
                    entity: changes.entity.clone(),
                    key: link.key.clone(),
                });
            }
            partition
                .links
                .entry(link.key.clone())
                .or_default()
                .insert(link.field.clone(), link.target.clone());
        }

        Ok(partition)
    }
}

impl LocalStore for MemoryStore {
    fn query(&self, entity: &EntityType) -> Vec<Record> {
        self.partitions
            .get(entity)
            .map(|p| p.keyed.values().chain(&p.unkeyed).cloned().collect())
            .unwrap_or_default()
    }

    fn identities(&self, entity: &EntityType) -> BTreeSet<RecordKey> {
        self.partitions
            .get(entity)
            .map(|p| p.keyed.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn links(&self, entity: &EntityType) -> LinkTable {
        self.partitions
            .get(entity)
            .map(|p| p.links.clone())
            .unwrap_or_default()
    }

    fn apply(&mut self, changes: &ChangeSet) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        // Stage on a copy so a failing mutation leaves the store untouched
        let partition = self.staged(changes)?;
        self.partitions.insert(changes.entity.clone(), partition);

        self.commits += 1;
        self.mutations += usize::from(changes.clear)
            + changes.deletes.len()
            + changes.inserts.len()
            + changes.links.len();
        Ok(())
    }

    fn clear_all(&mut self) {
        self.partitions.clear();
    }
}
