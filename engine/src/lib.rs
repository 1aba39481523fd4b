//! # Stockpile Engine
//!
//! A deterministic reconciliation engine for caching inventory server state.
//!
//! The server exposes one change token for its whole state and answers every
//! fetch with a complete snapshot of one entity type. This crate turns those
//! snapshots into the smallest set of local mutations, so a client can keep a
//! persistent cache that only changes where the server did.
//!
//! ## Design Principles
//!
//! - **No IO**: The engine never talks to the network or a database
//! - **Deterministic**: Same inputs always produce the same change set
//! - **Lenient in, strict out**: Wire values are coerced once, at the edge
//!
//! ## Core Concepts
//!
//! ### Catalog
//!
//! The [`Catalog`] lists every cached entity type with its [`Shape`], its
//! identity field and its typed fields. Derived composites also declare
//! [`Relation`]s to keyed collections.
//!
//! ### Lenient parsing
//!
//! The [`lenient`] module accepts the loose encodings the server uses:
//! numbers or strings for booleans and numerics, empty strings for "absent".
//! [`EntityDescriptor::normalize`] applies it to every declared field, so
//! records that only differ in wire encoding compare equal.
//!
//! ### Staleness
//!
//! The [`StalenessTracker`] remembers the token each type was last committed
//! under. A type is fetched only when that token differs from the current one.
//!
//! ### Reconciliation
//!
//! The [`Reconciler`] compares a remote snapshot with the local slice and
//! produces a [`ChangeSet`]: deletes for identities gone remotely, inserts for
//! new ones, replacements for changed ones, nothing for equal ones.
//!
//! ## Quick Start
//!
//! ```rust
//! use stockpile_engine::{
//!     EntityDescriptor, FieldDef, FieldType, KeyKind, LocalStore, MemoryStore, Reconciler,
//! };
//! use serde_json::json;
//!
//! // 1. Describe the entity type
//! let products = EntityDescriptor::keyed("products", "id", KeyKind::Int)
//!     .with_field(FieldDef::required("name", FieldType::String));
//!
//! // 2. Normalize a remote snapshot
//! let remote = products
//!     .normalize_all(vec![json!({"id": "1", "name": "Flour"})])
//!     .unwrap();
//!
//! // 3. Plan and apply
//! let mut store = MemoryStore::new();
//! let local = store.query(&products.entity);
//! let plan = Reconciler::new(&products).plan(local, remote.clone()).unwrap();
//! assert_eq!(plan.outcome.inserted, 1);
//! store.apply(&plan.changes).unwrap();
//!
//! // 4. An unchanged snapshot plans nothing
//! let local = store.query(&products.entity);
//! let plan = Reconciler::new(&products).plan(local, remote).unwrap();
//! assert!(plan.changes.is_empty());
//! ```
//!
//! ## Persistence
//!
//! Use [`CacheSnapshot::capture`] and [`CacheSnapshot::into_parts`] to persist
//! and restore records, links and tokens together.

pub mod catalog;
pub mod error;
pub mod lenient;
pub mod reconcile;
pub mod record;
pub mod snapshot;
pub mod staleness;
pub mod store;

// Re-export main types at crate root
pub use catalog::{
    Catalog, EntityDescriptor, FieldDef, FieldType, KeyKind, KeySpec, Relation, Shape,
};
pub use error::Error;
pub use reconcile::{ChangeSet, LinkChange, Plan, ReconcileOutcome, Reconciler};
pub use record::{EntityType, Record, RecordKey};
pub use snapshot::{CacheSnapshot, SnapshotMetadata, SNAPSHOT_FORMAT_VERSION};
pub use staleness::{ChangeToken, StalenessTracker};
pub use store::{LinkMap, LinkTable, LocalStore, MemoryStore};
