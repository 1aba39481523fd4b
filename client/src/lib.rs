//! # Stockpile Client
//!
//! Keeps a local cache of inventory server data in step with the server.
//!
//! A sync cycle asks the server for its change token once, skips every entity
//! type whose cache was filled at that token, and reconciles the rest against
//! fresh snapshots using [`stockpile_engine`]. Failures are isolated per type
//! and recorded for an explicit [`retry`](SyncOrchestrator::retry).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stockpile_client::{catalog, FixtureRemote, StoreExecutor, SyncOrchestrator};
//! use stockpile_engine::MemoryStore;
//!
//! # async fn run() -> Result<(), stockpile_client::SyncError> {
//! let remote = Arc::new(FixtureRemote::new("fixtures"));
//! let catalog = catalog::inventory_catalog();
//! let core = catalog::core_types(&catalog);
//! let derived = catalog::derived_types(&catalog);
//!
//! let sync = SyncOrchestrator::new(
//!     catalog,
//!     Arc::clone(&remote),
//!     remote,
//!     StoreExecutor::spawn(MemoryStore::new()),
//! )?;
//!
//! let report = sync.sync(&core, &derived).await?;
//! if !report.is_clean() {
//!     sync.retry().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod orchestrator;
pub mod remote;

pub use config::{Config, ConfigError, SyncConfig};
pub use error::{ErrorKind, Result, SyncError};
pub use executor::StoreExecutor;
pub use ledger::{Category, ErrorEntry, FailureLedger, SyncFailure};
pub use orchestrator::{SyncOrchestrator, SyncReport, SyncStatus};
pub use remote::{ChangeTokenOracle, FixtureRemote, MockRemote, RemoteFetch};
