//! Stockpile Sync - one sync cycle against recorded server responses.
//!
//! Restores the cache file if present, syncs every configured entity type,
//! retries the failed ones once and writes the cache back.

use std::sync::Arc;
use stockpile_client::{catalog, Config, FixtureRemote, StoreExecutor, SyncOrchestrator};
use stockpile_engine::{CacheSnapshot, MemoryStore, SnapshotMetadata};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockpile_client=debug,stockpile_sync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let catalog = catalog::inventory_catalog();
    let core = config
        .core_types
        .clone()
        .unwrap_or_else(|| catalog::core_types(&catalog));
    let derived = config
        .derived_types
        .clone()
        .unwrap_or_else(|| catalog::derived_types(&catalog));

    let remote = Arc::new(FixtureRemote::new(&config.fixtures));
    tracing::info!("Syncing from {}", remote.dir().display());
    let sync = SyncOrchestrator::with_config(
        catalog,
        Arc::clone(&remote),
        remote,
        StoreExecutor::spawn(MemoryStore::new()),
        config.sync.clone(),
    )?;

    // Restore the previous cache
    if tokio::fs::try_exists(&config.cache_path).await? {
        let json = tokio::fs::read_to_string(&config.cache_path).await?;
        match CacheSnapshot::from_json(&json) {
            Ok(snapshot) => {
                let metadata = SnapshotMetadata::from(&snapshot);
                if let Err(err) = sync.restore_snapshot(snapshot).await {
                    tracing::warn!(error = %err, "Cache rejected, starting empty");
                } else {
                    tracing::info!(
                        records = metadata.record_count,
                        links = metadata.link_count,
                        synced = metadata.synced_count,
                        "Cache restored from {}",
                        config.cache_path.display()
                    );
                }
            }
            Err(err) => tracing::warn!(error = %err, "Unreadable cache, starting empty"),
        }
    }

    let mut report = sync.sync(&core, &derived).await?;
    if !report.is_clean() {
        tracing::info!("Retrying {} failed types", report.failed.len());
        report = sync.retry().await?;
    }

    for (entity, err) in &report.failed {
        tracing::error!(entity = %entity, kind = ?err.kind(), error = %err, "Still failing");
    }

    // Persist the cache
    let snapshot = sync.export_snapshot().await?;
    tokio::fs::write(&config.cache_path, snapshot.to_json_pretty()?).await?;
    tracing::info!(
        records = snapshot.record_count(),
        links = snapshot.link_count(),
        "Cache written to {}",
        config.cache_path.display()
    );

    Ok(())
}
