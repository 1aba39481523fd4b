//! Single-writer executor for the local store.
//!
//! One tokio task owns the store and drains a queue of jobs in order, so
//! every read-plan-commit sequence runs without interleaving with another.
//! Handles are cheap to clone; the task stops once the last one is dropped.

use crate::error::{Result, SyncError};
use stockpile_engine::{ChangeSet, EntityType, LinkTable, LocalStore, Record, RecordKey};
use std::collections::BTreeSet;
use tokio::sync::{mpsc, oneshot};

type Job = Box<dyn FnOnce(&mut dyn LocalStore) + Send>;

/// Handle to the task owning the local store.
#[derive(Debug, Clone)]
pub struct StoreExecutor {
    jobs: mpsc::UnboundedSender<Job>,
}

impl StoreExecutor {
    /// Move `store` into a new executor task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S>(mut store: S) -> Self
    where
        S: LocalStore + Send + 'static,
    {
        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            while let Some(job) = queue.recv().await {
                job(&mut store);
            }
            tracing::debug!("Store executor stopped");
        });

        Self { jobs }
    }

    /// Run `f` on the executor with exclusive access to the store.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn LocalStore) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        let job: Job = Box::new(move |store| {
            // The caller may have gone away; the work is done regardless
            let _ = reply.send(f(store));
        });

        self.jobs.send(job).map_err(|_| SyncError::ExecutorStopped)?;
        response.await.map_err(|_| SyncError::ExecutorStopped)
    }

    pub async fn query(&self, entity: &EntityType) -> Result<Vec<Record>> {
        let entity = entity.clone();
        self.run(move |store| store.query(&entity)).await
    }

    pub async fn identities(&self, entity: &EntityType) -> Result<BTreeSet<RecordKey>> {
        let entity = entity.clone();
        self.run(move |store| store.identities(&entity)).await
    }

    pub async fn links(&self, entity: &EntityType) -> Result<LinkTable> {
        let entity = entity.clone();
        self.run(move |store| store.links(&entity)).await
    }

    /// Commit one change set.
    pub async fn apply(&self, changes: ChangeSet) -> Result<()> {
        self.run(move |store| store.apply(&changes))
            .await?
            .map_err(SyncError::Commit)
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.run(|store| store.clear_all()).await
    }
}
