//! StateManager - async facade over the session store
//!
//! One shared handle serialises access to the SQLite store. Writes for a run
//! happen through this handle in step order, so step N is durable before
//! step N+1 starts.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use sessionstore::{IoLogEntry, PersistedItem, RunRecord, RunStatus, StepRecord, StepStatus, Store, StoreError};

/// Cloneable handle to the session store
#[derive(Clone)]
pub struct StateManager {
    inner: Arc<Mutex<Store>>,
}

impl StateManager {
    /// Open the store at `<state_dir>/state.db`
    pub fn open(state_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = state_dir.as_ref().join(sessionstore::DB_FILENAME);
        debug!(path = %db_path.display(), "StateManager::open: called");
        let store = Store::open(db_path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(store)),
        })
    }

    /// In-memory store (tests)
    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            inner: Arc::new(Mutex::new(Store::open_in_memory()?)),
        })
    }

    pub async fn create_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        self.inner.lock().await.create_run(run)
    }

    pub async fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<(), StoreError> {
        self.inner.lock().await.update_run_status(run_id, status)
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, StoreError> {
        self.inner.lock().await.get_run(run_id)
    }

    pub async fn list_runs(&self, status: Option<RunStatus>) -> Result<Vec<RunRecord>, StoreError> {
        self.inner.lock().await.list_runs(status)
    }

    pub async fn delete_run(&self, run_id: &str) -> Result<bool, StoreError> {
        self.inner.lock().await.delete_run(run_id)
    }

    pub async fn create_step(&self, step: &StepRecord) -> Result<(), StoreError> {
        self.inner.lock().await.create_step(step)
    }

    pub async fn update_step_status(&self, step_id: &str, status: StepStatus) -> Result<(), StoreError> {
        self.inner.lock().await.update_step_status(step_id, status)
    }

    pub async fn update_step_result(
        &self,
        step_id: &str,
        output: &Value,
        status: StepStatus,
        error: Option<&str>,
        duration_ms: i64,
    ) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .update_step_result(step_id, output, status, error, duration_ms)
    }

    pub async fn steps_for_run(&self, run_id: &str) -> Result<Vec<StepRecord>, StoreError> {
        self.inner.lock().await.steps_for_run(run_id)
    }

    pub async fn derived_run_status(&self, run_id: &str) -> Result<RunStatus, StoreError> {
        self.inner.lock().await.derived_run_status(run_id)
    }

    pub async fn put_item(&self, key: &str, value: &Value, metadata: &Value) -> Result<(), StoreError> {
        self.inner.lock().await.put_item(key, value, metadata)
    }

    pub async fn get_item(&self, key: &str) -> Result<Option<PersistedItem>, StoreError> {
        self.inner.lock().await.get_item(key)
    }

    pub async fn list_items(&self, prefix: &str) -> Result<Vec<PersistedItem>, StoreError> {
        self.inner.lock().await.list_items(prefix)
    }

    pub async fn delete_item(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.lock().await.delete_item(key)
    }

    pub async fn append_io(&self, entry: &IoLogEntry) -> Result<(), StoreError> {
        self.inner.lock().await.append_io(entry)
    }

    pub async fn replay_log(&self, run_id: &str) -> Result<Vec<IoLogEntry>, StoreError> {
        self.inner.lock().await.replay_log(run_id)
    }

    pub async fn clear_io(&self, run_id: &str) -> Result<usize, StoreError> {
        self.inner.lock().await.clear_io(run_id)
    }
}
