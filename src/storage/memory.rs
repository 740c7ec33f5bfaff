//! Process-local history store
//!
//! Same semantics as the SQLite backend, minus durability. Used when the
//! configured db_path is `:memory:` and by tests that need a real store.

use super::{DuplicatePolicy, HistoryStore, StoreError};
use crate::model::AnalysisRecord;
use std::sync::Mutex;

pub struct MemoryHistoryStore {
    records: Mutex<Vec<AnalysisRecord>>,
    policy: DuplicatePolicy,
}

impl MemoryHistoryStore {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            policy,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<AnalysisRecord>>, StoreError> {
        self.records
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("history lock poisoned: {}", e)))
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn append(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        record.validate()?;
        let mut records = self.lock()?;
        if self.policy == DuplicatePolicy::Overwrite {
            records.retain(|r| r.id != record.id);
        }
        records.push(record.clone());
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<AnalysisRecord>, StoreError> {
        Ok(self.lock()?.clone())
    }
}
