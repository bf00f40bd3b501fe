//! Per-workload mutual exclusion

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

/// Keyed async locks, one per workload id
#[derive(Debug, Default)]
pub struct WorkloadLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl WorkloadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `workload_id`
    pub async fn acquire(&self, workload_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(locks) => locks,
                Err(poisoned) => poisoned.into_inner(),
            };
            // drop entries nobody holds or waits on
            locks.retain(|id, lock| id == workload_id || Arc::strong_count(lock) > 1);
            locks
                .entry(workload_id.to_string())
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or_default()
    }
}
