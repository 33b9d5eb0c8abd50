use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::SequenceAllocator;
use crate::store::{StoreError, StoreResult};

#[derive(Default)]
pub struct MemorySequences {
    counters: Mutex<HashMap<String, i64>>,
    unavailable: AtomicBool,
}

impl MemorySequences {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every allocation fails as if the store were down.
    #[cfg(test)]
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    /// Last value issued for `name`, 0 if never used.
    #[cfg(test)]
    pub async fn current(&self, name: &str) -> i64 {
        self.counters.lock().await.get(name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl SequenceAllocator for MemorySequences {
    async fn next_value(&self, name: &str) -> StoreResult<i64> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "sequence store unavailable"
            )));
        }
        let mut counters = self.counters.lock().await;
        let value = counters.entry(name.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}
