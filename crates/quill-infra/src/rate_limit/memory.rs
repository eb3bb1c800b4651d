//! In-memory counter store.
//!
//! This is the default for single-replica deployments.
//! Note: Counts are per-process, not shared across instances.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use quill_core::ports::{CounterStore, RateLimitError, WindowEntry};

/// Window counters in a HashMap. Each hit runs under the map lock, so the
/// check-and-increment for a key is atomic.
#[derive(Default)]
pub struct InMemoryCounterStore {
    entries: Mutex<HashMap<String, WindowEntry>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current entry for a key, expired or not.
    pub async fn get(&self, key: &str) -> Option<WindowEntry> {
        self.entries.lock().await.get(key).copied()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn hit(
        &self,
        key: &str,
        now_ms: u64,
        window: Duration,
    ) -> Result<WindowEntry, RateLimitError> {
        let fresh = WindowEntry {
            count: 1,
            reset_at_ms: now_ms.saturating_add(window.as_millis() as u64),
        };

        let mut entries = self.entries.lock().await;
        let entry = match entries.get_mut(key) {
            Some(entry) if now_ms < entry.reset_at_ms => {
                entry.count = entry.count.saturating_add(1);
                *entry
            }
            Some(entry) => {
                *entry = fresh;
                fresh
            }
            None => {
                entries.insert(key.to_string(), fresh);
                fresh
            }
        };
        Ok(entry)
    }

    async fn purge_expired(&self, now_ms: u64) -> Result<usize, RateLimitError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.reset_at_ms > now_ms);
        Ok(before - entries.len())
    }
}
