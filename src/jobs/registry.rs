use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// In-memory admission control: at most one active run per key, each run
/// identified by a monotonically increasing generation token. This map is the
/// sole source of truth for "is something running right now"; the persisted
/// status may lag behind it (and is reconciled at boot by recovery).
pub struct JobRegistry {
    inner: Mutex<RegistryInner>,
}

struct RegistryInner {
    active: HashMap<String, ActiveRun>,
    next_generation: u64,
}

#[derive(Debug)]
struct ActiveRun {
    generation: u64,
    cancel_requested: bool,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                active: HashMap::new(),
                next_generation: 1,
            }),
        }
    }

    /// Marks the key active and returns the generation for the new run, or
    /// `None` when a run already holds the slot.
    pub async fn try_acquire(&self, key: &str) -> Option<u64> {
        let mut inner = self.inner.lock().await;
        if inner.active.contains_key(key) {
            return None;
        }
        let generation = inner.next_generation;
        inner.next_generation += 1;
        inner.active.insert(
            key.to_string(),
            ActiveRun { generation, cancel_requested: false },
        );
        debug!("acquired slot for {} (generation {})", key, generation);
        Some(generation)
    }

    /// Clears the slot, but only for the generation that holds it. A stale
    /// release from a superseded run must not unblock a newer one.
    pub async fn release(&self, key: &str, generation: u64) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.active.get(key) {
            Some(run) if run.generation == generation => {
                inner.active.remove(key);
                debug!("released slot for {} (generation {})", key, generation);
                true
            }
            Some(run) => {
                warn!(
                    "ignoring stale release for {} (held by generation {}, release from {})",
                    key, run.generation, generation
                );
                false
            }
            None => false,
        }
    }

    /// Sets the cooperative cancel flag for the active run. Returns `false`
    /// when nothing is running for the key.
    pub async fn request_cancel(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.active.get_mut(key) {
            Some(run) => {
                run.cancel_requested = true;
                true
            }
            None => false,
        }
    }

    pub async fn is_active(&self, key: &str) -> bool {
        self.inner.lock().await.active.contains_key(key)
    }

    /// Whether this generation still holds the slot for the key. Checked
    /// before every persisted write so a superseded run discards its state
    /// instead of clobbering a newer run's.
    pub async fn is_current(&self, key: &str, generation: u64) -> bool {
        self.inner
            .lock()
            .await
            .active
            .get(key)
            .map(|run| run.generation == generation)
            .unwrap_or(false)
    }

    pub async fn cancel_requested(&self, key: &str, generation: u64) -> bool {
        self.inner
            .lock()
            .await
            .active
            .get(key)
            .map(|run| run.generation == generation && run.cancel_requested)
            .unwrap_or(false)
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
