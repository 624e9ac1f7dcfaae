use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

struct TimerEntry {
    id: Uuid,
    handle: JoinHandle<()>,
}

/// Per-device auto-off / pulse-off timers.
///
/// INVARIANT: at most one live timer per key. `arm` cancels the previous
/// entry and installs the new one under a single lock, and a firing timer
/// only removes the entry if it is still its own.
#[derive(Clone, Default)]
pub struct TimerRegistry {
    entries: Arc<Mutex<HashMap<String, TimerEntry>>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `action` to run after `delay`, replacing any timer already
    /// armed for `key`. Must be called from within a tokio runtime.
    pub fn arm<F>(&self, key: &str, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let registry = self.clone();
        let task_key = key.to_string();

        let mut entries = self.entries.lock();
        if let Some(previous) = entries.remove(key) {
            previous.handle.abort();
            debug!("Superseded timer {} for {}", previous.id, key);
        }

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Leave the table before acting so a concurrent clear cannot
            // abort us half-way through the turn-off.
            if registry.take_if_current(&task_key, id) {
                action.await;
            }
        });

        entries.insert(key.to_string(), TimerEntry { id, handle });
        debug!("Armed timer {} for {} ({:?})", id, key, delay);
    }

    /// Cancel the timer for `key`. Returns whether one was armed.
    pub fn clear(&self, key: &str) -> bool {
        match self.entries.lock().remove(key) {
            Some(entry) => {
                entry.handle.abort();
                debug!("Cleared timer {} for {}", entry.id, key);
                true
            }
            None => false,
        }
    }

    /// Cancel every live timer. Returns how many were cancelled.
    pub fn clear_all(&self) -> usize {
        let drained: Vec<(String, TimerEntry)> = self.entries.lock().drain().collect();
        for (key, entry) in &drained {
            entry.handle.abort();
            debug!("Cleared timer {} for {}", entry.id, key);
        }
        drained.len()
    }

    pub fn is_armed(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    fn take_if_current(&self, key: &str, id: Uuid) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.id == id => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for TimerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerRegistry").field("keys", &self.keys()).finish()
    }
}
