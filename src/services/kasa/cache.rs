use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::error::KasaError;

pub const DEFAULT_TTL: Duration = Duration::from_millis(2000);

type SharedFetch = Shared<BoxFuture<'static, Result<Value, KasaError>>>;

enum CacheEntry {
    Ready { data: Value, stored_at: Instant },
    Pending { id: Uuid, fetch: SharedFetch },
}

/// Short-lived cache for device status, keyed by address.
///
/// Concurrent callers for the same address share one in-flight request.
/// Failures are evicted so the next caller retries.
#[derive(Clone)]
pub struct StateCache {
    ttl: Duration,
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl StateCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Return the cached value for `key`, join an in-flight fetch, or start
    /// `fetch` and publish it for others to join.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<Value, KasaError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, KasaError>> + Send + 'static,
    {
        let shared = {
            let mut entries = self.entries.lock();
            match entries.get(key) {
                Some(CacheEntry::Ready { data, stored_at }) if stored_at.elapsed() < self.ttl => {
                    debug!("State cache hit for {}", key);
                    return Ok(data.clone());
                }
                Some(CacheEntry::Pending { fetch, .. }) => {
                    debug!("Joining in-flight state request for {}", key);
                    fetch.clone()
                }
                _ => {
                    let id = Uuid::new_v4();
                    let shared = self.publishing(key.to_string(), id, fetch()).boxed().shared();
                    entries.insert(
                        key.to_string(),
                        CacheEntry::Pending {
                            id,
                            fetch: shared.clone(),
                        },
                    );
                    shared
                }
            }
        };
        shared.await
    }

    /// Wrap a fetch so its outcome lands in the table exactly once, however
    /// many callers await it.
    fn publishing<Fut>(
        &self,
        key: String,
        id: Uuid,
        fetch: Fut,
    ) -> impl Future<Output = Result<Value, KasaError>> + Send + 'static
    where
        Fut: Future<Output = Result<Value, KasaError>> + Send + 'static,
    {
        let entries = self.entries.clone();
        async move {
            let result = fetch.await;
            let mut entries = entries.lock();
            let still_ours = matches!(entries.get(&key), Some(CacheEntry::Pending { id: current, .. }) if *current == id);
            if still_ours {
                match &result {
                    Ok(data) => {
                        entries.insert(
                            key,
                            CacheEntry::Ready {
                                data: data.clone(),
                                stored_at: Instant::now(),
                            },
                        );
                    }
                    Err(e) => {
                        debug!("Evicting failed state request for {}: {}", key, e);
                        entries.remove(&key);
                    }
                }
            }
            result
        }
    }

    /// Drop whatever is cached for `key`.
    pub fn invalidate(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }
}

impl std::fmt::Debug for StateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}
