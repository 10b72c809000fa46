use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

type SharedFetch<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

enum Slot<V, E>
where
    V: Clone,
    E: Clone,
{
    Ready { value: V, expires_at: Instant },
    Pending { id: u64, fetch: SharedFetch<V, E> },
}

/// Time-bounded cache that coalesces concurrent fetches of the same key.
///
/// Callers asking for a key that is already being fetched wait on the
/// in-flight fetch instead of starting another one. Values become visible
/// only once the fetch has completed successfully; failures are not cached.
/// Expired entries are dropped whenever a new fetch starts, so the map only
/// holds live values and in-flight fetches.
#[derive(Clone)]
pub struct Cache<K, V, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    inner: Arc<Mutex<HashMap<K, Slot<V, E>>>>,
    next_id: Arc<AtomicU64>,
    ttl: Duration,
}

impl<K, V, E> Cache<K, V, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
            ttl,
        }
    }

    /// Returns the cached value for `key`, joining an in-flight fetch or
    /// starting one with `fetch` when there is neither.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let (id, shared) = {
            let mut cache = self.inner.lock().await;
            match cache.get(&key) {
                Some(Slot::Ready { value, expires_at }) if *expires_at > Instant::now() => {
                    debug!("Cache HIT for key: {:?}", key);
                    return Ok(value.clone());
                }
                Some(Slot::Pending { id, fetch }) => {
                    debug!("Joining in-flight fetch for key: {:?}", key);
                    (*id, fetch.clone())
                }
                _ => {
                    debug!("Cache MISS for key: {:?}", key);
                    let now = Instant::now();
                    cache.retain(|_, slot| {
                        !matches!(slot, Slot::Ready { expires_at, .. } if *expires_at <= now)
                    });
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let shared = fetch().boxed().shared();
                    cache.insert(
                        key.clone(),
                        Slot::Pending {
                            id,
                            fetch: shared.clone(),
                        },
                    );
                    (id, shared)
                }
            }
        };

        let result = shared.await;

        // Whichever waiter finishes first publishes; the slot is only
        // replaced if it still belongs to this fetch.
        let mut cache = self.inner.lock().await;
        let owns_slot = matches!(
            cache.get(&key),
            Some(Slot::Pending { id: current, .. }) if *current == id
        );
        if owns_slot {
            match &result {
                Ok(value) => {
                    debug!("Cache PUT for key: {:?}", key);
                    cache.insert(
                        key,
                        Slot::Ready {
                            value: value.clone(),
                            expires_at: Instant::now() + self.ttl,
                        },
                    );
                }
                Err(_) => {
                    debug!("Fetch failed, not caching key: {:?}", key);
                    cache.remove(&key);
                }
            }
        }
        result
    }
}
