//! Shared query cache keyed by resource collection.

use flowsphere_core::{Resource, UserId};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::debug;

const INVALIDATION_CAPACITY: usize = 64;

/// Stable identifier of a cached collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(&'static str);

impl QueryKey {
    /// Key under which collection `R` is cached.
    #[must_use]
    pub const fn of<R: Resource>() -> Self {
        Self(R::COLLECTION)
    }

    /// The collection name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Invalidation count of a key, taken before a fetch starts.
///
/// A fetch that finishes after the key was invalidated must not be cached as
/// fresh: [`QueryCache::put`] compares generations and stores such results
/// stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(u64);

struct CacheEntry {
    owner: UserId,
    stale: bool,
    fetched_at: Instant,
    data: Box<dyn Any + Send + Sync>,
}

/// In-memory collections shared by every hook of the application.
///
/// Entries remember which user fetched them and are never served to anyone
/// else. Invalidation only marks an entry stale and tells subscribers; the
/// next read refetches.
pub struct QueryCache {
    entries: Mutex<Entries>,
    max_age: Option<Duration>,
    invalidations: broadcast::Sender<QueryKey>,
}

#[derive(Default)]
struct Entries {
    data: HashMap<QueryKey, CacheEntry>,
    generations: HashMap<QueryKey, u64>,
}

impl Entries {
    fn generation(&self, key: QueryKey) -> Generation {
        Generation(self.generations.get(&key).copied().unwrap_or_default())
    }

    fn bump(&mut self, key: QueryKey) {
        *self.generations.entry(key).or_default() += 1;
    }
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<QueryKey> = self.guard().data.keys().copied().collect();
        f.debug_struct("QueryCache")
            .field("keys", &keys)
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    /// Cache whose entries stay fresh until invalidated.
    #[must_use]
    pub fn new() -> Self {
        let (invalidations, _) = broadcast::channel(INVALIDATION_CAPACITY);
        Self {
            entries: Mutex::new(Entries::default()),
            max_age: None,
            invalidations,
        }
    }

    /// Also treat entries older than `max_age` as stale.
    #[must_use]
    pub const fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    fn guard(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh collection `R` fetched by `owner`, if cached.
    #[must_use]
    pub fn get<R: Resource>(&self, owner: UserId) -> Option<Arc<[R]>> {
        let entries = self.guard();
        let entry = entries.data.get(&QueryKey::of::<R>())?;
        let expired = self
            .max_age
            .is_some_and(|max_age| entry.fetched_at.elapsed() >= max_age);
        if entry.owner != owner || entry.stale || expired {
            return None;
        }
        entry.data.downcast_ref::<Arc<[R]>>().cloned()
    }

    /// Current generation of `key`; read it before fetching.
    #[must_use]
    pub fn generation(&self, key: QueryKey) -> Generation {
        self.guard().generation(key)
    }

    /// Store collection `R` as fetched by `owner` from `generation`.
    ///
    /// If `key` was invalidated since `generation` was read, the items are
    /// kept but marked stale so the next read fetches again.
    pub fn put<R: Resource>(&self, owner: UserId, generation: Generation, items: Arc<[R]>) {
        let key = QueryKey::of::<R>();
        let mut entries = self.guard();
        let stale = entries.generation(key) != generation;
        if stale {
            debug!(%key, "Fetch overtaken by invalidation; caching as stale");
        }
        entries.data.insert(
            key,
            CacheEntry {
                owner,
                stale,
                fetched_at: Instant::now(),
                data: Box::new(items),
            },
        );
    }

    /// Mark `key` stale and notify subscribers.
    pub fn invalidate(&self, key: QueryKey) {
        {
            let mut entries = self.guard();
            entries.bump(key);
            if let Some(entry) = entries.data.get_mut(&key) {
                entry.stale = true;
            }
        }
        debug!(%key, "Invalidated query");
        // No receivers is fine.
        let _ = self.invalidations.send(key);
    }

    /// Whether `key` has no usable entry.
    #[must_use]
    pub fn is_stale(&self, key: QueryKey) -> bool {
        self.guard().data.get(&key).is_none_or(|entry| entry.stale)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let keys: Vec<QueryKey> = {
            let mut entries = self.guard();
            let keys: Vec<QueryKey> = entries.data.drain().map(|(key, _)| key).collect();
            for key in &keys {
                entries.bump(*key);
            }
            keys
        };
        for key in keys {
            let _ = self.invalidations.send(key);
        }
    }

    /// Receive the key of every invalidated collection.
    #[must_use]
    pub fn subscribe_invalidations(&self) -> broadcast::Receiver<QueryKey> {
        self.invalidations.subscribe()
    }
}
