use crate::config::CacheConfig;
use crate::instance::Element;
use moka::notification::RemovalCause;
use moka::sync::Cache;
use moka::Expiry;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::debug;

static GLOBAL_CACHE: OnceLock<Arc<SharedInstanceCache>> = OnceLock::new();

/// Identity of a cached read. Changing any component addresses a different entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub instance_id: String,
    pub model_id: String,
    pub uri: String,
    /// Hex sha256 of the request body, when there is one
    pub body_digest: Option<String>,
    pub read_only: bool,
}

impl CacheKey {
    pub fn new(
        instance_id: impl Into<String>,
        model_id: impl Into<String>,
        uri: impl Into<String>,
        body: Option<&[u8]>,
        read_only: bool,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            model_id: model_id.into(),
            uri: uri.into(),
            body_digest: body.map(|body| hex::encode(Sha256::digest(body))),
            read_only,
        }
    }
}

/// Parsed content of a cached read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedInstance {
    pub root: Element,
    pub source_uri: String,
    pub read_only: bool,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Arc<CachedInstance>,
    time_to_live: Option<Duration>,
}

/// Per-entry time-to-live; a replaced entry takes the new value's lifetime
struct EntryExpiry;

impl Expiry<CacheKey, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.time_to_live
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.time_to_live
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
    evictions: AtomicU64,
}

/// Concurrent cache with per-entry time-to-live and a capacity bound, backed by Moka.
///
/// Concurrent misses on the same key may both store a value; the last writer wins.
#[derive(Clone)]
pub struct SharedInstanceCache {
    entries: Cache<CacheKey, CacheEntry>,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for SharedInstanceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedInstanceCache")
            .field("max_capacity", &self.entries.policy().max_capacity())
            .field("entry_count", &self.entries.entry_count())
            .finish()
    }
}

impl SharedInstanceCache {
    pub fn new(max_entries: usize) -> Self {
        let counters = Arc::new(Counters::default());
        let listener_counters = counters.clone();
        let max_capacity = u64::try_from(max_entries.max(1)).unwrap_or(u64::MAX);

        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryExpiry)
            .eviction_listener(move |key: Arc<CacheKey>, _value: CacheEntry, cause: RemovalCause| {
                if cause.was_evicted() {
                    listener_counters.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!(uri = %key.uri, instance_id = %key.instance_id, cause = ?cause, "🗄️ Cache entry evicted");
                }
            })
            .build();

        debug!(max_capacity, "Shared instance cache created");
        Self { entries, counters }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries)
    }

    /// The process-wide cache. The first caller's capacity wins.
    pub fn global(config: &CacheConfig) -> Arc<SharedInstanceCache> {
        GLOBAL_CACHE
            .get_or_init(|| Arc::new(Self::from_config(config)))
            .clone()
    }

    /// Expired entries are never returned.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CachedInstance>> {
        match self.entries.get(key) {
            Some(entry) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value)
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `value`; `None` time-to-live keeps it until evicted.
    pub fn insert(&self, key: CacheKey, value: CachedInstance, time_to_live: Option<Duration>) {
        debug!(uri = %key.uri, instance_id = %key.instance_id, "🗄️ Caching instance");
        self.entries.insert(
            key,
            CacheEntry {
                value: Arc::new(value),
                time_to_live,
            },
        );
        self.counters.insertions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
    }

    /// Entry count after pending evictions and expirations have been applied.
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        usize::try_from(self.entries.entry_count()).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            insertions: self.counters.insertions.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cached(name: &str) -> CachedInstance {
        CachedInstance {
            root: Element::new(name),
            source_uri: "http://example.org/data".to_string(),
            read_only: false,
        }
    }

    fn key(body: Option<&[u8]>) -> CacheKey {
        CacheKey::new("main", "model", "http://example.org/data", body, false)
    }

    #[test]
    fn test_hit_after_insert_and_stats() {
        let cache = SharedInstanceCache::new(8);
        assert!(cache.get(&key(None)).is_none());

        cache.insert(key(None), cached("a"), None);
        assert_eq!(cache.get(&key(None)).unwrap().root.name, "a");

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.insertions), (1, 1, 1));
    }

    #[test]
    fn test_last_writer_wins() {
        let cache = SharedInstanceCache::new(8);
        cache.insert(key(None), cached("first"), None);
        cache.insert(key(None), cached("second"), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key(None)).unwrap().root.name, "second");
    }

    #[test]
    fn test_expired_entries_miss() {
        let cache = SharedInstanceCache::new(8);
        cache.insert(key(None), cached("a"), Some(Duration::ZERO));
        assert!(cache.get(&key(None)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_replacing_an_entry_takes_the_new_time_to_live() {
        let cache = SharedInstanceCache::new(8);
        cache.insert(key(None), cached("short"), Some(Duration::ZERO));
        cache.insert(key(None), cached("long"), Some(Duration::from_secs(60)));
        assert_eq!(cache.get(&key(None)).unwrap().root.name, "long");
    }

    #[test]
    fn test_capacity_bound_evicts() {
        let cache = SharedInstanceCache::new(2);
        cache.insert(key(Some(b"1")), cached("1"), None);
        cache.insert(key(Some(b"2")), cached("2"), None);
        cache.insert(key(Some(b"3")), cached("3"), None);

        assert_eq!(cache.len(), 2);
        let stats = cache.stats();
        assert_eq!(stats.insertions, 3);
        assert_eq!(stats.evictions, 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = SharedInstanceCache::new(8);
        cache.insert(key(Some(b"1")), cached("1"), None);
        cache.insert(key(Some(b"2")), cached("2"), None);
        assert!(cache.remove(&key(Some(b"1"))));
        assert!(!cache.remove(&key(Some(b"1"))));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_body_digest_is_sha256_hex() {
        let key = key(Some(b"abc"));
        assert_eq!(
            key.body_digest.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    proptest! {
        #[test]
        fn prop_changing_any_component_misses(
            instance in "[a-z]{1,6}",
            model in "[a-z]{1,6}",
            uri in "[a-z]{1,10}",
            body in proptest::option::of(proptest::collection::vec(any::<u8>(), 0..16)),
            read_only in any::<bool>(),
            which in 0usize..5,
        ) {
            let cache = SharedInstanceCache::new(16);
            let original = CacheKey::new(&instance, &model, &uri, body.as_deref(), read_only);
            cache.insert(original.clone(), cached("x"), None);

            let same = CacheKey::new(&instance, &model, &uri, body.as_deref(), read_only);
            prop_assert!(cache.get(&same).is_some());

            let mut changed = original.clone();
            match which {
                0 => changed.instance_id.push('!'),
                1 => changed.model_id.push('!'),
                2 => changed.uri.push('!'),
                3 => {
                    let mut other = body.clone().unwrap_or_default();
                    other.push(0xff);
                    changed.body_digest = Some(hex::encode(Sha256::digest(&other)));
                    if changed.body_digest == original.body_digest {
                        changed.body_digest = None;
                    }
                }
                _ => changed.read_only = !read_only,
            }
            prop_assert!(cache.get(&changed).is_none());
        }
    }
}
