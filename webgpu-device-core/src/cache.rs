//! Content-addressed cache.
//!
//! A sharded, concurrent "find-or-insert" cache keyed by a precomputed
//! 64-bit content hash, backed by weak references so an entry disappears
//! once every strong reference to it drops.
//!
//! Single-flight-tolerant, not single-flight-enforced: `factory` runs
//! outside any lock, so two threads racing on the same content may both
//! construct a value; the loser's output is simply dropped. This trades a
//! wasted compile for never holding a lock across `factory`, which may
//! itself take the device lock or talk to a backend.

use std::hash::Hash;

use dashmap::DashMap;

use crate::handle::{ContentHash, Entry, Strong, Weak};

/// Per-type content-addressed cache.
///
/// `T` must be `ContentHash` so each [`Entry`] stores its hash once, at
/// construction, and never recomputes it.
pub struct ContentCache<T> {
    // Hash -> all live entries sharing that hash (collisions are resolved by
    // `content_equal`, not by discarding one of them).
    buckets: DashMap<u64, Vec<Weak<T>>>,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
    races_lost: std::sync::atomic::AtomicU64,
}

impl<T: ContentHash> Default for ContentCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ContentHash> ContentCache<T> {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
            hits: Default::default(),
            misses: Default::default(),
            races_lost: Default::default(),
        }
    }

    /// O(1) expected lookup. Returns a live entry iff its content hash
    /// matches and `content_equal` succeeds. A unique entry whose last
    /// strong reference is concurrently dropping is treated as absent.
    pub fn find(&self, blueprint: &T) -> Option<Strong<T>> {
        let hash = blueprint.content_hash();
        let bucket = self.buckets.get(&hash)?;
        for weak in bucket.iter() {
            if let Some(strong) = weak.upgrade() {
                if strong.content_equal(blueprint) {
                    self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    return Some(strong);
                }
            }
        }
        None
    }

    /// Find-or-create with single-flight-tolerant race resolution.
    ///
    /// 1. `find` — return immediately on a hit.
    /// 2. Call `factory` *outside* any cache lock.
    /// 3. Atomically attempt to publish; if another thread already
    ///    published an equal entry, discard the local one and return the
    ///    winner.
    pub fn get_or_create<E, F>(&self, blueprint: &T, factory: F) -> Result<Strong<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        profiling::scope!("ContentCache::get_or_create");

        if let Some(found) = self.find(blueprint) {
            return Ok(found);
        }

        self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let created = factory()?;
        Ok(self.insert(created))
    }

    /// Publish a freshly constructed value, resolving any race against a
    /// concurrent winner. Used only by [`Self::get_or_create`].
    fn insert(&self, payload: T) -> Strong<T> {
        let entry = Entry::new(payload);
        let hash = entry.hash();
        let candidate = Strong::new(entry);

        let mut bucket = self.buckets.entry(hash).or_default();

        // Prune dead weak refs and check whether a racing thread already won.
        bucket.retain(|weak| weak.upgrade().is_some());
        for weak in bucket.iter() {
            if let Some(existing) = weak.upgrade() {
                if existing.content_equal(&candidate) {
                    self.races_lost.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    log::debug!("content cache: discarding a redundant construction that lost a creation race");
                    return existing;
                }
            }
        }

        bucket.push(candidate.downgrade());
        candidate
    }

    /// Drop any fully-dead weak slots. Caches are self-pruning on `find`
    /// and `insert`, so this is only needed by tests and diagnostics that
    /// want an exact live count.
    pub fn compact(&self) {
        self.buckets.retain(|_, bucket| {
            bucket.retain(|weak| weak.upgrade().is_some());
            !bucket.is_empty()
        });
    }

    pub fn live_count(&self) -> usize {
        self.buckets
            .iter()
            .map(|entry| entry.value().iter().filter(|w| w.upgrade().is_some()).count())
            .sum()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(std::sync::atomic::Ordering::Relaxed),
            misses: self.misses.load(std::sync::atomic::Ordering::Relaxed),
            races_lost: self.races_lost.load(std::sync::atomic::Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub races_lost: u64,
}

/// A *pipeline-compatibility-scoped* key wrapper, used by caches whose
/// content equality depends on a non-content field — the pipeline
/// compatibility token: two bind-group layouts with identical entries but
/// different nonzero tokens must never compare equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CompatibilityToken(u64);

impl CompatibilityToken {
    /// Token `0` means "explicit layout" — interchangeable with any other
    /// token-`0` layout of identical content.
    pub const EXPLICIT: CompatibilityToken = CompatibilityToken(0);

    pub fn is_explicit(self) -> bool {
        self.0 == 0
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Mints monotonically increasing, always-nonzero compatibility tokens.
#[derive(Default)]
pub struct CompatibilityTokenMinter(std::sync::atomic::AtomicU64);

impl CompatibilityTokenMinter {
    pub fn mint(&self) -> CompatibilityToken {
        let value = self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
        CompatibilityToken(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone)]
    struct Blueprint {
        value: u32,
    }

    impl ContentHash for Blueprint {
        fn content_hash(&self) -> u64 {
            self.value as u64
        }
        fn content_equal(&self, other: &Self) -> bool {
            self.value == other.value
        }
    }

    #[test]
    fn find_or_create_returns_same_pointer_for_same_content() {
        let cache: ContentCache<Blueprint> = ContentCache::new();
        let bp = Blueprint { value: 42 };
        let a = cache
            .get_or_create::<(), _>(&bp, || Ok(bp.clone()))
            .unwrap();
        let b = cache
            .get_or_create::<(), _>(&bp, || Ok(bp.clone()))
            .unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn distinct_content_never_compares_equal() {
        let cache: ContentCache<Blueprint> = ContentCache::new();
        let a = cache
            .get_or_create::<(), _>(&Blueprint { value: 1 }, || Ok(Blueprint { value: 1 }))
            .unwrap();
        let b = cache
            .get_or_create::<(), _>(&Blueprint { value: 2 }, || Ok(Blueprint { value: 2 }))
            .unwrap();
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn entry_self_removes_when_last_strong_drops() {
        let cache: ContentCache<Blueprint> = ContentCache::new();
        let bp = Blueprint { value: 9 };
        let strong = cache.get_or_create::<(), _>(&bp, || Ok(bp.clone())).unwrap();
        assert!(cache.find(&bp).is_some());
        drop(strong);
        assert!(cache.find(&bp).is_none());
        cache.compact();
        assert_eq!(cache.live_count(), 0);
    }

    #[test]
    fn concurrent_get_or_create_races_to_one_winner() {
        let cache: Arc<ContentCache<Blueprint>> = Arc::new(ContentCache::new());
        let bp = Blueprint { value: 100 };

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let bp = bp.clone();
                std::thread::spawn(move || {
                    cache
                        .get_or_create::<(), _>(&bp, || Ok(bp.clone()))
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for window in results.windows(2) {
            assert!(window[0].ptr_eq(&window[1]));
        }
    }

    #[test]
    fn compatibility_tokens_are_nonzero_and_monotonic() {
        let minter = CompatibilityTokenMinter::default();
        let a = minter.mint();
        let b = minter.mint();
        assert!(!a.is_explicit());
        assert!(!b.is_explicit());
        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
    }
}
