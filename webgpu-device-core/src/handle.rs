//! Typed-handle and ownership primitives.
//!
//! Every cacheable object in the device (bind-group layouts, pipeline
//! layouts, shader modules, samplers, render/compute pipelines, attachment
//! states) is reached through a [`Strong<T>`] handle. The device's caches
//! hold only [`Weak<T>`] handles so that an object disappears from its
//! cache the instant the last external reference drops, without the cache
//! itself keeping anything alive.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak as StdWeak};

slotmap::new_key_type! {
    /// Opaque, generational identifier for a device-owned object.
    ///
    /// Distinct from [`Strong`]/[`Weak`]: an `Id` is a cheap `Copy` key used
    /// by command encoders and validation code that only needs to *name* an
    /// object, not keep it alive.
    pub struct RawId;
}

/// A strongly typed wrapper around [`RawId`] so that, say, a
/// `TypedId<BindGroupLayout>` can never be confused with a
/// `TypedId<Sampler>` at the type level.
pub struct TypedId<T> {
    raw: RawId,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> TypedId<T> {
    pub fn new(raw: RawId) -> Self {
        Self {
            raw,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn raw(&self) -> RawId {
        self.raw
    }
}

impl<T> Clone for TypedId<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for TypedId<T> {}
impl<T> PartialEq for TypedId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}
impl<T> Eq for TypedId<T> {}
impl<T> Hash for TypedId<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}
impl<T> std::fmt::Debug for TypedId<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypedId({:?})", self.raw)
    }
}

/// Content-hashing contract every cacheable object type must satisfy.
///
/// The hash is computed exactly once, at construction, before the object is
/// published to its cache — an entry's content hash never changes after it
/// becomes visible to other threads.
pub trait ContentHash {
    /// 64-bit content hash of the object's blueprint.
    fn content_hash(&self) -> u64;

    /// Full equality check used to resolve hash collisions. Two objects with
    /// equal `content_hash()` may still be `content_equal() == false`.
    fn content_equal(&self, other: &Self) -> bool;
}

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// A cache entry: the payload plus its precomputed content hash and a
/// monotonically increasing sequence number used only to break ties when
/// logging or when deterministic ordering is required (e.g. walking
/// indirect-draw metadata in recorded order).
pub struct Entry<T> {
    pub(crate) payload: T,
    pub(crate) hash: u64,
    pub(crate) sequence: u64,
}

impl<T: ContentHash> Entry<T> {
    pub fn new(payload: T) -> Self {
        let hash = payload.content_hash();
        Self {
            payload,
            hash,
            sequence: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl<T> std::ops::Deref for Entry<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.payload
    }
}

/// Strong, externally-held reference to a cached object. Dropping the last
/// `Strong<T>` for an object is what triggers its removal from the owning
/// cache — see [`crate::cache::ContentCache::find`].
pub struct Strong<T>(Arc<Entry<T>>);

impl<T> Strong<T> {
    pub fn new(entry: Entry<T>) -> Self {
        Self(Arc::new(entry))
    }

    pub fn downgrade(&self) -> Weak<T> {
        Weak(Arc::downgrade(&self.0))
    }

    pub fn hash(&self) -> u64 {
        self.0.hash
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl<T> Clone for Strong<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> std::ops::Deref for Strong<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0.payload
    }
}

/// Weak reference held by a [`crate::cache::ContentCache`]. Never keeps its
/// target alive.
pub struct Weak<T>(StdWeak<Entry<T>>);

impl<T> Weak<T> {
    pub fn upgrade(&self) -> Option<Strong<T>> {
        self.0.upgrade().map(Strong)
    }
}

impl<T> Clone for Weak<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}
