//! Cache providers backing the schema cache: an in-memory LRU shared by
//! every cached entry type.

mod lru;

pub use lru::LruCache;

/// A single cached entry, exposed so callers (e.g. the schema cache) can
/// inspect staleness without reaching into provider internals.
#[derive(Debug, Clone)]
pub struct Entry<V> {
    pub value: V,
    pub stale: bool,
}
