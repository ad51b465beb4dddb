//! Bounded in-memory LRU with optional TTL and stale-on-read semantics.
//!
//! Implemented as an arena of nodes linked by index (no raw pointers) so
//! `get`/`set`/`delete` stay O(1) amortized without `unsafe`. Mirrors the
//! `max`/`ttl`/`updateAgeOnGet`/`allowStale` knobs §4.D names.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::Entry;

struct Node<V> {
    key: String,
    value: V,
    inserted_at: Instant,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Inner<V> {
    map: HashMap<String, usize>,
    nodes: Vec<Option<Node<V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<V> Inner<V> {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.nodes[idx].as_ref().unwrap();
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.nodes[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = self.nodes[idx].as_mut().unwrap();
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            self.nodes[h].as_mut().unwrap().prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn touch(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.detach(idx);
        self.push_front(idx);
    }

    fn evict_tail(&mut self) {
        if let Some(tail) = self.tail {
            self.detach(tail);
            let node = self.nodes[tail].take().unwrap();
            self.map.remove(&node.key);
            self.free.push(tail);
        }
    }
}

/// Bounded LRU cache, `max` entries, optional TTL.
pub struct LruCache<V> {
    inner: Mutex<Inner<V>>,
    max: usize,
    ttl: Option<Duration>,
}

impl<V: Clone> LruCache<V> {
    pub fn new(max: usize, ttl: Option<Duration>) -> Self {
        assert!(max > 0, "LRU cache capacity must be greater than zero");
        Self {
            inner: Mutex::new(Inner::new()),
            max,
            ttl,
        }
    }

    fn is_expired(&self, inserted_at: Instant) -> bool {
        self.ttl.is_some_and(|ttl| inserted_at.elapsed() > ttl)
    }

    /// Fresh read: `None` if missing or past TTL. Promotes to
    /// most-recently-used and, since `updateAgeOnGet` is always on here,
    /// resets the entry's age.
    pub async fn get(&self, key: &str) -> Option<V> {
        self.read(key, false).await.map(|e| e.value)
    }

    /// Stale-tolerant read: returns the value even if it is past TTL
    /// (`allowStale`), tagging whether it was stale so a caller like the
    /// schema cache can decide whether to trust it outright or only as a
    /// fallback.
    pub async fn get_allow_stale(&self, key: &str) -> Option<Entry<V>> {
        self.read(key, true).await
    }

    async fn read(&self, key: &str, allow_stale: bool) -> Option<Entry<V>> {
        let mut inner = self.inner.lock().await;
        let idx = *inner.map.get(key)?;
        let (value, stale) = {
            let node = inner.nodes[idx].as_ref().unwrap();
            (node.value.clone(), self.is_expired(node.inserted_at))
        };
        if stale && !allow_stale {
            return None;
        }
        inner.nodes[idx].as_mut().unwrap().inserted_at = Instant::now();
        inner.touch(idx);
        Some(Entry { value, stale })
    }

    pub async fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let mut inner = self.inner.lock().await;

        if let Some(&idx) = inner.map.get(&key) {
            {
                let node = inner.nodes[idx].as_mut().unwrap();
                node.value = value;
                node.inserted_at = Instant::now();
            }
            inner.touch(idx);
            return;
        }

        let idx = match inner.free.pop() {
            Some(i) => i,
            None => {
                inner.nodes.push(None);
                inner.nodes.len() - 1
            }
        };
        inner.nodes[idx] = Some(Node {
            key: key.clone(),
            value,
            inserted_at: Instant::now(),
            prev: None,
            next: None,
        });
        inner.map.insert(key, idx);
        inner.push_front(idx);

        if inner.map.len() > self.max {
            inner.evict_tail();
        }
    }

    pub async fn has(&self, key: &str) -> bool {
        let inner = self.inner.lock().await;
        match inner.map.get(key) {
            Some(&idx) => !self.is_expired(inner.nodes[idx].as_ref().unwrap().inserted_at),
            None => false,
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.map.get(key).copied() {
            Some(idx) => {
                inner.detach(idx);
                let node = inner.nodes[idx].take().unwrap();
                inner.map.remove(&node.key);
                inner.free.push(idx);
                true
            }
            None => false,
        }
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        *inner = Inner::new();
    }

    pub async fn size(&self) -> usize {
        self.inner.lock().await.map.len()
    }

    /// Defensive snapshot of all live (non-expired) entries.
    pub async fn entries(&self) -> Vec<(String, V)> {
        let inner = self.inner.lock().await;
        inner
            .nodes
            .iter()
            .flatten()
            .filter(|n| !self.is_expired(n.inserted_at))
            .map(|n| (n.key.clone(), n.value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn basic_get_set() {
        let cache = LruCache::new(2, None);
        cache.set("a", 1).await;
        assert_eq!(cache.get("a").await, Some(1));
        assert_eq!(cache.size().await, 1);
    }

    #[tokio::test]
    async fn evicts_least_recently_used() {
        let cache = LruCache::new(2, None);
        cache.set("a", 1).await;
        cache.set("b", 2).await;
        // touch "a" so "b" becomes the least recently used
        let _ = cache.get("a").await;
        cache.set("c", 3).await;

        assert_eq!(cache.get("b").await, None);
        assert_eq!(cache.get("a").await, Some(1));
        assert_eq!(cache.get("c").await, Some(3));
        assert_eq!(cache.size().await, 2);
    }

    #[tokio::test]
    async fn ttl_expiry_hides_from_fresh_get_but_allows_stale() {
        let cache = LruCache::new(10, Some(Duration::from_millis(1)));
        cache.set("a", 1).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(cache.get("a").await, None);
        assert!(!cache.has("a").await);

        let stale = cache.get_allow_stale("a").await.unwrap();
        assert!(stale.stale);
        assert_eq!(stale.value, 1);
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let cache = LruCache::new(10, None);
        cache.set("a", 1).await;
        assert!(cache.delete("a").await);
        assert!(!cache.delete("a").await);

        cache.set("b", 2).await;
        cache.set("c", 3).await;
        cache.clear().await;
        assert_eq!(cache.size().await, 0);
    }

    #[tokio::test]
    async fn entries_reflects_all_live_keys() {
        let cache = LruCache::new(10, None);
        cache.set("a", 1).await;
        cache.set("b", 2).await;
        let mut keys: Vec<_> = cache.entries().await.into_iter().map(|(k, _)| k).collect();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }
}
