//! A [TimedCache] is a capacity-bounded map whose entries go stale a fixed time after they were written.
//!
//! Expiry is lazy: a stale entry is only dropped when [TimedCache::get] trips over it, so [TimedCache::len] can count
//! entries nobody will ever read again.  When the cache is full, inserting evicts the entry with the oldest write time.
//! Reads never refresh an entry, so this is first-in-first-out by write rather than an LRU.
//!
//! Eviction scans every entry.  The caches in this crate hold a couple of hundred previews at most.
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use ahash::RandomState;

use crate::Clock;

struct CacheEntry<V> {
    item: Arc<V>,
    /// Clock reading at the last write.
    written_at: u64,
    /// When the key was first inserted.  Survives overwrites; breaks ties between equal write times.
    seq: u64,
}

pub struct TimedCache<K: Hash + Eq, V> {
    entries: HashMap<K, CacheEntry<V>, RandomState>,
    expiration_ms: u64,
    max_size: usize,
    next_seq: u64,
    clock: Arc<dyn Clock>,
}

impl<K: Hash + Eq + Clone, V> TimedCache<K, V> {
    pub fn new(expiration_ms: u64, max_size: usize, clock: Arc<dyn Clock>) -> TimedCache<K, V> {
        TimedCache {
            entries: Default::default(),
            expiration_ms,
            max_size,
            next_seq: 0,
            clock,
        }
    }

    /// Get an item, dropping it instead if it is older than the expiration.
    ///
    /// An entry exactly `expiration_ms` old is still returned.
    pub fn get<Q>(&mut self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let (item, written_at) = {
            let entry = self.entries.get(key)?;
            (entry.item.clone(), entry.written_at)
        };

        let age = self.clock.now_ms().saturating_sub(written_at);
        if age > self.expiration_ms {
            self.entries.remove(key);
            tracing::trace!(age_ms = age, "dropped expired cache entry");
            return None;
        }

        Some(item)
    }

    /// Write an item, stamping it with the current time.  Returns the previous value for this key, if any.
    ///
    /// If the cache is already full, one entry is evicted first, even when `key` is itself present.
    pub fn set(&mut self, key: K, value: V) -> Option<Arc<V>> {
        self.set_shared(key, Arc::new(value))
    }

    /// Like [TimedCache::set], for values something else is already holding.
    pub fn set_shared(&mut self, key: K, item: Arc<V>) -> Option<Arc<V>> {
        if self.max_size == 0 {
            return None;
        }

        if self.entries.len() >= self.max_size {
            self.evict_oldest();
        }

        let now = self.clock.now_ms();
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.written_at = now;
            return Some(std::mem::replace(&mut entry.item, item));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            key,
            CacheEntry {
                item,
                written_at: now,
                seq,
            },
        );
        None
    }

    /// Drop the entry with the smallest write time.
    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| (e.written_at, e.seq))
            .map(|(k, _)| k.clone());

        if let Some(k) = oldest {
            self.entries.remove(&k);
            tracing::trace!(max_size = self.max_size, "evicted oldest cache entry");
        }
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(key).map(|e| e.item)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries, including expired ones which haven't been read since expiring.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn expiration_ms(&self) -> u64 {
        self.expiration_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use crate::ManualClock;

    fn build_cache(
        expiration_ms: u64,
        max_size: usize,
    ) -> (Arc<ManualClock>, TimedCache<String, u64>) {
        let clock = Arc::new(ManualClock::new(0));
        (
            clock.clone(),
            TimedCache::new(expiration_ms, max_size, clock),
        )
    }

    #[test]
    fn basic_ops() {
        let (_, mut cache) = build_cache(1000, 10);
        cache.set("a".into(), 1);
        cache.set("b".into(), 2);
        assert_eq!(cache.get("a").as_deref(), Some(&1));
        assert_eq!(cache.get("b").as_deref(), Some(&2));
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.set("a".into(), 3).as_deref(), Some(&1));
        assert_eq!(cache.get("a").as_deref(), Some(&3));

        assert_eq!(cache.remove("b").as_deref(), Some(&2));
        assert!(cache.get("b").is_none());
        // Removing something absent is fine.
        assert!(cache.remove("b").is_none());

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_eviction_is_by_write_time() {
        let (clock, mut cache) = build_cache(1000, 2);
        cache.set("a".into(), 1);
        clock.set(10);
        cache.set("b".into(), 2);
        clock.set(20);
        cache.set("c".into(), 3);

        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b").as_deref(), Some(&2));
        assert_eq!(cache.get("c").as_deref(), Some(&3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_reads_do_not_protect_from_eviction() {
        let (clock, mut cache) = build_cache(1000, 2);
        cache.set("a".into(), 1);
        clock.set(10);
        cache.set("b".into(), 2);
        clock.set(15);
        cache.get("a").expect("Should be cached");
        clock.set(20);
        cache.set("c".into(), 3);

        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b").as_deref(), Some(&2));
    }

    #[test]
    fn test_rewrite_refreshes_the_timestamp() {
        let (clock, mut cache) = build_cache(1000, 2);
        cache.set("a".into(), 1);
        clock.set(10);
        cache.set("b".into(), 2);
        clock.set(20);
        cache.set("a".into(), 10);
        // Overwriting at capacity still evicts the oldest write, here "a" itself, before writing it again.
        assert_eq!(cache.len(), 2);
        clock.set(30);
        cache.set("c".into(), 3);

        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("a").as_deref(), Some(&10));
        assert_eq!(cache.get("c").as_deref(), Some(&3));
    }

    // Equal write times fall back to the order keys were first inserted.
    #[test]
    fn test_eviction_ties_go_to_first_inserted() {
        let (_, mut cache) = build_cache(1000, 3);
        cache.set("x".into(), 1);
        cache.set("y".into(), 2);
        cache.set("z".into(), 3);
        cache.set("w".into(), 4);

        assert!(cache.get("x").is_none());
        assert!(cache.get("y").is_some());
        assert!(cache.get("z").is_some());
        assert!(cache.get("w").is_some());
    }

    #[test]
    fn test_expiration() {
        let (clock, mut cache) = build_cache(100, 10);
        cache.set("x".into(), 7);
        clock.set(50);
        assert_eq!(cache.get("x").as_deref(), Some(&7));

        // Exactly at the boundary is still fresh.
        clock.set(100);
        assert_eq!(cache.get("x").as_deref(), Some(&7));

        clock.set(150);
        cache.set("y".into(), 8);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("x").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clock_going_backwards_keeps_entries() {
        let (clock, mut cache) = build_cache(100, 10);
        clock.set(500);
        cache.set("x".into(), 1);
        clock.set(0);
        assert_eq!(cache.get("x").as_deref(), Some(&1));
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let (_, mut cache) = build_cache(100, 0);
        cache.set("x".into(), 1);
        assert!(cache.is_empty());
        assert!(cache.get("x").is_none());
    }

    #[derive(Copy, Clone, Debug)]
    enum CacheCommand {
        Set(u8, u64),
        Get(u8),
        Remove(u8),
        Advance(u64),
    }

    fn cache_command_strat() -> prop::strategy::BoxedStrategy<CacheCommand> {
        proptest::prop_oneof![
            (0..8u8).prop_map(CacheCommand::Get),
            (0..8u8, 0..1000u64).prop_map(|(k, v)| CacheCommand::Set(k, v)),
            (0..8u8).prop_map(CacheCommand::Remove),
            (0..30u64).prop_map(CacheCommand::Advance),
        ]
        .boxed()
    }

    /// The obvious implementation: a vec in first-insertion order, scanned for everything.
    struct Model {
        entries: Vec<(u8, u64, u64)>,
        expiration_ms: u64,
        max_size: usize,
    }

    impl Model {
        fn set(&mut self, key: u8, value: u64, now: u64) {
            if self.entries.len() >= self.max_size {
                let mut oldest = 0;
                for (i, e) in self.entries.iter().enumerate() {
                    if e.2 < self.entries[oldest].2 {
                        oldest = i;
                    }
                }
                self.entries.remove(oldest);
            }

            match self.entries.iter_mut().find(|e| e.0 == key) {
                Some(e) => {
                    e.1 = value;
                    e.2 = now;
                }
                None => self.entries.push((key, value, now)),
            }
        }

        fn get(&mut self, key: u8, now: u64) -> Option<u64> {
            let pos = self.entries.iter().position(|e| e.0 == key)?;
            let (_, value, written_at) = self.entries[pos];
            if now - written_at > self.expiration_ms {
                self.entries.remove(pos);
                return None;
            }
            Some(value)
        }

        fn remove(&mut self, key: u8) -> Option<u64> {
            let pos = self.entries.iter().position(|e| e.0 == key)?;
            Some(self.entries.remove(pos).1)
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 500,
            ..Default::default()
        })]
        #[test]
        fn test_against_model(
            max_size in 1..6usize,
            expiration_ms in 0..50u64,
            commands in prop::collection::vec(cache_command_strat(), 0..500)
        ) {
            let clock = Arc::new(ManualClock::new(0));
            let mut ours = TimedCache::<u8, u64>::new(expiration_ms, max_size, clock.clone());
            let mut model = Model { entries: vec![], expiration_ms, max_size };

            for c in commands {
                use CacheCommand::*;

                let now = clock.now_ms();
                match c {
                    Set(k, v) => {
                        ours.set(k, v);
                        model.set(k, v, now);
                    }
                    Get(k) => prop_assert_eq!(ours.get(&k).as_deref().cloned(), model.get(k, now)),
                    Remove(k) => {
                        prop_assert_eq!(ours.remove(&k).as_deref().cloned(), model.remove(k))
                    }
                    Advance(ms) => clock.advance(ms),
                }

                prop_assert_eq!(ours.len(), model.entries.len());
                prop_assert!(ours.len() <= max_size);
            }
        }
    }
}
