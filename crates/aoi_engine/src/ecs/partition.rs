//! Per-tick partition sets
//!
//! Each tick the registry is scanned once and every entity holding a role is
//! sorted into a static or a moving bucket for that role. The sets only
//! borrow entities by key; they are cleared at the start of every tick and
//! keep their capacity across ticks.

use super::entity::EntityKey;
use crate::foundation::memory::{AllocError, Allocator};

/// Growable list of entity keys with doubling growth
#[derive(Debug)]
pub struct ObjectSet {
    keys: Vec<EntityKey>,
    capacity: usize,
}

impl ObjectSet {
    fn bytes_for(capacity: usize) -> usize {
        capacity * std::mem::size_of::<EntityKey>()
    }

    /// Create a set able to hold `capacity` keys before growing
    pub fn new<A: Allocator + ?Sized>(capacity: usize, alloc: &mut A) -> Result<Self, AllocError> {
        let capacity = capacity.max(1);
        alloc.request(Self::bytes_for(capacity))?;
        Ok(Self {
            keys: Vec::with_capacity(capacity),
            capacity,
        })
    }

    /// Append a key, doubling the backing storage when full
    pub fn push<A: Allocator + ?Sized>(&mut self, key: EntityKey, alloc: &mut A) -> Result<(), AllocError> {
        if self.keys.len() >= self.capacity {
            let grown = self.capacity * 2;
            alloc.request(Self::bytes_for(grown))?;
            alloc.release(Self::bytes_for(self.capacity));
            self.keys.reserve_exact(grown - self.keys.len());
            self.capacity = grown;
        }
        self.keys.push(key);
        Ok(())
    }

    /// Forget every key, keeping the storage
    pub fn clear(&mut self) {
        self.keys.clear();
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no key
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys in insertion order
    pub fn as_slice(&self) -> &[EntityKey] {
        &self.keys
    }

    /// Bytes currently requested for the backing storage
    pub fn storage_bytes(&self) -> usize {
        Self::bytes_for(self.capacity)
    }
}

/// The four role/motion buckets rebuilt every tick
#[derive(Debug)]
pub struct Partitions {
    /// Watchers without significant change
    pub watcher_static: ObjectSet,
    /// Watchers that moved or changed role
    pub watcher_move: ObjectSet,
    /// Markers without significant change
    pub marker_static: ObjectSet,
    /// Markers that moved or changed role
    pub marker_move: ObjectSet,
}

impl Partitions {
    /// Create all four sets with the same initial capacity
    ///
    /// On failure, sets created so far are given back to the allocator.
    pub fn new<A: Allocator + ?Sized>(capacity: usize, alloc: &mut A) -> Result<Self, AllocError> {
        let watcher_static = ObjectSet::new(capacity, alloc)?;
        let watcher_move = Self::or_release(ObjectSet::new(capacity, alloc), alloc, &[&watcher_static])?;
        let marker_static = Self::or_release(
            ObjectSet::new(capacity, alloc),
            alloc,
            &[&watcher_static, &watcher_move],
        )?;
        let marker_move = Self::or_release(
            ObjectSet::new(capacity, alloc),
            alloc,
            &[&watcher_static, &watcher_move, &marker_static],
        )?;
        Ok(Self {
            watcher_static,
            watcher_move,
            marker_static,
            marker_move,
        })
    }

    fn or_release<A: Allocator + ?Sized>(
        result: Result<ObjectSet, AllocError>,
        alloc: &mut A,
        built: &[&ObjectSet],
    ) -> Result<ObjectSet, AllocError> {
        result.map_err(|err| {
            for set in built {
                alloc.release(set.storage_bytes());
            }
            err
        })
    }

    /// Empty every set
    pub fn clear(&mut self) {
        self.watcher_static.clear();
        self.watcher_move.clear();
        self.marker_static.clear();
        self.marker_move.clear();
    }

    /// Sort one entity into the buckets of the roles it holds
    pub fn classify<A: Allocator + ?Sized>(
        &mut self,
        key: EntityKey,
        is_watcher: bool,
        is_marker: bool,
        moved: bool,
        alloc: &mut A,
    ) -> Result<(), AllocError> {
        if is_watcher {
            let set = if moved { &mut self.watcher_move } else { &mut self.watcher_static };
            set.push(key, alloc)?;
        }
        if is_marker {
            let set = if moved { &mut self.marker_move } else { &mut self.marker_static };
            set.push(key, alloc)?;
        }
        Ok(())
    }

    /// Give the storage of all four sets back to `alloc`, one block per set
    pub fn release_storage<A: Allocator + ?Sized>(&self, alloc: &mut A) {
        for set in [&self.watcher_static, &self.watcher_move, &self.marker_static, &self.marker_move] {
            alloc.release(set.storage_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::memory::CountingAllocator;
    use slotmap::SlotMap;

    #[test]
    fn test_set_doubles_when_full() {
        let mut alloc = CountingAllocator::new();
        let mut keys: SlotMap<EntityKey, ()> = SlotMap::with_key();
        let mut set = ObjectSet::new(2, &mut alloc).unwrap();

        for _ in 0..5 {
            set.push(keys.insert(()), &mut alloc).unwrap();
        }

        assert_eq!(set.len(), 5);
        assert_eq!(set.storage_bytes(), ObjectSet::bytes_for(8));
        assert_eq!(alloc.stats().live_bytes, set.storage_bytes());
        assert_eq!(alloc.stats().live_blocks, 1);

        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.storage_bytes(), ObjectSet::bytes_for(8));
    }

    #[test]
    fn test_dual_role_entity_lands_in_both_buckets() {
        let mut alloc = CountingAllocator::new();
        let mut keys: SlotMap<EntityKey, ()> = SlotMap::with_key();
        let mut parts = Partitions::new(4, &mut alloc).unwrap();
        let both = keys.insert(());
        let idle = keys.insert(());

        parts.classify(both, true, true, true, &mut alloc).unwrap();
        parts.classify(idle, false, true, false, &mut alloc).unwrap();

        assert_eq!(parts.watcher_move.as_slice(), &[both]);
        assert_eq!(parts.marker_move.as_slice(), &[both]);
        assert_eq!(parts.marker_static.as_slice(), &[idle]);
        assert!(parts.watcher_static.is_empty());

        parts.clear();
        assert!(parts.marker_move.is_empty() && parts.marker_static.is_empty());
    }

    #[test]
    fn test_release_storage_balances_growth() {
        let mut alloc = CountingAllocator::new();
        let mut keys: SlotMap<EntityKey, ()> = SlotMap::with_key();
        let mut parts = Partitions::new(1, &mut alloc).unwrap();
        for _ in 0..3 {
            parts.classify(keys.insert(()), true, true, true, &mut alloc).unwrap();
        }
        assert_eq!(alloc.stats().live_blocks, 4);

        parts.release_storage(&mut alloc);
        assert_eq!(alloc.stats().live_blocks, 0);
        assert_eq!(alloc.stats().live_bytes, 0);
    }
}
