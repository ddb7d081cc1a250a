//! Entity registry
//!
//! Open-addressing hash table keyed by [`EntityId`] with chaining through an
//! explicit `next` index stored in each slot. Every id has a *main position*
//! (`id & (capacity - 1)`); colliding ids live in free slots linked from the
//! chain that starts at that main position. Free slots are handed out by a
//! cursor walking down from the top of the table. When it runs dry the table
//! doubles and every live entry is reinserted. The table never shrinks.
//!
//! Removing an id keeps the id in its slot as a tombstone so chains passing
//! through it stay walkable. A later lookup of the same id reuses the slot.

use log::debug;

use super::entity::EntityId;
use crate::foundation::memory::{AllocError, Allocator};

#[derive(Debug, Clone)]
struct Slot<V> {
    id: Option<EntityId>,
    value: Option<V>,
    next: Option<usize>,
}

impl<V> Slot<V> {
    const fn vacant() -> Self {
        Self {
            id: None,
            value: None,
            next: None,
        }
    }
}

/// Hash table mapping entity ids to values (arena keys in practice)
#[derive(Debug)]
pub struct Registry<V> {
    slots: Vec<Slot<V>>,
    /// Next candidate for a free slot, counting down
    last_free: Option<usize>,
    /// Slots carrying an id, live or tombstone
    occupied: usize,
    /// Slots carrying a value
    len: usize,
}

impl<V: Copy> Registry<V> {
    /// Create a table with `capacity` slots, rounded up to a power of two
    pub fn new<A: Allocator + ?Sized>(capacity: usize, alloc: &mut A) -> Result<Self, AllocError> {
        let capacity = capacity.max(1).next_power_of_two();
        alloc.request(Self::bytes_for(capacity))?;
        Ok(Self::with_vacant_slots(capacity))
    }

    fn with_vacant_slots(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| Slot::vacant()).collect(),
            last_free: capacity.checked_sub(1),
            occupied: 0,
            len: 0,
        }
    }

    fn bytes_for(capacity: usize) -> usize {
        capacity * std::mem::size_of::<Slot<V>>()
    }

    /// Bytes currently requested for the slot array
    pub fn table_bytes(&self) -> usize {
        Self::bytes_for(self.slots.len())
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no live entry exists
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn main_position(&self, id: EntityId) -> usize {
        id as usize & (self.slots.len() - 1)
    }

    /// Walk the chain of `id` and return the slot holding it, live or tombstone
    fn find(&self, id: EntityId) -> Option<usize> {
        let mut index = self.main_position(id);
        loop {
            let slot = &self.slots[index];
            if slot.id == Some(id) {
                return Some(index);
            }
            index = slot.next?;
        }
    }

    /// Value stored for `id`, without creating anything
    pub fn get(&self, id: EntityId) -> Option<V> {
        self.find(id).and_then(|index| self.slots[index].value)
    }

    /// Value stored for `id`, creating it with `make` when absent
    ///
    /// `make` receives the allocator so the caller can account for whatever
    /// it builds. If it fails nothing is inserted.
    pub fn query_or_try_insert_with<A, F>(
        &mut self,
        id: EntityId,
        alloc: &mut A,
        make: F,
    ) -> Result<V, AllocError>
    where
        A: Allocator + ?Sized,
        F: FnOnce(&mut A) -> Result<V, AllocError>,
    {
        if let Some(index) = self.find(id) {
            if let Some(value) = self.slots[index].value {
                return Ok(value);
            }
            let value = make(alloc)?;
            self.slots[index].value = Some(value);
            self.len += 1;
            return Ok(value);
        }

        self.reserve_for(id, alloc)?;
        let value = make(alloc)?;
        self.insert_reserved(id, value, alloc)?;
        Ok(value)
    }

    /// Detach the value stored for `id`, leaving a tombstone behind
    pub fn remove(&mut self, id: EntityId) -> Option<V> {
        let index = self.find(id)?;
        let value = self.slots[index].value.take();
        if value.is_some() {
            self.len -= 1;
        }
        value
    }

    /// Iterate over every live value in slot order
    pub fn values(&self) -> impl Iterator<Item = V> + '_ {
        self.slots.iter().filter_map(|slot| slot.value)
    }

    /// Grow ahead of time if placing `id` would need a free slot and none is left.
    ///
    /// Slots above the free cursor are never vacant, so a vacancy exists
    /// exactly when `occupied < capacity`.
    fn reserve_for<A: Allocator + ?Sized>(&mut self, id: EntityId, alloc: &mut A) -> Result<(), AllocError> {
        let main = self.main_position(id);
        if self.slots[main].id.is_some() && self.occupied == self.slots.len() {
            self.rehash(alloc)?;
        }
        Ok(())
    }

    fn insert_reserved<A: Allocator + ?Sized>(
        &mut self,
        id: EntityId,
        value: V,
        alloc: &mut A,
    ) -> Result<(), AllocError> {
        let mut pending = self.place(id, value);
        while let Some((id, value)) = pending {
            self.rehash(alloc)?;
            pending = self.place(id, value);
        }
        self.len += 1;
        Ok(())
    }

    /// Put an entry into the table without growing it.
    ///
    /// Returns the entry that could not find a free slot, if any.
    fn place(&mut self, id: EntityId, value: V) -> Option<(EntityId, V)> {
        let main = self.main_position(id);

        let Some(resident) = self.slots[main].id else {
            self.slots[main] = Slot {
                id: Some(id),
                value: Some(value),
                next: None,
            };
            self.occupied += 1;
            return None;
        };

        let resident_main = self.main_position(resident);
        if resident_main != main {
            // The resident only borrowed this slot: unlink it from its own
            // chain, take the slot, then find it a new home.
            let mut prev = resident_main;
            while self.slots[prev].next != Some(main) {
                match self.slots[prev].next {
                    Some(next) => prev = next,
                    None => {
                        debug_assert!(false, "slot {main} missing from chain of {resident_main}");
                        break;
                    }
                }
            }
            self.slots[prev].next = self.slots[main].next;

            let evicted = std::mem::replace(
                &mut self.slots[main],
                Slot {
                    id: Some(id),
                    value: Some(value),
                    next: None,
                },
            );
            return match evicted.value {
                Some(evicted_value) => self.place(resident, evicted_value),
                // Tombstones are not worth relocating
                None => None,
            };
        }

        while let Some(free) = self.last_free {
            self.last_free = free.checked_sub(1);
            if self.slots[free].id.is_none() {
                self.slots[free] = Slot {
                    id: Some(id),
                    value: Some(value),
                    next: self.slots[main].next,
                };
                self.slots[main].next = Some(free);
                self.occupied += 1;
                return None;
            }
        }
        Some((id, value))
    }

    /// Double the table and reinsert every live entry. Tombstones are discarded.
    fn rehash<A: Allocator + ?Sized>(&mut self, alloc: &mut A) -> Result<(), AllocError> {
        let old_capacity = self.slots.len();
        let new_capacity = old_capacity * 2;
        alloc.request(Self::bytes_for(new_capacity))?;

        let old = std::mem::replace(self, Self::with_vacant_slots(new_capacity));
        for slot in old.slots {
            if let (Some(id), Some(value)) = (slot.id, slot.value) {
                let leftover = self.place(id, value);
                debug_assert!(leftover.is_none(), "rehash ran out of slots");
                self.len += 1;
            }
        }
        alloc.release(Self::bytes_for(old_capacity));

        debug!(
            "registry grew from {} to {} slots ({} live entries)",
            old_capacity, new_capacity, self.len
        );
        Ok(())
    }
}
