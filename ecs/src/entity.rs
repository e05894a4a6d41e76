use std::fmt;

/// A runtime entity identifier with spawn-tick tracking.
///
/// - **index**: slot index in the [`EntityAllocator`]
/// - **spawn_tick**: allocator tick when the slot was handed out. If a slot
///   is reused the new spawn_tick differs, so stale handles never compare
///   equal to the new occupant.
///
/// [`EntityId::INVALID`] is the null reference. It is never returned by an
/// allocator and is never alive.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    index: u32,
    spawn_tick: u64,
}

impl EntityId {
    /// The null entity reference.
    pub const INVALID: EntityId = EntityId {
        index: u32::MAX,
        spawn_tick: u64::MAX,
    };

    pub(crate) fn new(index: u32, spawn_tick: u64) -> Self {
        Self { index, spawn_tick }
    }

    /// Returns the slot index of this entity.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Returns the spawn tick of this entity.
    pub fn spawn_tick(&self) -> u64 {
        self.spawn_tick
    }

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "EntityId({}@{})", self.index, self.spawn_tick)
        } else {
            f.write_str("EntityId(INVALID)")
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Source of fresh entity identifiers.
///
/// Prefab instantiation asks the factory for one id per entity alias and
/// hands ids back when an instance (or a single entity) is destroyed.
pub trait EntityFactory {
    /// Returns an id that is not currently alive.
    fn create_entity_id(&mut self) -> EntityId;

    /// Releases an id. Returns `false` if it was not alive.
    fn release_entity_id(&mut self, id: EntityId) -> bool;

    fn is_alive(&self, id: EntityId) -> bool;
}

/// Allocates and recycles entity IDs with spawn-tick tracking.
///
/// When an entity is released its slot is pushed onto a free list. The next
/// allocation reuses the slot with a new spawn tick, invalidating any old
/// handles that still point at it.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    /// Spawn tick for each slot. Index = entity index.
    spawn_ticks: Vec<u64>,
    alive: Vec<bool>,
    /// Free list of recyclable indices (LIFO stack).
    free_list: Vec<u32>,
    count: u32,
    tick: u64,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new entity, reusing a recycled slot if available.
    ///
    /// `tick` becomes the entity's spawn tick. A reused slot never goes back
    /// below the tick its release left behind, so the spawn tick is the later
    /// of the two.
    pub fn allocate(&mut self, tick: u64) -> EntityId {
        self.count += 1;

        if let Some(index) = self.free_list.pop() {
            let idx = index as usize;
            let spawn_tick = tick.max(self.spawn_ticks[idx]);
            self.alive[idx] = true;
            self.spawn_ticks[idx] = spawn_tick;
            EntityId::new(index, spawn_tick)
        } else {
            let index = self.spawn_ticks.len() as u32;
            self.spawn_ticks.push(tick);
            self.alive.push(true);
            EntityId::new(index, tick)
        }
    }

    /// Deallocates an entity. Returns false if already dead or spawn_tick mismatch.
    pub fn deallocate(&mut self, entity: EntityId) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let idx = entity.index() as usize;
        self.alive[idx] = false;
        // Old handles stay dead even if the slot is reused with the same tick.
        self.spawn_ticks[idx] = self.spawn_ticks[idx].wrapping_add(1);
        self.free_list.push(entity.index());
        self.count -= 1;
        true
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        let idx = entity.index() as usize;
        idx < self.alive.len() && self.alive[idx] && self.spawn_ticks[idx] == entity.spawn_tick()
    }

    /// Returns the number of alive entities.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Iterates over all currently alive entity IDs.
    pub fn iter_alive(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(idx, _)| EntityId::new(idx as u32, self.spawn_ticks[idx]))
    }
}

impl EntityFactory for EntityAllocator {
    fn create_entity_id(&mut self) -> EntityId {
        self.tick += 1;
        self.allocate(self.tick)
    }

    fn release_entity_id(&mut self, id: EntityId) -> bool {
        self.deallocate(id)
    }

    fn is_alive(&self, id: EntityId) -> bool {
        EntityAllocator::is_alive(self, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_sequential() {
        let mut alloc = EntityAllocator::new();
        let e0 = alloc.allocate(100);
        let e1 = alloc.allocate(100);

        assert_eq!(e0.index(), 0);
        assert_eq!(e1.index(), 1);
        assert_eq!(e0.spawn_tick(), 100);
    }

    #[test]
    fn deallocate_stale_entity() {
        let mut alloc = EntityAllocator::new();
        let entity = alloc.allocate(1);
        assert!(alloc.deallocate(entity));
        assert!(!alloc.is_alive(entity));
        // Deallocating again returns false
        assert!(!alloc.deallocate(entity));
    }

    #[test]
    fn stale_entity_not_alive_after_reuse() {
        let mut alloc = EntityAllocator::new();
        let old = alloc.allocate(10);
        alloc.deallocate(old);
        let new = alloc.allocate(10);

        assert_eq!(new.index(), old.index());
        assert_ne!(new, old);
        assert!(!alloc.is_alive(old));
        assert!(alloc.is_alive(new));
        assert!(!alloc.deallocate(old));
        assert!(alloc.is_alive(new));
    }

    #[test]
    fn reuse_with_older_tick_keeps_slot_tick() {
        let mut alloc = EntityAllocator::new();
        let old = alloc.allocate(50);
        alloc.deallocate(old);
        let new = alloc.allocate(3);
        assert_eq!(new.spawn_tick(), 51);
        assert!(!alloc.is_alive(old));
        assert!(alloc.is_alive(new));
    }

    #[test]
    fn factory_ids_are_unique_across_reuse() {
        let mut factory = EntityAllocator::new();
        let a = factory.create_entity_id();
        assert!(factory.release_entity_id(a));
        let b = factory.create_entity_id();
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(EntityFactory::is_alive(&factory, b));
        assert!(!EntityFactory::is_alive(&factory, a));
    }

    #[test]
    fn invalid_is_never_alive() {
        let mut alloc = EntityAllocator::new();
        alloc.allocate(1);
        assert!(!alloc.is_alive(EntityId::INVALID));
        assert!(!alloc.deallocate(EntityId::INVALID));
        assert!(!EntityId::default().is_valid());
    }

    #[test]
    fn count_and_iter_alive() {
        let mut alloc = EntityAllocator::new();
        let entities: Vec<_> = (0..4).map(|_| alloc.create_entity_id()).collect();
        alloc.deallocate(entities[1]);

        assert_eq!(alloc.count(), 3);
        let alive: Vec<_> = alloc.iter_alive().collect();
        assert_eq!(alive, vec![entities[0], entities[2], entities[3]]);
    }

    #[test]
    fn debug_format() {
        assert_eq!(format!("{:?}", EntityId::new(42, 100)), "EntityId(42@100)");
        assert_eq!(EntityId::INVALID.to_string(), "EntityId(INVALID)");
    }
}
