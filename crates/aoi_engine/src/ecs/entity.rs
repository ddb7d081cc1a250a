//! Entity implementation
//!
//! An entity record is shared between the registry (one implicit reference
//! while the entity is not dropped) and every tracked pair naming it. The
//! record lives in a generational arena; holders keep an [`EntityKey`] and
//! the reference count decides when the slot is freed.

use bitflags::bitflags;
use slotmap::new_key_type;

use crate::foundation::math::{distance_squared, Vec3};

/// Caller-chosen entity identifier
pub type EntityId = u32;

new_key_type! {
    /// Stable arena handle to an entity record
    pub struct EntityKey;
}

bitflags! {
    /// Role and transient state of an entity
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Mode: u8 {
        /// Notified about nearby markers
        const WATCHER = 1 << 0;
        /// Observable by watchers
        const MARKER = 1 << 1;
        /// Significant change since the last partitioning pass
        const MOVE = 1 << 2;
        /// Dropped by its owner, awaiting release by tracked pairs
        const DROP = 1 << 3;

        /// Both roles
        const ROLES = Self::WATCHER.bits() | Self::MARKER.bits();
    }
}

/// Entity record
#[derive(Debug, Clone)]
pub struct Object {
    id: EntityId,
    refs: u32,
    version: u32,
    mode: Mode,
    last: Vec3,
    position: Vec3,
}

impl Object {
    /// Fresh record: one reference (the registry's), no roles, version 0
    pub(crate) fn new(id: EntityId) -> Self {
        Self {
            id,
            refs: 1,
            version: 0,
            mode: Mode::empty(),
            last: Vec3::zeros(),
            position: Vec3::zeros(),
        }
    }

    /// Identifier supplied by the host
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Outstanding references (registry hold plus tracked pairs)
    pub fn ref_count(&self) -> u32 {
        self.refs
    }

    /// Change counter, bumped on role change or significant movement
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Current flag set
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Latest reported position
    pub fn position(&self) -> &Vec3 {
        &self.position
    }

    /// Position at the last significant change
    pub fn last_position(&self) -> &Vec3 {
        &self.last
    }

    /// Whether the entity acts as a watcher
    pub fn is_watcher(&self) -> bool {
        self.mode.contains(Mode::WATCHER)
    }

    /// Whether the entity acts as a marker
    pub fn is_marker(&self) -> bool {
        self.mode.contains(Mode::MARKER)
    }

    /// Whether the owner has dropped the entity
    pub fn is_dropped(&self) -> bool {
        self.mode.contains(Mode::DROP)
    }

    /// Whether a significant change is waiting for the next partitioning pass
    pub fn has_moved(&self) -> bool {
        self.mode.contains(Mode::MOVE)
    }

    pub(crate) fn grab(&mut self) {
        self.refs += 1;
    }

    /// Drop one reference; returns `true` once nobody holds the entity
    pub(crate) fn release(&mut self) -> bool {
        debug_assert!(self.refs > 0, "entity {} released too often", self.id);
        self.refs = self.refs.saturating_sub(1);
        self.refs == 0
    }

    /// Enter the dropped state. Roles are cleared so the entity stops
    /// taking part in partitioning while pairs still hold it.
    ///
    /// Returns `false` if the entity was already dropped.
    pub(crate) fn mark_dropped(&mut self) -> bool {
        if self.is_dropped() {
            return false;
        }
        self.mode = Mode::DROP;
        true
    }

    /// Leave the dropped state; returns `true` if the entity was dropped
    pub(crate) fn recover(&mut self) -> bool {
        if !self.is_dropped() {
            return false;
        }
        self.mode.remove(Mode::DROP);
        true
    }

    /// Replace role intent. Returns `true` if anything changed; a blank
    /// entity (no role and no pending motion) always counts as changed.
    pub(crate) fn set_roles(&mut self, roles: Mode) -> bool {
        let roles = roles & Mode::ROLES;
        let blank = self.mode.is_empty();
        let current = self.mode & Mode::ROLES;
        self.mode.remove(Mode::ROLES);
        self.mode.insert(roles);
        blank || current != roles
    }

    /// Record a new position. The last-significant position, the motion
    /// flag and the version only change when `changed` is set or the
    /// entity moved at least `sqrt(near_distance_squared)`.
    ///
    /// Returns `true` if the update was significant.
    pub(crate) fn move_to(&mut self, position: Vec3, changed: bool, near_distance_squared: f32) -> bool {
        self.position = position;
        if !changed && distance_squared(&position, &self.last) < near_distance_squared {
            return false;
        }
        self.last = position;
        self.mode.insert(Mode::MOVE);
        self.version = self.version.wrapping_add(1);
        true
    }

    /// Consume the motion flag; returns whether it was set
    pub(crate) fn take_moved(&mut self) -> bool {
        let moved = self.has_moved();
        self.mode.remove(Mode::MOVE);
        moved
    }

    /// Put back a motion flag consumed by an aborted tick
    pub(crate) fn restore_moved(&mut self) {
        self.mode.insert(Mode::MOVE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_object_is_blank() {
        let obj = Object::new(7);
        assert_eq!(obj.id(), 7);
        assert_eq!(obj.ref_count(), 1);
        assert_eq!(obj.version(), 0);
        assert!(obj.mode().is_empty());
    }

    #[test]
    fn test_first_role_assignment_counts_as_change() {
        let mut obj = Object::new(1);
        assert!(obj.set_roles(Mode::WATCHER));
        assert!(!obj.set_roles(Mode::WATCHER));
        assert!(obj.set_roles(Mode::WATCHER | Mode::MARKER));
        assert!(obj.set_roles(Mode::MARKER));
        assert!(obj.is_marker() && !obj.is_watcher());
    }

    #[test]
    fn test_roleless_entity_changes_once_per_tick() {
        let mut obj = Object::new(4);
        let changed = obj.set_roles(Mode::empty());
        assert!(changed);
        assert!(obj.move_to(Vec3::zeros(), changed, 25.0));
        assert_eq!(obj.version(), 1);

        // Pending motion means the entity is no longer blank
        let changed = obj.set_roles(Mode::empty());
        assert!(!changed);
        assert!(!obj.move_to(Vec3::new(1.0, 0.0, 0.0), changed, 25.0));
        assert_eq!(obj.version(), 1);

        // Once the motion is consumed it is blank again
        assert!(obj.take_moved());
        assert!(obj.set_roles(Mode::empty()));
    }

    #[test]
    fn test_restore_moved() {
        let mut obj = Object::new(5);
        obj.set_roles(Mode::WATCHER);
        obj.move_to(Vec3::zeros(), true, 25.0);
        assert!(obj.take_moved());
        obj.restore_moved();
        assert!(obj.has_moved());
        assert_eq!(obj.version(), 1);
    }

    #[test]
    fn test_set_roles_preserves_transient_flags() {
        let mut obj = Object::new(1);
        obj.set_roles(Mode::WATCHER);
        obj.move_to(Vec3::zeros(), true, 25.0);
        obj.set_roles(Mode::MARKER | Mode::DROP);
        assert!(obj.has_moved());
        assert!(!obj.is_dropped());
    }

    #[test]
    fn test_micro_movement_is_filtered() {
        let mut obj = Object::new(1);
        obj.set_roles(Mode::WATCHER);
        assert!(obj.move_to(Vec3::new(0.0, 0.0, 0.0), true, 25.0));
        assert!(obj.take_moved());
        assert_eq!(obj.version(), 1);

        // 4² = 16 < 25: jitter
        assert!(!obj.move_to(Vec3::new(4.0, 0.0, 0.0), false, 25.0));
        assert_eq!(obj.position(), &Vec3::new(4.0, 0.0, 0.0));
        assert_eq!(obj.last_position(), &Vec3::zeros());
        assert!(!obj.has_moved());
        assert_eq!(obj.version(), 1);

        // 5² = 25 reaches the threshold
        assert!(obj.move_to(Vec3::new(5.0, 0.0, 0.0), false, 25.0));
        assert_eq!(obj.last_position(), &Vec3::new(5.0, 0.0, 0.0));
        assert!(obj.has_moved());
        assert_eq!(obj.version(), 2);
    }

    #[test]
    fn test_drop_and_recover() {
        let mut obj = Object::new(3);
        obj.set_roles(Mode::ROLES);
        assert!(obj.mark_dropped());
        assert!(!obj.mark_dropped());
        assert!(obj.is_dropped());
        assert!(!obj.is_watcher() && !obj.is_marker());

        assert!(obj.recover());
        assert!(!obj.recover());
        assert!(obj.mode().is_empty());
    }

    #[test]
    fn test_reference_counting() {
        let mut obj = Object::new(9);
        obj.grab();
        assert_eq!(obj.ref_count(), 2);
        assert!(!obj.release());
        assert!(obj.release());
    }
}
