//! Hysteresis pair tracker
//!
//! A candidate pair whose squared distance lands between the inner radius
//! and the leave radius is neither clearly in nor clearly out. Instead of
//! reporting it, the engine *tracks* it: the pair keeps a reference on both
//! entities and a snapshot of their versions, and is re-judged at the start
//! of every tick until it crosses one of the two boundaries.
//!
//! A pair whose endpoint changed version or got dropped is discarded
//! silently. The change will put the endpoint into a moving bucket again,
//! so the pair is re-evaluated from scratch by the partitioning pass.

use crate::ecs::{EntityKey, Object};
use crate::foundation::math::distance_squared;
use crate::foundation::memory::{AllocError, Allocator};
use crate::core::config::EngineConfig;

use super::event::Event;

/// Bytes requested from the allocator for every tracked pair
pub const PAIR_BYTES: usize = std::mem::size_of::<TrackedPair>();

/// Where a squared distance falls relative to the two boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proximity {
    /// Strictly inside the interest radius
    Inside,
    /// Between the interest radius and the leave radius, both inclusive
    Boundary,
    /// Strictly beyond the leave radius
    Outside,
}

/// Squared inner and outer radii
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    inner: f32,
    outer: f32,
}

impl Thresholds {
    /// Build from squared radii
    pub fn new(inner_squared: f32, outer_squared: f32) -> Self {
        debug_assert!(inner_squared <= outer_squared);
        Self {
            inner: inner_squared,
            outer: outer_squared,
        }
    }

    /// Derive the thresholds of an engine configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.radius_squared(), config.leave_distance_squared())
    }

    /// Classify a squared distance
    #[inline]
    pub fn classify(&self, distance_squared: f32) -> Proximity {
        if distance_squared < self.inner {
            Proximity::Inside
        } else if distance_squared > self.outer {
            Proximity::Outside
        } else {
            Proximity::Boundary
        }
    }

    /// Classify the distance between two entities' current positions
    #[inline]
    pub fn between(&self, watcher: &Object, marker: &Object) -> Proximity {
        self.classify(distance_squared(watcher.position(), marker.position()))
    }
}

/// A watcher/marker pair waiting in the boundary zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedPair {
    /// Watching entity
    pub watcher: EntityKey,
    /// Observed entity
    pub marker: EntityKey,
    /// Watcher version when tracking started
    pub watcher_version: u32,
    /// Marker version when tracking started
    pub marker_version: u32,
}

/// Outcome of re-judging a tracked pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Still ambiguous, keep tracking
    Keep,
    /// Crossed a boundary: report and stop tracking
    Resolve(Event),
    /// Snapshot no longer describes the endpoints: stop tracking silently
    Stale,
}

impl TrackedPair {
    /// Start tracking, snapshotting both versions
    pub fn new(watcher_key: EntityKey, watcher: &Object, marker_key: EntityKey, marker: &Object) -> Self {
        Self {
            watcher: watcher_key,
            marker: marker_key,
            watcher_version: watcher.version(),
            marker_version: marker.version(),
        }
    }

    /// Re-judge the pair against the endpoints' current state
    pub fn judge(&self, watcher: &Object, marker: &Object, thresholds: &Thresholds) -> Verdict {
        if watcher.version() != self.watcher_version
            || marker.version() != self.marker_version
            || watcher.is_dropped()
            || marker.is_dropped()
        {
            return Verdict::Stale;
        }
        match thresholds.between(watcher, marker) {
            Proximity::Inside => Verdict::Resolve(Event::Move),
            Proximity::Outside => Verdict::Resolve(Event::Leave),
            Proximity::Boundary => Verdict::Keep,
        }
    }
}

/// Set of pairs currently tracked in the boundary zone
#[derive(Debug, Default)]
pub struct PairTracker {
    pairs: Vec<TrackedPair>,
}

impl PairTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking every pair in `pairs`, accounting for each with `alloc`.
    ///
    /// Either every pair is tracked, or a request is refused, the bytes
    /// already granted are handed back and nothing is tracked. The caller
    /// is responsible for taking a reference on both endpoints.
    pub fn track_all<A: Allocator + ?Sized>(
        &mut self,
        pairs: Vec<TrackedPair>,
        alloc: &mut A,
    ) -> Result<(), AllocError> {
        for granted in 0..pairs.len() {
            if let Err(err) = alloc.request(PAIR_BYTES) {
                (0..granted).for_each(|_| alloc.release(PAIR_BYTES));
                return Err(err);
            }
        }
        self.pairs.extend(pairs);
        Ok(())
    }

    /// Keep only the pairs for which `keep` returns `true`.
    ///
    /// `keep` runs exactly once per pair, in tracking order; a pair it
    /// rejects must have its references and memory released by `keep`.
    pub fn retain(&mut self, keep: impl FnMut(&TrackedPair) -> bool) {
        self.pairs.retain(keep);
    }

    /// Remove every pair, handing each one to `release`
    pub fn drain(&mut self, release: impl FnMut(TrackedPair)) {
        self.pairs.drain(..).for_each(release);
    }

    /// Number of tracked pairs
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Tracked pairs in tracking order
    pub fn iter(&self) -> impl Iterator<Item = &TrackedPair> {
        self.pairs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::Mode;
    use crate::foundation::math::Vec3;
    use crate::foundation::memory::{BudgetAllocator, CountingAllocator};
    use slotmap::SlotMap;

    fn placed(id: u32, roles: Mode, at: Vec3) -> Object {
        let mut obj = Object::new(id);
        let changed = obj.set_roles(roles);
        obj.move_to(at, changed, 25.0);
        obj
    }

    #[test]
    fn test_classify_boundaries() {
        let thresholds = Thresholds::from_config(&EngineConfig::default());
        assert_eq!(thresholds.classify(99.9), Proximity::Inside);
        assert_eq!(thresholds.classify(100.0), Proximity::Boundary);
        assert_eq!(thresholds.classify(250.0), Proximity::Boundary);
        assert_eq!(thresholds.classify(400.0), Proximity::Boundary);
        assert_eq!(thresholds.classify(400.1), Proximity::Outside);
    }

    #[test]
    fn test_judge_follows_distance() {
        let thresholds = Thresholds::from_config(&EngineConfig::default());
        let mut keys: SlotMap<EntityKey, ()> = SlotMap::with_key();
        let (wk, mk) = (keys.insert(()), keys.insert(()));

        let watcher = placed(1, Mode::WATCHER, Vec3::zeros());
        let mut marker = placed(2, Mode::MARKER, Vec3::new(15.0, 0.0, 0.0));
        let pair = TrackedPair::new(wk, &watcher, mk, &marker);
        assert_eq!(pair.judge(&watcher, &marker, &thresholds), Verdict::Keep);

        // Jitter keeps the version, so the pair stays valid
        marker.move_to(Vec3::new(9.0, 0.0, 0.0), false, 100.0);
        assert_eq!(pair.judge(&watcher, &marker, &thresholds), Verdict::Resolve(Event::Move));

        marker.move_to(Vec3::new(21.0, 0.0, 0.0), false, 1000.0);
        assert_eq!(pair.judge(&watcher, &marker, &thresholds), Verdict::Resolve(Event::Leave));
    }

    #[test]
    fn test_judge_detects_stale_snapshot() {
        let thresholds = Thresholds::from_config(&EngineConfig::default());
        let mut keys: SlotMap<EntityKey, ()> = SlotMap::with_key();
        let (wk, mk) = (keys.insert(()), keys.insert(()));

        let mut watcher = placed(1, Mode::WATCHER, Vec3::zeros());
        let marker = placed(2, Mode::MARKER, Vec3::new(15.0, 0.0, 0.0));
        let pair = TrackedPair::new(wk, &watcher, mk, &marker);

        watcher.move_to(Vec3::new(14.0, 0.0, 0.0), false, 25.0);
        assert_eq!(pair.judge(&watcher, &marker, &thresholds), Verdict::Stale);

        let mut dropped_marker = marker.clone();
        let fresh_watcher = placed(1, Mode::WATCHER, Vec3::zeros());
        let pair = TrackedPair::new(wk, &fresh_watcher, mk, &dropped_marker);
        dropped_marker.mark_dropped();
        assert_eq!(pair.judge(&fresh_watcher, &dropped_marker, &thresholds), Verdict::Stale);
    }

    #[test]
    fn test_track_all_is_all_or_nothing() {
        let mut keys: SlotMap<EntityKey, ()> = SlotMap::with_key();
        let (wk, mk) = (keys.insert(()), keys.insert(()));
        let watcher = placed(1, Mode::WATCHER, Vec3::zeros());
        let marker = placed(2, Mode::MARKER, Vec3::new(15.0, 0.0, 0.0));
        let pair = TrackedPair::new(wk, &watcher, mk, &marker);

        let mut tracker = PairTracker::new();
        let mut budget = BudgetAllocator::new(PAIR_BYTES * 2);
        assert!(tracker.track_all(vec![pair; 3], &mut budget).is_err());
        assert!(tracker.is_empty());
        assert_eq!(budget.stats().live_bytes, 0);

        let mut counter = CountingAllocator::new();
        tracker.track_all(vec![pair; 3], &mut counter).unwrap();
        assert_eq!(tracker.len(), 3);
        assert_eq!(counter.stats().live_blocks, 3);
        assert_eq!(counter.stats().live_bytes, PAIR_BYTES * 3);
    }
}
