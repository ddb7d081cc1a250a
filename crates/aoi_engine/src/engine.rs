//! Interest engine
//!
//! The engine owns every entity record, the registry, the partition sets
//! and the pair tracker of one scene. Hosts feed it entity updates between
//! ticks and call [`Engine::tick`] once per simulation step.
//!
//! A tick runs in three phases:
//!
//! 1. **Flush**: re-judge every tracked pair and report those that left the
//!    boundary zone.
//! 2. **Partition**: scan the registry and sort each entity into the static
//!    or moving bucket of every role it holds.
//! 3. **Generate**: pair watchers with markers across
//!    `static × moving`, `moving × static` and `moving × moving`. The
//!    `static × static` product is skipped because nothing in it changed
//!    since the previous tick, so the cost follows the number of entities
//!    that actually moved.

use log::{debug, trace, warn};
use slotmap::SlotMap;
use thiserror::Error;

use crate::core::config::{ConfigError, EngineConfig};
use crate::ecs::{EntityId, EntityKey, Object, Partitions, Registry};
use crate::foundation::math::Vec3;
use crate::foundation::memory::{AllocError, Allocator, SystemAllocator};
use crate::interest::pair::PAIR_BYTES;
use crate::interest::{Directives, Event, Notification, PairTracker, Proximity, Thresholds, TrackedPair, Verdict};

/// Bytes requested from the allocator for every entity record
const OBJECT_BYTES: usize = std::mem::size_of::<Object>();

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// The injected allocator refused a request
    #[error("Allocation failed: {0}")]
    Allocation(#[from] AllocError),

    /// The configuration was rejected
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Entity arena plus the id index into it
#[derive(Debug)]
struct World {
    objects: SlotMap<EntityKey, Object>,
    registry: Registry<EntityKey>,
}

impl World {
    /// Find the record for `id`, creating a blank one if needed
    fn query<A: Allocator + ?Sized>(&mut self, id: EntityId, alloc: &mut A) -> Result<EntityKey, AllocError> {
        let objects = &mut self.objects;
        self.registry.query_or_try_insert_with(id, alloc, |alloc| {
            alloc.request(OBJECT_BYTES)?;
            trace!("entity {id} created");
            Ok(objects.insert(Object::new(id)))
        })
    }

    /// Drop one reference on `key`, destroying the entity at zero
    fn release<A: Allocator + ?Sized>(&mut self, key: EntityKey, alloc: &mut A) {
        let Some(obj) = self.objects.get_mut(key) else {
            return;
        };
        if !obj.release() {
            return;
        }
        let id = obj.id();
        self.objects.remove(key);
        if self.registry.get(id) == Some(key) {
            self.registry.remove(id);
        }
        alloc.release(OBJECT_BYTES);
        trace!("entity {id} destroyed");
    }
}

/// Area-of-interest engine for one scene
///
/// The allocator is a per-instance dependency; use
/// [`Engine::with_allocator`] to plug in budgeting or instrumentation.
///
/// # Example
///
/// ```
/// use aoi_engine::{Engine, Event};
///
/// let mut engine = Engine::new()?;
/// engine.update(1, "w", [0.0, 0.0, 0.0])?;
/// engine.update(2, "m", [3.0, 4.0, 0.0])?;
///
/// let mut seen = Vec::new();
/// engine.tick(|watcher, marker, event| seen.push((watcher, marker, event)))?;
/// assert_eq!(seen, vec![(1, 2, Event::Move)]);
/// # Ok::<(), aoi_engine::EngineError>(())
/// ```
#[derive(Debug)]
pub struct Engine<A: Allocator = SystemAllocator> {
    config: EngineConfig,
    thresholds: Thresholds,
    near_distance_squared: f32,
    world: World,
    sets: Partitions,
    hot: PairTracker,
    alloc: A,
    released: bool,
}

impl Engine<SystemAllocator> {
    /// Create an engine with the default configuration and the system allocator
    pub fn new() -> Result<Self, EngineError> {
        Self::with_allocator(SystemAllocator)
    }
}

impl<A: Allocator> Engine<A> {
    /// Create an engine with the default configuration and a custom allocator
    pub fn with_allocator(alloc: A) -> Result<Self, EngineError> {
        Self::with_config(EngineConfig::default(), alloc)
    }

    /// Create an engine from a configuration and an allocator
    pub fn with_config(config: EngineConfig, mut alloc: A) -> Result<Self, EngineError> {
        config.validate()?;

        let registry = Registry::new(config.registry_capacity, &mut alloc)?;
        let sets = match Partitions::new(config.set_capacity, &mut alloc) {
            Ok(sets) => sets,
            Err(err) => {
                alloc.release(registry.table_bytes());
                return Err(err.into());
            }
        };

        debug!(
            "AOI engine created (radius {}, leave scale {}, near scale {})",
            config.radius, config.leave_scale, config.near_scale
        );

        Ok(Self {
            thresholds: Thresholds::from_config(&config),
            near_distance_squared: config.near_distance_squared(),
            config,
            world: World {
                objects: SlotMap::with_key(),
                registry,
            },
            sets,
            hot: PairTracker::new(),
            alloc,
            released: false,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The injected allocator
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Mutable access to the injected allocator, e.g. to adjust a budget
    pub fn allocator_mut(&mut self) -> &mut A {
        &mut self.alloc
    }

    /// Update an entity from a directive string (`w`, `m`, `d`)
    ///
    /// See [`Engine::update_with`].
    pub fn update(&mut self, id: EntityId, mode: &str, position: impl Into<Vec3>) -> Result<(), EngineError> {
        self.update_with(id, Directives::parse(mode), position)
    }

    /// Update an entity's roles and position
    ///
    /// Unknown ids are created on the fly. Role bits replace the previous
    /// roles. [`Directives::DROP`] releases the entity and ignores the rest
    /// of the call; a later update without it brings the entity back.
    pub fn update_with(
        &mut self,
        id: EntityId,
        directives: Directives,
        position: impl Into<Vec3>,
    ) -> Result<(), EngineError> {
        let key = self.world.query(id, &mut self.alloc)?;
        let near_distance_squared = self.near_distance_squared;
        let Some(obj) = self.world.objects.get_mut(key) else {
            return Ok(());
        };

        if directives.contains(Directives::DROP) {
            if obj.mark_dropped() {
                trace!("entity {id} dropped");
                self.world.release(key, &mut self.alloc);
            }
            return Ok(());
        }

        if obj.recover() {
            trace!("entity {id} recovered");
            obj.grab();
        }

        let changed = obj.set_roles(directives.roles());
        if obj.move_to(position.into(), changed, near_distance_squared) {
            trace!("entity {id} changed (version {})", obj.version());
        }
        Ok(())
    }

    /// Advance one tick, reporting transitions to `callback`
    ///
    /// `callback(watcher, marker, event)` runs synchronously for every
    /// pair that entered ([`Event::Move`]) or left ([`Event::Leave`]) the
    /// interest area. The engine is mutably borrowed for the whole call, so
    /// the callback cannot reach back into it.
    ///
    /// If the allocator refuses a request while partitioning or
    /// generating, no candidate of this tick is reported or tracked and
    /// every moving entity keeps its motion flag, so the next successful
    /// tick evaluates them all. Events from the flush phase are delivered
    /// regardless.
    pub fn tick<F>(&mut self, mut callback: F) -> Result<(), EngineError>
    where
        F: FnMut(EntityId, EntityId, Event),
    {
        let flushed = self.flush_pairs(&mut callback);
        self.sets.clear();
        let generated = match self.partition().and_then(|()| self.generate_pairs(&mut callback)) {
            Ok(generated) => generated,
            Err(err) => {
                self.restore_motion();
                warn!("tick aborted, motion kept for the next tick: {err}");
                return Err(err.into());
            }
        };

        debug!(
            "tick: {} flushed, {} generated, {} tracked, sets ws={} wm={} ms={} mm={}",
            flushed,
            generated,
            self.hot.len(),
            self.sets.watcher_static.len(),
            self.sets.watcher_move.len(),
            self.sets.marker_static.len(),
            self.sets.marker_move.len(),
        );
        Ok(())
    }

    /// Advance one tick and return the notifications instead of calling back
    pub fn tick_collect(&mut self) -> Result<Vec<Notification>, EngineError> {
        let mut out = Vec::new();
        self.tick(|watcher, marker, event| out.push(Notification::new(watcher, marker, event)))?;
        Ok(out)
    }

    /// Re-judge tracked pairs; returns the number of events emitted
    fn flush_pairs<F>(&mut self, callback: &mut F) -> usize
    where
        F: FnMut(EntityId, EntityId, Event),
    {
        if self.hot.is_empty() {
            return 0;
        }
        let thresholds = self.thresholds;
        let world = &mut self.world;
        let alloc = &mut self.alloc;
        let mut emitted = 0;

        self.hot.retain(|pair| {
            let verdict = match (world.objects.get(pair.watcher), world.objects.get(pair.marker)) {
                (Some(watcher), Some(marker)) => {
                    let verdict = pair.judge(watcher, marker, &thresholds);
                    if let Verdict::Resolve(event) = verdict {
                        callback(watcher.id(), marker.id(), event);
                        emitted += 1;
                    }
                    verdict
                }
                _ => Verdict::Stale,
            };
            if verdict == Verdict::Keep {
                return true;
            }
            world.release(pair.watcher, alloc);
            world.release(pair.marker, alloc);
            alloc.release(PAIR_BYTES);
            false
        });
        emitted
    }

    /// Rebuild the four partition sets from a full registry scan
    fn partition(&mut self) -> Result<(), AllocError> {
        let World { objects, registry } = &mut self.world;
        for key in registry.values() {
            let Some(obj) = objects.get_mut(key) else {
                continue;
            };
            let (is_watcher, is_marker) = (obj.is_watcher(), obj.is_marker());
            if !is_watcher && !is_marker {
                continue;
            }
            // Both roles see the same motion flag; it is consumed once placed
            self.sets
                .classify(key, is_watcher, is_marker, obj.has_moved(), &mut self.alloc)?;
            obj.take_moved();
        }
        Ok(())
    }

    /// Put the motion flag back on every entity of the moving sets
    fn restore_motion(&mut self) {
        let objects = &mut self.world.objects;
        let moving = self.sets.watcher_move.as_slice().iter().chain(self.sets.marker_move.as_slice());
        for &key in moving {
            if let Some(obj) = objects.get_mut(key) {
                obj.restore_moved();
            }
        }
    }

    /// Evaluate candidate pairs; returns the number of events emitted
    ///
    /// Boundary pairs are tracked as one batch before any event is
    /// reported, so a refused request leaves nothing half done.
    fn generate_pairs<F>(&mut self, callback: &mut F) -> Result<usize, AllocError>
    where
        F: FnMut(EntityId, EntityId, Event),
    {
        let Partitions {
            watcher_static,
            watcher_move,
            marker_static,
            marker_move,
        } = &self.sets;
        let mut events = Vec::new();
        let mut boundary = Vec::new();

        for (watchers, markers) in [
            (watcher_static, marker_move),
            (watcher_move, marker_static),
            (watcher_move, marker_move),
        ] {
            for &watcher_key in watchers.as_slice() {
                for &marker_key in markers.as_slice() {
                    if watcher_key == marker_key {
                        continue;
                    }
                    let (Some(watcher), Some(marker)) = (
                        self.world.objects.get(watcher_key),
                        self.world.objects.get(marker_key),
                    ) else {
                        continue;
                    };

                    match self.thresholds.between(watcher, marker) {
                        Proximity::Inside => events.push((watcher.id(), marker.id(), Event::Move)),
                        Proximity::Outside => events.push((watcher.id(), marker.id(), Event::Leave)),
                        Proximity::Boundary => {
                            boundary.push(TrackedPair::new(watcher_key, watcher, marker_key, marker));
                        }
                    }
                }
            }
        }

        let grabs: Vec<EntityKey> = boundary.iter().flat_map(|pair| [pair.watcher, pair.marker]).collect();
        self.hot.track_all(boundary, &mut self.alloc)?;
        for key in grabs {
            if let Some(obj) = self.world.objects.get_mut(key) {
                obj.grab();
            }
        }

        for &(watcher, marker, event) in &events {
            callback(watcher, marker, event);
        }
        Ok(events.len())
    }

    /// Look up an entity without creating it
    pub fn entity(&self, id: EntityId) -> Option<&Object> {
        self.world
            .registry
            .get(id)
            .and_then(|key| self.world.objects.get(key))
    }

    /// Outstanding references on an entity, `None` once it is destroyed
    pub fn ref_count(&self, id: EntityId) -> Option<u32> {
        self.entity(id).map(Object::ref_count)
    }

    /// Number of live entity records, including dropped ones still held by pairs
    pub fn entity_count(&self) -> usize {
        self.world.objects.len()
    }

    /// Number of pairs waiting in the boundary zone
    pub fn tracked_pairs(&self) -> usize {
        self.hot.len()
    }

    /// Whether the given watcher/marker pair is currently tracked
    pub fn is_tracked(&self, watcher: EntityId, marker: EntityId) -> bool {
        let objects = &self.world.objects;
        self.hot.iter().any(|pair| {
            objects.get(pair.watcher).map(Object::id) == Some(watcher)
                && objects.get(pair.marker).map(Object::id) == Some(marker)
        })
    }

    /// Slot count of the entity registry
    pub fn registry_capacity(&self) -> usize {
        self.world.registry.capacity()
    }

    /// Tear the engine down, returning the allocator once every record has
    /// been given back to it
    pub fn release(mut self) -> A
    where
        A: Default,
    {
        self.release_all();
        std::mem::take(&mut self.alloc)
    }

    /// Give every outstanding request back to the allocator
    fn release_all(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        let alloc = &mut self.alloc;
        self.hot.drain(|_| alloc.release(PAIR_BYTES));
        for _ in self.world.objects.drain() {
            alloc.release(OBJECT_BYTES);
        }
        self.sets.release_storage(alloc);
        alloc.release(self.world.registry.table_bytes());
    }
}

impl<A: Allocator> Drop for Engine<A> {
    fn drop(&mut self) {
        self.release_all();
    }
}
