//! Memory management utilities
//!
//! The engine never decides *how* memory is obtained. Every record it keeps
//! (entities, tracked pairs, registry tables, partition set growth) is first
//! requested from an [`Allocator`] owned by the engine instance and released
//! back to it when discarded. Hosts substitute pooling, budgeting or
//! instrumentation by handing a different allocator to
//! [`Engine::with_allocator`](crate::Engine::with_allocator).

use thiserror::Error;

/// Allocation errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The allocator refused the request
    #[error("allocation of {requested} bytes refused ({in_use} bytes in use, limit {limit})")]
    OutOfMemory {
        /// Bytes asked for by the failed request
        requested: usize,
        /// Bytes outstanding at the time of the request
        in_use: usize,
        /// Upper bound enforced by the allocator
        limit: usize,
    },
}

/// Allocation capability injected into an engine instance
///
/// `request` must be paired with exactly one `release` of the same size.
pub trait Allocator {
    /// Reserve `bytes` bytes
    fn request(&mut self, bytes: usize) -> Result<(), AllocError>;

    /// Give back `bytes` bytes previously obtained through `request`
    fn release(&mut self, bytes: usize);
}

impl<A: Allocator + ?Sized> Allocator for &mut A {
    fn request(&mut self, bytes: usize) -> Result<(), AllocError> {
        (**self).request(bytes)
    }

    fn release(&mut self, bytes: usize) {
        (**self).release(bytes);
    }
}

impl<A: Allocator + ?Sized> Allocator for Box<A> {
    fn request(&mut self, bytes: usize) -> Result<(), AllocError> {
        (**self).request(bytes)
    }

    fn release(&mut self, bytes: usize) {
        (**self).release(bytes);
    }
}

/// Default allocator: defers to the global heap and never refuses
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    #[inline]
    fn request(&mut self, _bytes: usize) -> Result<(), AllocError> {
        Ok(())
    }

    #[inline]
    fn release(&mut self, _bytes: usize) {}
}

/// Snapshot of allocator bookkeeping
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    /// Blocks currently outstanding
    pub live_blocks: usize,
    /// Bytes currently outstanding
    pub live_bytes: usize,
    /// High-water mark of `live_bytes`
    pub peak_bytes: usize,
    /// Total successful requests over the allocator's lifetime
    pub total_requests: u64,
}

/// Instrumenting allocator tracking outstanding blocks and the byte high-water mark
#[derive(Debug, Default, Clone)]
pub struct CountingAllocator {
    stats: MemoryStats,
}

impl CountingAllocator {
    /// Create a new counting allocator
    pub fn new() -> Self {
        Self::default()
    }

    /// Current bookkeeping
    pub fn stats(&self) -> MemoryStats {
        self.stats
    }
}

impl Allocator for CountingAllocator {
    fn request(&mut self, bytes: usize) -> Result<(), AllocError> {
        let stats = &mut self.stats;
        stats.live_blocks += 1;
        stats.live_bytes += bytes;
        stats.peak_bytes = stats.peak_bytes.max(stats.live_bytes);
        stats.total_requests += 1;
        Ok(())
    }

    fn release(&mut self, bytes: usize) {
        let stats = &mut self.stats;
        debug_assert!(stats.live_blocks > 0, "release without matching request");
        stats.live_blocks = stats.live_blocks.saturating_sub(1);
        stats.live_bytes = stats.live_bytes.saturating_sub(bytes);
    }
}

/// Allocator enforcing a fixed byte budget
///
/// Requests that would push the outstanding total past `limit` fail with
/// [`AllocError::OutOfMemory`]. Useful for hosts that cap per-scene memory.
#[derive(Debug, Clone)]
pub struct BudgetAllocator {
    limit: usize,
    counter: CountingAllocator,
}

impl BudgetAllocator {
    /// Create an allocator that refuses to go beyond `limit` outstanding bytes
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            counter: CountingAllocator::new(),
        }
    }

    /// Configured limit in bytes
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Raise or lower the limit; already outstanding memory is unaffected
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    /// Current bookkeeping
    pub fn stats(&self) -> MemoryStats {
        self.counter.stats()
    }
}

impl Allocator for BudgetAllocator {
    fn request(&mut self, bytes: usize) -> Result<(), AllocError> {
        let in_use = self.counter.stats().live_bytes;
        if in_use.saturating_add(bytes) > self.limit {
            return Err(AllocError::OutOfMemory {
                requested: bytes,
                in_use,
                limit: self.limit,
            });
        }
        self.counter.request(bytes)
    }

    fn release(&mut self, bytes: usize) {
        self.counter.release(bytes);
    }
}
