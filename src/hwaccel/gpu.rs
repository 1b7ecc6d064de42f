//! GPU buffer objects, fences and host reservations
//!
//! Buffer objects come from a [`BufferAllocator`]. Each object and each host
//! reservation is counted by the allocator's [`AllocationTracker`] for as
//! long as it lives, so a pool that fails halfway through construction can
//! be checked for leaks.
//!
//! Storage behind a [`GpuBuffer`] is materialised the first time it is
//! locked, the way a driver defers backing pages until the first CPU map.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Counts live GPU objects and host reservations
#[derive(Debug, Default)]
pub struct AllocationTracker {
    live: AtomicUsize,
    total: AtomicUsize,
}

impl AllocationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Objects currently alive
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Objects ever created
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    fn acquire(&self) {
        self.live.fetch_add(1, Ordering::AcqRel);
        self.total.fetch_add(1, Ordering::AcqRel);
    }

    fn release(&self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

// ============================================================================
// Fence
// ============================================================================

#[derive(Default)]
struct FenceState {
    pending: Mutex<u32>,
    idle: Condvar,
}

/// Completion fence shared between the CPU side and the hardware
///
/// Every submission that reads the buffer calls [`Fence::begin_read`]; the
/// completion path calls [`Fence::complete`]. [`Fence::wait`] blocks until
/// no reads are outstanding.
#[derive(Clone, Default)]
pub struct Fence {
    state: Arc<FenceState>,
}

impl Fence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outstanding hardware read
    pub fn begin_read(&self) {
        *self.state.pending.lock() += 1;
    }

    /// Retire one outstanding read
    pub fn complete(&self) {
        let mut pending = self.state.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.state.idle.notify_all();
        }
    }

    /// Whether hardware reads are outstanding
    pub fn is_busy(&self) -> bool {
        *self.state.pending.lock() > 0
    }

    /// Block until all outstanding reads have completed
    pub fn wait(&self) {
        let mut pending = self.state.pending.lock();
        while *pending > 0 {
            self.state.idle.wait(&mut pending);
        }
    }
}

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fence")
            .field("pending", &*self.state.pending.lock())
            .finish()
    }
}

// ============================================================================
// Buffer objects
// ============================================================================

/// Parameters for a buffer object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub name: &'static str,
    pub size: usize,
}

impl BufferDesc {
    pub fn new(name: &'static str, size: usize) -> Self {
        BufferDesc { name, size }
    }
}

/// A GPU buffer object
pub struct GpuBuffer {
    name: &'static str,
    handle: u64,
    size: usize,
    storage: Vec<u8>,
    locked: bool,
    fence: Fence,
    tracker: Arc<AllocationTracker>,
}

impl GpuBuffer {
    fn new(desc: &BufferDesc, handle: u64, tracker: Arc<AllocationTracker>) -> Self {
        tracker.acquire();
        GpuBuffer {
            name: desc.name,
            handle,
            size: desc.size,
            storage: Vec::new(),
            locked: false,
            fence: Fence::new(),
            tracker,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Lock the buffer for CPU writes and return the mapping
    pub fn lock(&mut self) -> Result<&mut [u8]> {
        if self.storage.len() != self.size {
            self.storage.try_reserve_exact(self.size).map_err(|e| {
                Error::allocation_failed(format!("lock of {} failed: {}", self.name, e))
            })?;
            self.storage.resize(self.size, 0);
        }
        if !self.locked {
            trace!("locked {} ({:#x})", self.name, self.handle);
        }
        self.locked = true;
        Ok(&mut self.storage)
    }

    /// Release the CPU mapping
    pub fn unlock(&mut self) {
        if self.locked {
            trace!("unlocked {} ({:#x})", self.name, self.handle);
        }
        self.locked = false;
    }

    /// Mapping of a buffer that is already locked
    pub fn mapped_mut(&mut self) -> Result<&mut [u8]> {
        if !self.locked {
            return Err(Error::invalid_state(format!("{} is not locked", self.name)));
        }
        Ok(&mut self.storage)
    }

    /// Current contents; empty until first locked
    pub fn contents(&self) -> &[u8] {
        &self.storage
    }

    /// Block until the hardware is done reading this buffer
    pub fn wait_rendering(&self) {
        if self.fence.is_busy() {
            debug!("waiting for hardware to release {}", self.name);
        }
        self.fence.wait();
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        self.unlock();
        self.tracker.release();
    }
}

impl fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("size", &self.size)
            .field("locked", &self.locked)
            .finish()
    }
}

/// Host-side memory reservation tracked alongside GPU objects
#[derive(Debug)]
pub struct HostReservation {
    name: &'static str,
    bytes: usize,
    tracker: Arc<AllocationTracker>,
}

impl HostReservation {
    fn new(name: &'static str, bytes: usize, tracker: Arc<AllocationTracker>) -> Self {
        tracker.acquire();
        HostReservation {
            name,
            bytes,
            tracker,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for HostReservation {
    fn drop(&mut self) {
        self.tracker.release();
    }
}

// ============================================================================
// Allocators
// ============================================================================

/// Source of GPU buffer objects and host reservations
pub trait BufferAllocator: Send + Sync {
    /// Create a buffer object
    fn create_buffer(&self, desc: &BufferDesc) -> Result<GpuBuffer>;

    /// Reserve host memory for a fixed-capacity array
    fn reserve_host(&self, name: &'static str, bytes: usize) -> Result<HostReservation>;

    /// Tracker counting everything this allocator handed out
    fn tracker(&self) -> &Arc<AllocationTracker>;
}

/// Allocator backed by system memory
#[derive(Debug, Default)]
pub struct SystemAllocator {
    tracker: Arc<AllocationTracker>,
    next_handle: AtomicU64,
}

impl SystemAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BufferAllocator for SystemAllocator {
    fn create_buffer(&self, desc: &BufferDesc) -> Result<GpuBuffer> {
        if desc.size == 0 {
            return Err(Error::allocation_failed(format!(
                "{}: zero-sized buffer object",
                desc.name
            )));
        }
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("created {} ({} bytes, handle {:#x})", desc.name, desc.size, handle);
        Ok(GpuBuffer::new(desc, handle, Arc::clone(&self.tracker)))
    }

    fn reserve_host(&self, name: &'static str, bytes: usize) -> Result<HostReservation> {
        Ok(HostReservation::new(name, bytes, Arc::clone(&self.tracker)))
    }

    fn tracker(&self) -> &Arc<AllocationTracker> {
        &self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_tracker_counts_live_objects() {
        let alloc = SystemAllocator::new();
        let a = alloc.create_buffer(&BufferDesc::new("a", 16)).unwrap();
        let r = alloc.reserve_host("r", 64).unwrap();
        assert_eq!(alloc.tracker().live(), 2);
        drop(a);
        assert_eq!(alloc.tracker().live(), 1);
        drop(r);
        assert_eq!(alloc.tracker().live(), 0);
        assert_eq!(alloc.tracker().total(), 2);
    }

    #[test]
    fn test_zero_sized_buffer_rejected() {
        let alloc = SystemAllocator::new();
        assert!(alloc.create_buffer(&BufferDesc::new("empty", 0)).is_err());
        assert_eq!(alloc.tracker().live(), 0);
    }

    #[test]
    fn test_lock_materialises_storage() {
        let alloc = SystemAllocator::new();
        let mut buf = alloc.create_buffer(&BufferDesc::new("bs", 32)).unwrap();
        assert!(buf.contents().is_empty());
        assert!(buf.mapped_mut().is_err());

        buf.lock().unwrap()[..4].copy_from_slice(&[1, 2, 3, 4]);
        assert!(buf.is_locked());
        assert_eq!(buf.mapped_mut().unwrap().len(), 32);
        buf.unlock();
        assert_eq!(&buf.contents()[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_fence_wait_blocks_until_complete() {
        let fence = Fence::new();
        fence.begin_read();
        assert!(fence.is_busy());

        let hw = fence.clone();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            hw.complete();
        });

        fence.wait();
        assert!(!fence.is_busy());
        worker.join().unwrap();
    }

    #[test]
    fn test_idle_fence_does_not_block() {
        let fence = Fence::new();
        fence.wait();
        fence.complete();
        assert!(!fence.is_busy());
    }
}
