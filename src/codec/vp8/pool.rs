//! VP8 decode buffer pool
//!
//! Owns the GPU and host resources a VP8 context needs for its lifetime:
//!
//! - a ring of bitstream buffers
//! - per-frame slice-data records
//! - the coefficient probability buffer, locked while the pool lives
//! - per-frame slice-control copies
//!
//! Resources are created in that order. Construction is all-or-nothing: a
//! failure drops what was already built before the error is returned.
//!
//! Per-frame records are tagged with a frame number that advances each time
//! the records are retired. Bindings made under an older number are stale.

use super::va::{SliceParameterBufferVp8, COEFF_PROB_SIZE};
use crate::error::{Error, Result};
use crate::hwaccel::gpu::{BufferAllocator, BufferDesc, GpuBuffer};
use crate::hwaccel::pool::{BitstreamPool, FixedArray, StagedData};
use crate::hwaccel::DecoderConfig;
use std::sync::Arc;
use tracing::{debug, warn};

struct PoolResources {
    bitstream: BitstreamPool,
    slice_data: FixedArray<StagedData>,
    probability: GpuBuffer,
    slice_controls: FixedArray<SliceParameterBufferVp8>,
}

impl PoolResources {
    fn build(
        allocator: &dyn BufferAllocator,
        config: &DecoderConfig,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let bitstream = BitstreamPool::new(
            allocator,
            config.bitstream_buffers,
            config.bitstream_buffer_size(width, height),
        )?;
        let slice_data = FixedArray::new(allocator, "slice data records", config.slice_data_entries)?;

        let mut probability =
            allocator.create_buffer(&BufferDesc::new("vp8 coefficient probabilities", COEFF_PROB_SIZE))?;
        probability.lock()?;

        let slice_controls =
            FixedArray::new(allocator, "slice control copies", config.slice_control_entries)?;

        Ok(PoolResources {
            bitstream,
            slice_data,
            probability,
            slice_controls,
        })
    }
}

/// Buffer pool for one VP8 decode context
pub struct Vp8BufferPool {
    allocator: Arc<dyn BufferAllocator>,
    resources: Option<PoolResources>,
    frame: u64,
}

impl Vp8BufferPool {
    /// Create an empty pool; nothing is allocated until [`initialize`](Self::initialize)
    pub fn new(allocator: Arc<dyn BufferAllocator>) -> Self {
        Vp8BufferPool {
            allocator,
            resources: None,
            frame: 0,
        }
    }

    /// Allocate every pool resource for frames of the given size
    pub fn initialize(&mut self, config: &DecoderConfig, width: u32, height: u32) -> Result<()> {
        self.teardown();
        match PoolResources::build(self.allocator.as_ref(), config, width, height) {
            Ok(resources) => {
                debug!(
                    "vp8 buffer pool ready: {} bitstream buffers of {} bytes",
                    resources.bitstream.len(),
                    config.bitstream_buffer_size(width, height)
                );
                self.resources = Some(resources);
                self.frame += 1;
                Ok(())
            }
            Err(e) => {
                warn!("vp8 buffer pool allocation failed: {}", e);
                Err(Error::allocation_failed(e.to_string()))
            }
        }
    }

    /// Release every resource; a no-op on an empty pool
    pub fn teardown(&mut self) {
        if let Some(mut resources) = self.resources.take() {
            resources.probability.unlock();
            debug!("vp8 buffer pool released");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.resources.is_some()
    }

    /// Number of the frame the per-frame records belong to
    pub fn frame(&self) -> u64 {
        self.frame
    }

    fn resources(&self) -> Result<&PoolResources> {
        self.resources
            .as_ref()
            .ok_or_else(|| Error::allocation_failed("vp8 buffer pool not initialised"))
    }

    fn resources_mut(&mut self) -> Result<&mut PoolResources> {
        self.resources
            .as_mut()
            .ok_or_else(|| Error::allocation_failed("vp8 buffer pool not initialised"))
    }

    /// Copy a slice-data payload into the current frame's bitstream slot
    pub fn stage_slice_data(&mut self, data: &[u8]) -> Result<StagedData> {
        let allocator = Arc::clone(&self.allocator);
        let resources = self.resources_mut()?;
        if resources.slice_data.is_full() {
            return Err(Error::allocation_failed(format!(
                "more than {} slice data buffers in one frame",
                resources.slice_data.capacity()
            )));
        }
        let staged = resources.bitstream.stage(allocator.as_ref(), data)?;
        resources.slice_data.push(staged)?;
        Ok(staged)
    }

    /// Offset of a slice-data group inside the frame's bitstream slot
    ///
    /// Groups past the last staged record resolve to zero.
    pub fn slice_data_offset(&self, group: u32) -> u32 {
        self.resources
            .as_ref()
            .and_then(|r| r.slice_data.get(group as usize))
            .map(|staged| staged.offset)
            .unwrap_or(0)
    }

    /// Staged slice-data records for the current frame
    pub fn slice_data(&self) -> &[StagedData] {
        self.resources
            .as_ref()
            .map(|r| r.slice_data.as_slice())
            .unwrap_or(&[])
    }

    /// Reserve slice-control slots, returning the first slot
    pub fn allocate_slice_control(&mut self, count: u32) -> Result<usize> {
        let resources = self.resources_mut()?;
        Ok(resources.slice_controls.reserve(count as usize)?.start)
    }

    /// Slice-control slots still free in the current frame
    pub fn slice_control_free(&self) -> usize {
        self.resources
            .as_ref()
            .map(|r| r.slice_controls.capacity() - r.slice_controls.len())
            .unwrap_or(0)
    }

    /// Overwrite reserved slice-control slots starting at `offset`
    pub fn write_slice_controls(&mut self, offset: usize, slices: &[SliceParameterBufferVp8]) -> Result<()> {
        let resources = self.resources_mut()?;
        for (i, slice) in slices.iter().enumerate() {
            let slot = resources.slice_controls.get_mut(offset + i).ok_or_else(|| {
                Error::invalid_buffer(format!("slice control slot {} not reserved", offset + i))
            })?;
            *slot = *slice;
        }
        Ok(())
    }

    /// Slice-control copies for the current frame
    pub fn slice_controls(&self) -> &[SliceParameterBufferVp8] {
        self.resources
            .as_ref()
            .map(|r| r.slice_controls.as_slice())
            .unwrap_or(&[])
    }

    /// Copy coefficient probabilities into the probability buffer
    ///
    /// Waits for the hardware to finish reading the previous table.
    pub fn write_probability(&mut self, probs: &[u8]) -> Result<()> {
        if probs.len() < COEFF_PROB_SIZE {
            return Err(Error::invalid_parameter(format!(
                "probability table needs {} bytes, got {}",
                COEFF_PROB_SIZE,
                probs.len()
            )));
        }
        let resources = self
            .resources
            .as_mut()
            .ok_or_else(|| Error::invalid_parameter("probability buffer not allocated"))?;
        resources.probability.wait_rendering();
        resources.probability.mapped_mut()?[..COEFF_PROB_SIZE].copy_from_slice(&probs[..COEFF_PROB_SIZE]);
        Ok(())
    }

    pub fn probability_buffer(&self) -> Option<&GpuBuffer> {
        self.resources.as_ref().map(|r| &r.probability)
    }

    pub fn bitstream_buffer(&self, slot: usize) -> Option<&GpuBuffer> {
        self.resources.as_ref().and_then(|r| r.bitstream.slot(slot))
    }

    /// Slot the current frame is staging into
    pub fn current_bitstream_slot(&self) -> Option<usize> {
        self.resources.as_ref().and_then(|r| r.bitstream.current_slot())
    }

    /// Retire the current frame's per-frame records
    ///
    /// The next slice data staged goes to a fresh bitstream slot.
    pub fn end_frame(&mut self) -> Result<()> {
        let resources = self.resources_mut()?;
        resources.bitstream.reset_frame();
        resources.slice_data.clear();
        resources.slice_controls.clear();
        self.frame += 1;
        Ok(())
    }

    /// Number of bitstream buffers in the ring
    pub fn bitstream_capacity(&self) -> usize {
        self.resources().map(|r| r.bitstream.len()).unwrap_or(0)
    }
}

impl Drop for Vp8BufferPool {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hwaccel::gpu::{AllocationTracker, HostReservation, SystemAllocator};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the nth allocation (1-based), counting GPU and host allocations
    struct FailAt {
        inner: SystemAllocator,
        fail_at: usize,
        calls: AtomicUsize,
    }

    impl FailAt {
        fn new(fail_at: usize) -> Self {
            FailAt {
                inner: SystemAllocator::new(),
                fail_at,
                calls: AtomicUsize::new(0),
            }
        }

        fn tick(&self) -> Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_at {
                return Err(Error::allocation_failed("injected"));
            }
            Ok(())
        }
    }

    impl BufferAllocator for FailAt {
        fn create_buffer(&self, desc: &BufferDesc) -> Result<GpuBuffer> {
            self.tick()?;
            self.inner.create_buffer(desc)
        }

        fn reserve_host(&self, name: &'static str, bytes: usize) -> Result<HostReservation> {
            self.tick()?;
            self.inner.reserve_host(name, bytes)
        }

        fn tracker(&self) -> &Arc<AllocationTracker> {
            self.inner.tracker()
        }
    }

    fn small_config() -> DecoderConfig {
        DecoderConfig {
            bitstream_buffers: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_initialize_allocates_everything() {
        let alloc = Arc::new(SystemAllocator::new());
        let mut pool = Vp8BufferPool::new(alloc.clone());
        pool.initialize(&DecoderConfig::default(), 64, 64).unwrap();
        // 16 bitstream buffers, 2 host arrays, probability buffer
        assert_eq!(alloc.tracker().live(), 19);
        assert!(pool.probability_buffer().unwrap().is_locked());
        assert_eq!(pool.bitstream_buffer(0).unwrap().size(), 10240);

        pool.teardown();
        assert_eq!(alloc.tracker().live(), 0);
        pool.teardown();
        assert!(!pool.is_initialized());
    }

    #[test]
    fn test_initialize_rolls_back_on_any_failure() {
        for fail_at in 1..=5 {
            let alloc = Arc::new(FailAt::new(fail_at));
            let mut pool = Vp8BufferPool::new(alloc.clone());
            let err = pool.initialize(&small_config(), 16, 16).unwrap_err();
            assert!(matches!(err, Error::AllocationFailed(_)));
            assert!(!pool.is_initialized());
            assert_eq!(alloc.tracker().live(), 0, "leak when failing allocation {}", fail_at);
        }
    }

    #[test]
    fn test_slice_data_offsets_by_group() {
        let mut pool = Vp8BufferPool::new(Arc::new(SystemAllocator::new()));
        pool.initialize(&small_config(), 16, 16).unwrap();
        pool.stage_slice_data(&[1; 30]).unwrap();
        pool.stage_slice_data(&[2; 12]).unwrap();
        assert_eq!(pool.slice_data_offset(0), 0);
        assert_eq!(pool.slice_data_offset(1), 30);
        assert_eq!(pool.slice_data_offset(2), 0);

        pool.end_frame().unwrap();
        assert!(pool.slice_data().is_empty());
    }

    #[test]
    fn test_slice_data_capacity() {
        let config = DecoderConfig {
            slice_data_entries: 1,
            ..small_config()
        };
        let mut pool = Vp8BufferPool::new(Arc::new(SystemAllocator::new()));
        pool.initialize(&config, 16, 16).unwrap();
        pool.stage_slice_data(&[0; 4]).unwrap();
        assert!(pool.stage_slice_data(&[0; 4]).is_err());
    }

    #[test]
    fn test_probability_write() {
        let mut pool = Vp8BufferPool::new(Arc::new(SystemAllocator::new()));
        assert!(pool.write_probability(&[0; COEFF_PROB_SIZE]).is_err());
        pool.initialize(&small_config(), 16, 16).unwrap();
        assert!(pool.write_probability(&[0; 10]).is_err());

        let probs: Vec<u8> = (0..COEFF_PROB_SIZE).map(|i| i as u8).collect();
        pool.write_probability(&probs).unwrap();
        assert_eq!(pool.probability_buffer().unwrap().contents(), &probs[..]);
    }

    #[test]
    fn test_slice_controls() {
        let mut pool = Vp8BufferPool::new(Arc::new(SystemAllocator::new()));
        assert!(pool.allocate_slice_control(1).is_err());
        pool.initialize(&small_config(), 16, 16).unwrap();
        assert_eq!(pool.allocate_slice_control(2).unwrap(), 0);
        assert_eq!(pool.allocate_slice_control(2).unwrap(), 2);
        assert!(pool.allocate_slice_control(1).is_err());

        let slice = SliceParameterBufferVp8 {
            slice_data_size: 9,
            ..Default::default()
        };
        pool.write_slice_controls(2, &[slice]).unwrap();
        assert_eq!(pool.slice_controls()[2].slice_data_size, 9);
        assert!(pool.write_slice_controls(4, &[slice]).is_err());
    }

    #[test]
    fn test_frame_number_advances_when_records_retire() {
        let mut pool = Vp8BufferPool::new(Arc::new(SystemAllocator::new()));
        pool.initialize(&small_config(), 16, 16).unwrap();
        let first = pool.frame();
        assert_eq!(pool.slice_control_free(), 4);
        pool.allocate_slice_control(3).unwrap();
        assert_eq!(pool.slice_control_free(), 1);

        pool.end_frame().unwrap();
        assert_eq!(pool.frame(), first + 1);
        assert_eq!(pool.slice_control_free(), 4);

        pool.initialize(&small_config(), 16, 16).unwrap();
        assert_eq!(pool.frame(), first + 2);
    }
}
