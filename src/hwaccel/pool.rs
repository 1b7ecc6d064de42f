//! Codec-agnostic pieces of a decode buffer pool
//!
//! - [`FixedArray`]: host array with a fixed capacity and a fill watermark
//! - [`BitstreamPool`]: ring of GPU buffers that receive compressed data
//!
//! Both release everything they own when dropped, so a pool assembled with
//! `?` unwinds cleanly if a later allocation fails.

use super::gpu::{BufferAllocator, BufferDesc, GpuBuffer, HostReservation};
use crate::error::{Error, Result};
use std::mem;
use std::ops::Range;
use tracing::{debug, trace};

/// Fixed-capacity host array whose memory is reserved up front
#[derive(Debug)]
pub struct FixedArray<T> {
    items: Vec<T>,
    capacity: usize,
    _reservation: HostReservation,
}

impl<T: Clone + Default> FixedArray<T> {
    /// Reserve room for `capacity` entries
    pub fn new(allocator: &dyn BufferAllocator, name: &'static str, capacity: usize) -> Result<Self> {
        let reservation = allocator.reserve_host(name, capacity * mem::size_of::<T>())?;
        let mut items = Vec::new();
        items
            .try_reserve_exact(capacity)
            .map_err(|e| Error::allocation_failed(format!("{}: {}", name, e)))?;
        Ok(FixedArray {
            items,
            capacity,
            _reservation: reservation,
        })
    }

    /// Append one entry, returning its position
    pub fn push(&mut self, item: T) -> Result<usize> {
        if self.is_full() {
            return Err(Error::allocation_failed(format!(
                "{} exhausted ({} entries)",
                self._reservation.name(),
                self.capacity
            )));
        }
        self.items.push(item);
        Ok(self.items.len() - 1)
    }

    /// Claim `count` default-initialised entries past the watermark
    pub fn reserve(&mut self, count: usize) -> Result<Range<usize>> {
        let start = self.items.len();
        let end = start
            .checked_add(count)
            .filter(|&end| end <= self.capacity)
            .ok_or_else(|| {
                Error::allocation_failed(format!(
                    "{}: {} entries requested, {} free",
                    self._reservation.name(),
                    count,
                    self.capacity - start
                ))
            })?;
        self.items.resize(end, T::default());
        Ok(start..end)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Reset the watermark without releasing memory
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Where a chunk of compressed data landed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagedData {
    /// Bitstream slot holding the data
    pub slot: usize,
    /// Byte offset inside the slot
    pub offset: u32,
    /// Length in bytes
    pub size: u32,
}

/// Ring of bitstream buffers
///
/// Each frame's compressed data is packed back to back into one slot. The
/// slot is picked round-robin when the frame stages its first chunk, after
/// waiting for the hardware to finish with it.
#[derive(Debug)]
pub struct BitstreamPool {
    slots: Vec<GpuBuffer>,
    order: u64,
    current: Option<usize>,
    write_offset: usize,
}

impl BitstreamPool {
    /// Allocate `count` buffers of `buffer_size` bytes each
    pub fn new(allocator: &dyn BufferAllocator, count: usize, buffer_size: usize) -> Result<Self> {
        let mut slots = Vec::with_capacity(count);
        for _ in 0..count {
            slots.push(allocator.create_buffer(&BufferDesc::new("bitstream", buffer_size))?);
        }
        debug!("bitstream pool: {} x {} bytes", count, buffer_size);
        Ok(BitstreamPool {
            slots,
            order: 0,
            current: None,
            write_offset: 0,
        })
    }

    /// Append a chunk to the current frame's slot
    pub fn stage(&mut self, allocator: &dyn BufferAllocator, data: &[u8]) -> Result<StagedData> {
        if self.slots.is_empty() {
            return Err(Error::allocation_failed("bitstream pool has no slots"));
        }
        let slot = match self.current {
            Some(slot) => slot,
            None => {
                let slot = (self.order % self.slots.len() as u64) as usize;
                self.order += 1;
                self.slots[slot].wait_rendering();
                self.current = Some(slot);
                self.write_offset = 0;
                slot
            }
        };

        let offset = self.write_offset;
        let end = offset + data.len();
        if end > self.slots[slot].size() {
            self.grow(allocator, slot, end)?;
        }

        let buffer = &mut self.slots[slot];
        buffer.lock()?[offset..end].copy_from_slice(data);
        buffer.unlock();
        self.write_offset = end;
        trace!("staged {} bytes at slot {} offset {}", data.len(), slot, offset);

        Ok(StagedData {
            slot,
            offset: offset as u32,
            size: data.len() as u32,
        })
    }

    fn grow(&mut self, allocator: &dyn BufferAllocator, slot: usize, needed: usize) -> Result<()> {
        let size = needed.max(self.slots[slot].size() * 2);
        let mut replacement = allocator.create_buffer(&BufferDesc::new("bitstream", size))?;
        let kept = self.write_offset;
        if kept > 0 {
            let old = &self.slots[slot].contents()[..kept];
            replacement.lock()?[..kept].copy_from_slice(old);
            replacement.unlock();
        }
        debug!("bitstream slot {} grown to {} bytes", slot, size);
        self.slots[slot] = replacement;
        Ok(())
    }

    /// Forget the current frame's slot so the next frame takes a fresh one
    pub fn reset_frame(&mut self) {
        self.current = None;
        self.write_offset = 0;
    }

    /// Slot the current frame is staging into
    pub fn current_slot(&self) -> Option<usize> {
        self.current
    }

    pub fn slot(&self, index: usize) -> Option<&GpuBuffer> {
        self.slots.get(index)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
