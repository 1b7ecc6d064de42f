//! Render-target table
//!
//! Maps client surfaces to the small frame indices the hardware parameter
//! blocks carry. A surface gets an index the first time it becomes a render
//! target and keeps it until the table is cleared.

use super::vaapi::SurfaceId;
use crate::error::{Error, Result};
use tracing::trace;

/// Frame index reported for surfaces that are not in the table
pub const INVALID_FRAME_INDEX: u32 = 0xffff_ffff;

/// Surface-to-frame-index table for one decode context
#[derive(Debug, Clone)]
pub struct RenderTargetTable {
    targets: Vec<SurfaceId>,
    capacity: usize,
    current: Option<SurfaceId>,
}

impl RenderTargetTable {
    /// Create a table holding up to `capacity` surfaces
    pub fn new(capacity: usize) -> Self {
        RenderTargetTable {
            targets: Vec::with_capacity(capacity),
            capacity,
            current: None,
        }
    }

    /// Add a surface, returning its frame index
    ///
    /// A surface already in the table keeps its index.
    pub fn register(&mut self, surface: SurfaceId) -> Result<u32> {
        if let Some(index) = self.position(surface) {
            return Ok(index);
        }
        if self.targets.len() >= self.capacity {
            return Err(Error::allocation_failed(format!(
                "render target table full ({} entries)",
                self.capacity
            )));
        }
        self.targets.push(surface);
        let index = (self.targets.len() - 1) as u32;
        trace!("render target {} -> frame index {}", surface, index);
        Ok(index)
    }

    /// Register a surface and make it the current decode target
    pub fn set_current(&mut self, surface: SurfaceId) -> Result<u32> {
        let index = self.register(surface)?;
        self.current = Some(surface);
        Ok(index)
    }

    /// Surface being decoded into
    pub fn current(&self) -> Option<SurfaceId> {
        self.current
    }

    /// Frame index of a surface, [`INVALID_FRAME_INDEX`] when absent
    pub fn frame_index(&self, surface: Option<SurfaceId>) -> u32 {
        surface
            .and_then(|s| self.position(s))
            .unwrap_or(INVALID_FRAME_INDEX)
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.targets.clear();
        self.current = None;
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn position(&self, surface: SurfaceId) -> Option<u32> {
        self.targets
            .iter()
            .position(|&s| s == surface)
            .map(|i| i as u32)
    }
}
