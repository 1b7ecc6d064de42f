//! VA-API (Video Acceleration API) client-side objects
//!
//! A VA driver sees the client through integer handles: buffer ids that name
//! parameter and data blobs, and surface ids that name decode targets. This
//! module models the driver's view of those handles:
//!
//! - [`VaStatus`] and [`BufferType`] mirror the libva enumerations
//! - [`BufferHeap`] owns client buffers and their map/unmap state
//! - [`SurfaceHeap`] owns the surfaces a context decodes into
//! - [`MediaContext`] bundles both, the way a driver context does

use std::collections::HashMap;
use std::fmt;
use tracing::trace;

// ============================================================================
// VA-API protocol values
// ============================================================================

/// VA-API buffer ID
pub type VaBufferId = u32;

/// VA-API surface ID
pub type SurfaceId = u32;

/// Invalid id marker shared by buffers and surfaces
pub const VA_INVALID_ID: u32 = 0xffff_ffff;

/// Invalid surface marker
pub const VA_INVALID_SURFACE: SurfaceId = VA_INVALID_ID;

/// VA-API status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum VaStatus {
    Success = 0,
    OperationFailed = 1,
    AllocationFailed = 2,
    InvalidDisplay = 3,
    InvalidConfig = 4,
    InvalidContext = 5,
    InvalidSurface = 6,
    InvalidBuffer = 7,
    InvalidImage = 8,
    InvalidSubpicture = 9,
    AttrNotSupported = 10,
    MaxNumExceeded = 11,
    UnsupportedProfile = 12,
    UnsupportedEntrypoint = 13,
    UnsupportedRtFormat = 14,
    UnsupportedBufferType = 15,
    SurfaceBusy = 16,
    FlagNotSupported = 17,
    InvalidParameter = 18,
    ResolutionNotSupported = 19,
    Unimplemented = 20,
}

impl VaStatus {
    /// Raw status value as returned across the VA boundary
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Whether the status reports success
    pub fn is_success(self) -> bool {
        self == VaStatus::Success
    }
}

impl fmt::Display for VaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({:#x})", self, self.as_raw())
    }
}

/// VA-API profiles the decode layer recognises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VaProfile {
    Mpeg2Main,
    H264Main,
    H264High,
    Vp8Version0_3,
    HevcMain,
    Vp9Profile0,
    Av1Profile0,
    Other(i32),
}

impl VaProfile {
    /// Map a raw libva profile value
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => VaProfile::Mpeg2Main,
            6 => VaProfile::H264Main,
            7 => VaProfile::H264High,
            14 => VaProfile::Vp8Version0_3,
            17 => VaProfile::HevcMain,
            19 => VaProfile::Vp9Profile0,
            32 => VaProfile::Av1Profile0,
            other => VaProfile::Other(other),
        }
    }

    /// Raw libva profile value
    pub fn as_raw(self) -> i32 {
        match self {
            VaProfile::Mpeg2Main => 1,
            VaProfile::H264Main => 6,
            VaProfile::H264High => 7,
            VaProfile::Vp8Version0_3 => 14,
            VaProfile::HevcMain => 17,
            VaProfile::Vp9Profile0 => 19,
            VaProfile::Av1Profile0 => 32,
            VaProfile::Other(raw) => raw,
        }
    }
}

/// VA-API buffer types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferType {
    PictureParameter,
    IqMatrix,
    BitPlane,
    SliceGroupMap,
    SliceParameter,
    SliceData,
    MacroblockParameter,
    ResidualData,
    DeblockingParameter,
    Image,
    ProtectedSliceData,
    QMatrix,
    HuffmanTable,
    Probability,
    DecodeStreamout,
    Other(i32),
}

impl BufferType {
    /// Map a raw libva buffer type value
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => BufferType::PictureParameter,
            1 => BufferType::IqMatrix,
            2 => BufferType::BitPlane,
            3 => BufferType::SliceGroupMap,
            4 => BufferType::SliceParameter,
            5 => BufferType::SliceData,
            6 => BufferType::MacroblockParameter,
            7 => BufferType::ResidualData,
            8 => BufferType::DeblockingParameter,
            9 => BufferType::Image,
            10 => BufferType::ProtectedSliceData,
            11 => BufferType::QMatrix,
            12 => BufferType::HuffmanTable,
            13 => BufferType::Probability,
            66 => BufferType::DecodeStreamout,
            other => BufferType::Other(other),
        }
    }

    /// Raw libva buffer type value
    pub fn as_raw(self) -> i32 {
        match self {
            BufferType::PictureParameter => 0,
            BufferType::IqMatrix => 1,
            BufferType::BitPlane => 2,
            BufferType::SliceGroupMap => 3,
            BufferType::SliceParameter => 4,
            BufferType::SliceData => 5,
            BufferType::MacroblockParameter => 6,
            BufferType::ResidualData => 7,
            BufferType::DeblockingParameter => 8,
            BufferType::Image => 9,
            BufferType::ProtectedSliceData => 10,
            BufferType::QMatrix => 11,
            BufferType::HuffmanTable => 12,
            BufferType::Probability => 13,
            BufferType::DecodeStreamout => 66,
            BufferType::Other(raw) => raw,
        }
    }
}

// ============================================================================
// Client buffers
// ============================================================================

/// A client buffer as the driver tracks it
#[derive(Debug, Clone)]
pub struct MediaBuffer {
    /// Buffer id handed to the client
    pub id: VaBufferId,
    /// Kind of payload
    pub kind: BufferType,
    /// Number of elements packed in the payload
    pub num_elements: u32,
    /// Payload size in bytes
    pub size: u32,
    /// Bitstream pool slot that received the payload (slice data only)
    pub bitstream_slot: Option<usize>,
    /// First slice-control slot reserved for this buffer (slice parameters only)
    pub slice_control_offset: Option<usize>,
    /// Pool frame the two bindings above were made in
    pub pool_frame: Option<u64>,
    data: Vec<u8>,
    mapped: bool,
}

impl MediaBuffer {
    /// Create an unregistered buffer around a payload
    pub fn new(kind: BufferType, num_elements: u32, data: Vec<u8>) -> Self {
        MediaBuffer {
            id: VA_INVALID_ID,
            kind,
            num_elements,
            size: data.len() as u32,
            bitstream_slot: None,
            slice_control_offset: None,
            pool_frame: None,
            data,
            mapped: false,
        }
    }

    /// Payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether the buffer is currently mapped
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }
}

/// Heap of client buffers keyed by id
#[derive(Debug, Default)]
pub struct BufferHeap {
    buffers: HashMap<VaBufferId, MediaBuffer>,
    next_id: VaBufferId,
}

impl BufferHeap {
    /// Create an empty heap
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a buffer and return its id
    pub fn insert(&mut self, mut buffer: MediaBuffer) -> VaBufferId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        if self.next_id == VA_INVALID_ID {
            self.next_id = 0;
        }
        buffer.id = id;
        trace!("registered buffer {} ({:?}, {} bytes)", id, buffer.kind, buffer.size);
        self.buffers.insert(id, buffer);
        id
    }

    /// Create and register a buffer
    pub fn create(&mut self, kind: BufferType, num_elements: u32, data: Vec<u8>) -> VaBufferId {
        self.insert(MediaBuffer::new(kind, num_elements, data))
    }

    /// Look up a buffer
    pub fn get(&self, id: VaBufferId) -> Option<&MediaBuffer> {
        self.buffers.get(&id)
    }

    /// Look up a buffer mutably
    pub fn get_mut(&mut self, id: VaBufferId) -> Option<&mut MediaBuffer> {
        self.buffers.get_mut(&id)
    }

    /// Map a buffer for CPU access
    ///
    /// Returns `None` when the id is unknown or the buffer has no backing
    /// storage, which the driver treats as a null mapping.
    pub fn map_buffer(&mut self, id: VaBufferId) -> Option<&mut [u8]> {
        let buffer = self.buffers.get_mut(&id)?;
        if buffer.data.is_empty() {
            return None;
        }
        buffer.mapped = true;
        Some(&mut buffer.data)
    }

    /// Release a mapping, returning false for unknown ids
    pub fn unmap_buffer(&mut self, id: VaBufferId) -> bool {
        match self.buffers.get_mut(&id) {
            Some(buffer) => {
                buffer.mapped = false;
                true
            }
            None => false,
        }
    }

    /// Destroy a buffer
    pub fn destroy(&mut self, id: VaBufferId) -> Option<MediaBuffer> {
        self.buffers.remove(&id)
    }

    /// Number of live buffers
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether no buffers are live
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

// ============================================================================
// Surfaces
// ============================================================================

/// Handle to the GPU resource backing a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub surface: SurfaceId,
    pub handle: u64,
}

/// A decode target surface
#[derive(Debug, Clone)]
pub struct MediaSurface {
    pub id: SurfaceId,
    pub width: u32,
    pub height: u32,
    handle: u64,
}

impl MediaSurface {
    /// Resource reference the hardware uses to address this surface
    pub fn resource(&self) -> ResourceRef {
        ResourceRef {
            surface: self.id,
            handle: self.handle,
        }
    }
}

/// Heap of surfaces keyed by id
#[derive(Debug, Default)]
pub struct SurfaceHeap {
    surfaces: HashMap<SurfaceId, MediaSurface>,
    next_id: SurfaceId,
}

impl SurfaceHeap {
    /// Create an empty heap
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a surface and return its id
    pub fn create_surface(&mut self, width: u32, height: u32) -> SurfaceId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let surface = MediaSurface {
            id,
            width,
            height,
            handle: 0x1000 + u64::from(id),
        };
        self.surfaces.insert(id, surface);
        id
    }

    /// Resolve a surface id, `None` for the invalid marker or unknown ids
    pub fn get(&self, id: SurfaceId) -> Option<&MediaSurface> {
        if id == VA_INVALID_SURFACE {
            return None;
        }
        self.surfaces.get(&id)
    }

    /// Destroy a surface
    pub fn destroy(&mut self, id: SurfaceId) -> Option<MediaSurface> {
        self.surfaces.remove(&id)
    }

    /// Number of live surfaces
    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    /// Whether no surfaces are live
    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }
}

/// Client-facing state a driver context works against
#[derive(Debug, Default)]
pub struct MediaContext {
    pub buffers: BufferHeap,
    pub surfaces: SurfaceHeap,
}

impl MediaContext {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_type_raw_values() {
        assert_eq!(BufferType::from_raw(0), BufferType::PictureParameter);
        assert_eq!(BufferType::from_raw(13), BufferType::Probability);
        assert_eq!(BufferType::from_raw(66), BufferType::DecodeStreamout);
        assert_eq!(BufferType::from_raw(500), BufferType::Other(500));
        assert_eq!(BufferType::SliceData.as_raw(), 5);
    }

    #[test]
    fn test_profile_raw_values() {
        assert_eq!(VaProfile::from_raw(14), VaProfile::Vp8Version0_3);
        assert_eq!(VaProfile::Vp8Version0_3.as_raw(), 14);
        assert_eq!(VaProfile::from_raw(-1), VaProfile::Other(-1));
    }

    #[test]
    fn test_buffer_heap_map_unmap() {
        let mut heap = BufferHeap::new();
        let id = heap.create(BufferType::SliceData, 1, vec![1, 2, 3]);
        assert_eq!(heap.get(id).map(|b| b.size), Some(3));

        let mapped = heap.map_buffer(id).unwrap();
        mapped[0] = 9;
        assert!(heap.get(id).unwrap().is_mapped());
        assert!(heap.unmap_buffer(id));
        assert_eq!(heap.get(id).unwrap().data(), &[9, 2, 3]);

        assert!(heap.map_buffer(VA_INVALID_ID).is_none());
        assert!(!heap.unmap_buffer(1234));
    }

    #[test]
    fn test_empty_buffer_maps_to_none() {
        let mut heap = BufferHeap::new();
        let id = heap.create(BufferType::PictureParameter, 1, Vec::new());
        assert!(heap.map_buffer(id).is_none());
    }

    #[test]
    fn test_surface_heap() {
        let mut heap = SurfaceHeap::new();
        let a = heap.create_surface(64, 64);
        let b = heap.create_surface(64, 64);
        assert_ne!(a, b);
        assert_ne!(heap.get(a).unwrap().resource(), heap.get(b).unwrap().resource());
        assert!(heap.get(VA_INVALID_SURFACE).is_none());
        heap.destroy(a);
        assert!(heap.get(a).is_none());
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(VaStatus::InvalidParameter.as_raw(), 0x12);
        assert!(VaStatus::Success.is_success());
        assert_eq!(VaStatus::InvalidBuffer.to_string(), "InvalidBuffer (0x7)");
    }
}
