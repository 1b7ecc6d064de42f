//! Hardware decode contexts behind a VA-API driver surface
//!
//! A driver receives parameter buffers from the client, translates them into
//! the parameter blocks the decode hardware consumes and hands the result to
//! a command generator. This module holds the codec-agnostic parts of that
//! path:
//!
//! - [`vaapi`]: VA protocol values, client buffers and surfaces
//! - [`gpu`]: buffer objects, fences and allocators
//! - [`pool`]: bitstream ring and fixed host arrays
//! - [`render_target`]: surface to frame-index table
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vaddi::hwaccel::{create_ddi_decoder, gpu::SystemAllocator, vaapi::VaProfile, DecoderConfig};
//!
//! let mut decoder = create_ddi_decoder(
//!     VaProfile::Vp8Version0_3,
//!     640,
//!     480,
//!     DecoderConfig::default(),
//!     Arc::new(SystemAllocator::new()),
//! )?;
//! decoder.begin_picture(&media, target)?;
//! decoder.render_picture(&mut media, &buffers)?;
//! decoder.end_picture(&mut generator)?;
//! ```

pub mod common;
pub mod gpu;
pub mod pool;
pub mod render_target;
pub mod vaapi;

pub use common::{DecoderConfig, HwCodecType};

use crate::codec::vp8::{Vp8DecodeJob, Vp8Decoder};
use crate::error::{Error, Result};
use gpu::BufferAllocator;
use std::sync::Arc;
use tracing::info;
use vaapi::{BufferType, MediaBuffer, MediaContext, SurfaceId, VaBufferId, VaProfile};

/// Hardware decode mode selected for a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecMode {
    /// VP8 variable-length decode
    Vp8Vld,
}

impl CodecMode {
    /// Codec decoded in this mode
    pub fn codec(&self) -> HwCodecType {
        match self {
            CodecMode::Vp8Vld => HwCodecType::VP8,
        }
    }
}

/// Decode mode for a VA profile
pub fn decode_codec_mode(profile: VaProfile) -> Result<CodecMode> {
    match profile {
        VaProfile::Vp8Version0_3 => Ok(CodecMode::Vp8Vld),
        other => Err(Error::unsupported_profile(format!(
            "no decode mode for {:?}",
            other
        ))),
    }
}

/// A frame ready for the hardware
#[derive(Debug)]
pub enum DecodeJob<'a> {
    Vp8(Vp8DecodeJob<'a>),
}

/// Turns a translated frame into hardware commands
///
/// Implementations must call [`gpu::Fence::begin_read`] on every buffer the
/// submitted commands read and [`gpu::Fence::complete`] once the hardware
/// is done with them.
pub trait CommandGenerator {
    fn execute(&mut self, job: DecodeJob<'_>) -> Result<()>;
}

/// Per-codec decode context driven by the VA entry points
pub trait DdiDecoder: Send {
    /// Codec this context decodes
    fn codec(&self) -> HwCodecType;

    /// Check a frame size against the hardware limits for a mode
    fn check_resolution(&self, mode: CodecMode, width: u32, height: u32) -> Result<()>;

    /// Record the context's frame size and mode
    fn context_init(&mut self, width: u32, height: u32);

    /// Allocate parameter storage and the buffer pool
    fn init_resources(&mut self) -> Result<()>;

    /// Register a client buffer, staging its payload where the codec needs it
    fn create_buffer(
        &mut self,
        media: &mut MediaContext,
        kind: BufferType,
        num_elements: u32,
        data: &[u8],
    ) -> Result<VaBufferId>;

    /// Reserve slice-control slots for a slice-parameter buffer
    fn alloc_slice_control_buffer(&mut self, buffer: &mut MediaBuffer) -> Result<()>;

    /// Start a frame decoding into `render_target`
    fn begin_picture(&mut self, media: &MediaContext, render_target: SurfaceId) -> Result<()>;

    /// Translate a batch of client buffers into the frame's parameters
    fn render_picture(&mut self, media: &mut MediaContext, buffers: &[VaBufferId]) -> Result<()>;

    /// Submit the frame
    fn end_picture(&mut self, generator: &mut dyn CommandGenerator) -> Result<()>;

    /// Release every resource; safe to call more than once
    fn destroy_context(&mut self);
}

/// Create and initialise a decode context for a profile
pub fn create_ddi_decoder(
    profile: VaProfile,
    width: u32,
    height: u32,
    config: DecoderConfig,
    allocator: Arc<dyn BufferAllocator>,
) -> Result<Box<dyn DdiDecoder>> {
    let mode = decode_codec_mode(profile)?;

    let mut decoder: Box<dyn DdiDecoder> = match mode {
        CodecMode::Vp8Vld => Box::new(Vp8Decoder::new(config, allocator)?),
    };
    decoder.check_resolution(mode, width, height)?;
    decoder.context_init(width, height);
    decoder.init_resources()?;

    info!("created {} decode context {}x{}", decoder.codec(), width, height);
    Ok(decoder)
}
