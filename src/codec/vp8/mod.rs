//! VP8 hardware decode
//!
//! VP8 is a royalty-free video codec developed by On2 Technologies and
//! released as open source by Google. The hardware decodes it in VLD mode:
//! the driver supplies picture parameters, the dequantization matrix, the
//! coefficient probabilities and the compressed partitions, and the
//! hardware does the rest.
//!
//! - [`va`]: client buffer layouts
//! - [`hal`]: hardware parameter blocks
//! - [`quant`]: quantizer tables
//! - [`translate`]: client-to-hardware translation
//! - [`pool`]: per-context buffer pool
//! - [`decoder`]: the decode context
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vaddi::codec::vp8::Vp8Decoder;
//! use vaddi::hwaccel::{gpu::SystemAllocator, DdiDecoder, DecoderConfig};
//!
//! let mut decoder = Vp8Decoder::new(DecoderConfig::default(), Arc::new(SystemAllocator::new()))?;
//! decoder.context_init(640, 480);
//! decoder.init_resources()?;
//! # Ok::<(), vaddi::error::Error>(())
//! ```

pub mod decoder;
pub mod hal;
pub mod pool;
pub mod quant;
pub mod translate;
pub mod va;

pub use decoder::{FrameState, Vp8DecodeJob, Vp8Decoder};
pub use hal::{Vp8IqMatrix, Vp8PicParams};
pub use pool::Vp8BufferPool;
pub use translate::DecodeParams;
pub use va::{
    IqMatrixBufferVp8, PictureParameterBufferVp8, ProbabilityBufferVp8, SliceParameterBufferVp8,
    VaPicFields,
};
