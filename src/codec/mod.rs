//! Codec-specific decode contexts
//!
//! Each codec module owns its client buffer layouts, its hardware parameter
//! blocks and the translation between them.

pub mod vp8;

pub use vp8::Vp8Decoder;
