//! Common types shared by hardware decode contexts

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hardware codec type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HwCodecType {
    /// H.264 / AVC
    H264,
    /// H.265 / HEVC
    H265,
    /// VP8
    VP8,
    /// VP9
    VP9,
    /// AV1
    AV1,
    /// MPEG-2
    MPEG2,
}

impl HwCodecType {
    /// Get the codec name as used in ffmpeg/gstreamer
    pub fn codec_name(&self) -> &'static str {
        match self {
            HwCodecType::H264 => "h264",
            HwCodecType::H265 => "hevc",
            HwCodecType::VP8 => "vp8",
            HwCodecType::VP9 => "vp9",
            HwCodecType::AV1 => "av1",
            HwCodecType::MPEG2 => "mpeg2video",
        }
    }
}

impl fmt::Display for HwCodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.codec_name())
    }
}

/// Decode context configuration
///
/// Defaults match what the VP8 hardware path expects; a JSON document may
/// override any subset of fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Largest frame width the hardware decodes
    pub max_width: u32,
    /// Largest frame height the hardware decodes
    pub max_height: u32,
    /// Bitstream buffers in the ring
    pub bitstream_buffers: usize,
    /// Slice-data records per frame
    pub slice_data_entries: usize,
    /// Slice-control records per frame
    pub slice_control_entries: usize,
    /// Floor for each bitstream buffer's size in bytes
    pub min_bitstream_size: usize,
    /// Render-target table capacity
    pub render_targets: usize,
    /// Reference frame-index space; indices at or above it are clamped
    pub reference_slots: u32,
}

/// Largest frame-index space the VP8 hardware addresses
pub const MAX_REFERENCE_SLOTS: u32 = 128;

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            max_width: 4096,
            max_height: 4096,
            bitstream_buffers: 16,
            slice_data_entries: 10,
            slice_control_entries: 4,
            min_bitstream_size: 10240,
            render_targets: 127,
            reference_slots: MAX_REFERENCE_SLOTS,
        }
    }
}

impl DecoderConfig {
    /// Parse a configuration from JSON, filling unspecified fields with defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: DecoderConfig = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("invalid decoder config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(Error::config("maximum dimensions must be non-zero"));
        }
        if self.bitstream_buffers == 0 {
            return Err(Error::config("at least one bitstream buffer is required"));
        }
        if self.slice_data_entries == 0 || self.slice_control_entries == 0 {
            return Err(Error::config("slice arrays must hold at least one entry"));
        }
        if self.min_bitstream_size == 0 {
            return Err(Error::config("minimum bitstream size must be non-zero"));
        }
        if self.reference_slots == 0 || self.reference_slots > MAX_REFERENCE_SLOTS {
            return Err(Error::config(format!(
                "reference slots must be within 1..={}",
                MAX_REFERENCE_SLOTS
            )));
        }
        if self.render_targets == 0 || self.render_targets > self.reference_slots as usize {
            return Err(Error::config(
                "render targets must be non-zero and fit the reference slots",
            ));
        }
        Ok(())
    }

    /// Size of each bitstream buffer for a frame of the given dimensions
    ///
    /// One 4:2:0 frame's worth of bytes, never below the configured floor.
    pub fn bitstream_buffer_size(&self, width: u32, height: u32) -> usize {
        let frame = width as usize * height as usize * 3 / 2;
        frame.max(self.min_bitstream_size)
    }
}
