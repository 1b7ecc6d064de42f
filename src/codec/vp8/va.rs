//! VP8 parameter buffers as a VA client lays them out
//!
//! All structures are little-endian and sized exactly like their libva
//! counterparts, reserved tails included. `parse` rejects short buffers;
//! `to_bytes` produces what a client would hand to `vaCreateBuffer`.

use crate::error::{Error, Result};
use crate::hwaccel::vaapi::{SurfaceId, VA_INVALID_SURFACE};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{self, Cursor, Read};

/// Size of the coefficient probability table
pub const COEFF_PROB_SIZE: usize = 4 * 8 * 3 * 11;

/// Maximum DCT partitions plus the first partition
pub const MAX_PARTITIONS: usize = 9;

fn truncated(what: &str, need: usize, have: usize) -> Error {
    Error::invalid_parameter(format!("{} needs {} bytes, got {}", what, need, have))
}

fn read_err(what: &str, e: io::Error) -> Error {
    Error::invalid_parameter(format!("malformed {}: {}", what, e))
}

// ============================================================================
// Picture parameters
// ============================================================================

macro_rules! bitfield {
    ($($get:ident, $set:ident: $shift:expr, $width:expr;)*) => {
        $(
            pub fn $get(&self) -> u32 {
                (self.0 >> $shift) & ((1u32 << $width) - 1)
            }

            pub fn $set(&mut self, value: u32) {
                let mask = ((1u32 << $width) - 1) << $shift;
                self.0 = (self.0 & !mask) | ((value << $shift) & mask);
            }
        )*
    };
}

/// Packed picture flags, least significant bit first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VaPicFields(pub u32);

impl VaPicFields {
    bitfield! {
        key_frame, set_key_frame: 0, 1;
        version, set_version: 1, 3;
        segmentation_enabled, set_segmentation_enabled: 4, 1;
        update_mb_segmentation_map, set_update_mb_segmentation_map: 5, 1;
        update_segment_feature_data, set_update_segment_feature_data: 6, 1;
        filter_type, set_filter_type: 7, 1;
        sharpness_level, set_sharpness_level: 8, 3;
        loop_filter_adj_enable, set_loop_filter_adj_enable: 11, 1;
        mode_ref_lf_delta_update, set_mode_ref_lf_delta_update: 12, 1;
        sign_bias_golden, set_sign_bias_golden: 13, 1;
        sign_bias_alternate, set_sign_bias_alternate: 14, 1;
        mb_no_coeff_skip, set_mb_no_coeff_skip: 15, 1;
        loop_filter_disable, set_loop_filter_disable: 16, 1;
    }
}

/// Boolean decoder state after the frame header
///
/// `count` is the number of bits still remaining in `value`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoolCoderContext {
    pub range: u8,
    pub value: u8,
    pub count: u8,
}

/// `VAPictureParameterBufferVP8`
///
/// Note the libva convention: `pic_fields.key_frame()` is zero for key
/// frames and one for inter frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureParameterBufferVp8 {
    pub frame_width: u32,
    pub frame_height: u32,
    pub last_ref_frame: SurfaceId,
    pub golden_ref_frame: SurfaceId,
    pub alt_ref_frame: SurfaceId,
    pub out_of_loop_frame: SurfaceId,
    pub pic_fields: VaPicFields,
    pub mb_segment_tree_probs: [u8; 3],
    pub loop_filter_level: [u8; 4],
    pub loop_filter_deltas_ref_frame: [i8; 4],
    pub loop_filter_deltas_mode: [i8; 4],
    pub prob_skip_false: u8,
    pub prob_intra: u8,
    pub prob_last: u8,
    pub prob_gf: u8,
    pub y_mode_probs: [u8; 4],
    pub uv_mode_probs: [u8; 3],
    pub mv_probs: [[u8; 19]; 2],
    pub bool_coder_ctx: BoolCoderContext,
}

impl Default for PictureParameterBufferVp8 {
    fn default() -> Self {
        PictureParameterBufferVp8 {
            frame_width: 0,
            frame_height: 0,
            last_ref_frame: VA_INVALID_SURFACE,
            golden_ref_frame: VA_INVALID_SURFACE,
            alt_ref_frame: VA_INVALID_SURFACE,
            out_of_loop_frame: VA_INVALID_SURFACE,
            pic_fields: VaPicFields::default(),
            mb_segment_tree_probs: [255; 3],
            loop_filter_level: [0; 4],
            loop_filter_deltas_ref_frame: [0; 4],
            loop_filter_deltas_mode: [0; 4],
            prob_skip_false: 0,
            prob_intra: 0,
            prob_last: 0,
            prob_gf: 0,
            y_mode_probs: [0; 4],
            uv_mode_probs: [0; 3],
            mv_probs: [[0; 19]; 2],
            bool_coder_ctx: BoolCoderContext::default(),
        }
    }
}

impl PictureParameterBufferVp8 {
    pub const SIZE: usize = 112;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(truncated("VP8 picture parameters", Self::SIZE, data.len()));
        }
        Self::read(&mut Cursor::new(data)).map_err(|e| read_err("VP8 picture parameters", e))
    }

    fn read(r: &mut Cursor<&[u8]>) -> io::Result<Self> {
        let mut pic = PictureParameterBufferVp8 {
            frame_width: r.read_u32::<LittleEndian>()?,
            frame_height: r.read_u32::<LittleEndian>()?,
            last_ref_frame: r.read_u32::<LittleEndian>()?,
            golden_ref_frame: r.read_u32::<LittleEndian>()?,
            alt_ref_frame: r.read_u32::<LittleEndian>()?,
            out_of_loop_frame: r.read_u32::<LittleEndian>()?,
            pic_fields: VaPicFields(r.read_u32::<LittleEndian>()?),
            ..Default::default()
        };
        r.read_exact(&mut pic.mb_segment_tree_probs)?;
        r.read_exact(&mut pic.loop_filter_level)?;
        r.read_i8_into(&mut pic.loop_filter_deltas_ref_frame)?;
        r.read_i8_into(&mut pic.loop_filter_deltas_mode)?;
        pic.prob_skip_false = r.read_u8()?;
        pic.prob_intra = r.read_u8()?;
        pic.prob_last = r.read_u8()?;
        pic.prob_gf = r.read_u8()?;
        r.read_exact(&mut pic.y_mode_probs)?;
        r.read_exact(&mut pic.uv_mode_probs)?;
        for component in pic.mv_probs.iter_mut() {
            r.read_exact(component)?;
        }
        pic.bool_coder_ctx = BoolCoderContext {
            range: r.read_u8()?,
            value: r.read_u8()?,
            count: r.read_u8()?,
        };
        Ok(pic)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        LittleEndian::write_u32(&mut buf[0..4], self.frame_width);
        LittleEndian::write_u32(&mut buf[4..8], self.frame_height);
        LittleEndian::write_u32(&mut buf[8..12], self.last_ref_frame);
        LittleEndian::write_u32(&mut buf[12..16], self.golden_ref_frame);
        LittleEndian::write_u32(&mut buf[16..20], self.alt_ref_frame);
        LittleEndian::write_u32(&mut buf[20..24], self.out_of_loop_frame);
        LittleEndian::write_u32(&mut buf[24..28], self.pic_fields.0);
        buf[28..31].copy_from_slice(&self.mb_segment_tree_probs);
        buf[31..35].copy_from_slice(&self.loop_filter_level);
        for i in 0..4 {
            buf[35 + i] = self.loop_filter_deltas_ref_frame[i] as u8;
            buf[39 + i] = self.loop_filter_deltas_mode[i] as u8;
        }
        buf[43] = self.prob_skip_false;
        buf[44] = self.prob_intra;
        buf[45] = self.prob_last;
        buf[46] = self.prob_gf;
        buf[47..51].copy_from_slice(&self.y_mode_probs);
        buf[51..54].copy_from_slice(&self.uv_mode_probs);
        buf[54..73].copy_from_slice(&self.mv_probs[0]);
        buf[73..92].copy_from_slice(&self.mv_probs[1]);
        buf[92] = self.bool_coder_ctx.range;
        buf[93] = self.bool_coder_ctx.value;
        buf[94] = self.bool_coder_ctx.count;
        buf
    }
}

// ============================================================================
// Slice parameters
// ============================================================================

/// `VASliceParameterBufferVP8`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceParameterBufferVp8 {
    pub slice_data_size: u32,
    pub slice_data_offset: u32,
    pub slice_data_flag: u32,
    /// Bit offset of the first macroblock from the start of slice data
    pub macroblock_offset: u32,
    /// First partition plus the DCT partitions
    pub num_of_partitions: u8,
    pub partition_size: [u32; MAX_PARTITIONS],
}

impl SliceParameterBufferVp8 {
    pub const SIZE: usize = 72;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(truncated("VP8 slice parameters", Self::SIZE, data.len()));
        }
        Self::read(&mut Cursor::new(data)).map_err(|e| read_err("VP8 slice parameters", e))
    }

    /// Parse `count` consecutive elements
    pub fn parse_array(data: &[u8], count: u32) -> Result<Vec<Self>> {
        let need = Self::SIZE * count as usize;
        if data.len() < need {
            return Err(truncated("VP8 slice parameter array", need, data.len()));
        }
        data.chunks_exact(Self::SIZE)
            .take(count as usize)
            .map(Self::parse)
            .collect()
    }

    fn read(r: &mut Cursor<&[u8]>) -> io::Result<Self> {
        let mut slice = SliceParameterBufferVp8 {
            slice_data_size: r.read_u32::<LittleEndian>()?,
            slice_data_offset: r.read_u32::<LittleEndian>()?,
            slice_data_flag: r.read_u32::<LittleEndian>()?,
            macroblock_offset: r.read_u32::<LittleEndian>()?,
            num_of_partitions: r.read_u8()?,
            ..Default::default()
        };
        r.set_position(20);
        r.read_u32_into::<LittleEndian>(&mut slice.partition_size)?;
        Ok(slice)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        LittleEndian::write_u32(&mut buf[0..4], self.slice_data_size);
        LittleEndian::write_u32(&mut buf[4..8], self.slice_data_offset);
        LittleEndian::write_u32(&mut buf[8..12], self.slice_data_flag);
        LittleEndian::write_u32(&mut buf[12..16], self.macroblock_offset);
        buf[16] = self.num_of_partitions;
        LittleEndian::write_u32_into(&self.partition_size, &mut buf[20..56]);
        buf
    }
}

// ============================================================================
// IQ matrix and probabilities
// ============================================================================

/// `VAIQMatrixBufferVP8`: quantizer indices per segment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IqMatrixBufferVp8 {
    pub quantization_index: [[u16; 6]; 4],
}

impl IqMatrixBufferVp8 {
    pub const SIZE: usize = 64;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(truncated("VP8 IQ matrix", Self::SIZE, data.len()));
        }
        let mut matrix = IqMatrixBufferVp8::default();
        let mut r = Cursor::new(data);
        for segment in matrix.quantization_index.iter_mut() {
            r.read_u16_into::<LittleEndian>(segment)
                .map_err(|e| read_err("VP8 IQ matrix", e))?;
        }
        Ok(matrix)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        for (i, segment) in self.quantization_index.iter().enumerate() {
            LittleEndian::write_u16_into(segment, &mut buf[i * 12..(i + 1) * 12]);
        }
        buf
    }
}

/// `VAProbabilityDataBufferVP8`: coefficient probabilities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbabilityBufferVp8 {
    pub dct_coeff_probs: [u8; COEFF_PROB_SIZE],
}

impl Default for ProbabilityBufferVp8 {
    fn default() -> Self {
        ProbabilityBufferVp8 {
            dct_coeff_probs: [128; COEFF_PROB_SIZE],
        }
    }
}

impl ProbabilityBufferVp8 {
    pub const SIZE: usize = COEFF_PROB_SIZE + 16;

    /// Coefficient table from a mapped buffer, without copying
    pub fn coeff_probs(data: &[u8]) -> Result<&[u8]> {
        data.get(..COEFF_PROB_SIZE)
            .ok_or_else(|| truncated("VP8 probability buffer", COEFF_PROB_SIZE, data.len()))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        buf[..COEFF_PROB_SIZE].copy_from_slice(&self.dct_coeff_probs);
        buf
    }
}
