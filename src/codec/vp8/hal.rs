//! VP8 parameter blocks consumed by the decode hardware
//!
//! Fields are kept as plain Rust values; [`Vp8PicParams::to_bytes`] and
//! [`Vp8IqMatrix::to_bytes`] produce the packed little-endian layout the
//! command generator copies into the hardware's state buffers.

use byteorder::{ByteOrder, LittleEndian};

/// Picture reference as the hardware addresses it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecPicture {
    pub frame_idx: u8,
    pub pic_flags: u32,
    pub pic_entry: u8,
}

/// Hardware VP8 picture parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vp8PicParams {
    pub curr_pic: CodecPicture,
    pub frame_width_in_mbs_minus1: u16,
    pub frame_height_in_mbs_minus1: u16,
    pub curr_pic_idx: u8,
    pub last_ref_pic_index: u8,
    pub golden_ref_pic_index: u8,
    pub alt_ref_pic_index: u8,
    pub deblocked_pic_idx: u8,
    pub reserved8_bits: u8,

    /// One for key frames, the inverse of the client's flag
    pub key_frame: bool,
    pub version: u8,
    pub segmentation_enabled: bool,
    pub update_mb_segmentation_map: bool,
    pub update_segment_feature_data: bool,
    pub filter_type: bool,
    pub sign_bias_golden: bool,
    pub sign_bias_alternate: bool,
    pub mb_no_coeff_skip: bool,
    pub mode_ref_lf_delta_update: bool,
    /// log2 of the DCT token partition count
    pub coded_coeff_token_partition: u8,
    pub loop_filter_disable: bool,
    pub loop_filter_adj_enable: bool,

    pub loop_filter_level: [u8; 4],
    pub ref_lf_delta: [i8; 4],
    pub mode_lf_delta: [i8; 4],
    pub sharpness_level: u8,
    pub mb_segment_tree_probs: [u8; 3],
    pub prob_skip_false: u8,
    pub prob_intra: u8,
    pub prob_last: u8,
    pub prob_golden: u8,
    pub y_mode_prob: [u8; 4],
    pub uv_mode_prob: [u8; 3],
    pub reserved_bits1: u8,
    pub mv_update_prob: [[u8; 19]; 2],

    /// Bits of the entropy value already used
    pub p0_entropy_count: u8,
    pub p0_entropy_value: u8,
    pub p0_entropy_range: u32,

    pub first_mb_byte_offset: u32,
    pub partition_size: [u32; 9],
    pub status_report_feedback_number: u32,
}

impl Vp8PicParams {
    pub const SIZE: usize = 140;

    /// Packed picture flags word
    pub fn pic_flags(&self) -> u16 {
        let bit = |b: bool, shift: u16| u16::from(b) << shift;
        bit(self.key_frame, 0)
            | (u16::from(self.version & 0x7) << 1)
            | bit(self.segmentation_enabled, 4)
            | bit(self.update_mb_segmentation_map, 5)
            | bit(self.update_segment_feature_data, 6)
            | bit(self.filter_type, 7)
            | bit(self.sign_bias_golden, 8)
            | bit(self.sign_bias_alternate, 9)
            | bit(self.mb_no_coeff_skip, 10)
            | bit(self.mode_ref_lf_delta_update, 11)
            | (u16::from(self.coded_coeff_token_partition & 0x3) << 12)
            | bit(self.loop_filter_disable, 14)
            | bit(self.loop_filter_adj_enable, 15)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        buf[0] = self.curr_pic.frame_idx;
        LittleEndian::write_u32(&mut buf[4..8], self.curr_pic.pic_flags);
        buf[8] = self.curr_pic.pic_entry;
        LittleEndian::write_u16(&mut buf[12..14], self.frame_width_in_mbs_minus1);
        LittleEndian::write_u16(&mut buf[14..16], self.frame_height_in_mbs_minus1);
        buf[16] = self.curr_pic_idx;
        buf[17] = self.last_ref_pic_index;
        buf[18] = self.golden_ref_pic_index;
        buf[19] = self.alt_ref_pic_index;
        buf[20] = self.deblocked_pic_idx;
        buf[21] = self.reserved8_bits;
        LittleEndian::write_u16(&mut buf[22..24], self.pic_flags());
        buf[24..28].copy_from_slice(&self.loop_filter_level);
        for i in 0..4 {
            buf[28 + i] = self.ref_lf_delta[i] as u8;
            buf[32 + i] = self.mode_lf_delta[i] as u8;
        }
        buf[36] = self.sharpness_level;
        buf[37..40].copy_from_slice(&self.mb_segment_tree_probs);
        buf[40] = self.prob_skip_false;
        buf[41] = self.prob_intra;
        buf[42] = self.prob_last;
        buf[43] = self.prob_golden;
        buf[44..48].copy_from_slice(&self.y_mode_prob);
        buf[48..51].copy_from_slice(&self.uv_mode_prob);
        buf[51] = self.reserved_bits1;
        buf[52..71].copy_from_slice(&self.mv_update_prob[0]);
        buf[71..90].copy_from_slice(&self.mv_update_prob[1]);
        buf[90] = self.p0_entropy_count;
        buf[91] = self.p0_entropy_value;
        LittleEndian::write_u32(&mut buf[92..96], self.p0_entropy_range);
        LittleEndian::write_u32(&mut buf[96..100], self.first_mb_byte_offset);
        LittleEndian::write_u32_into(&self.partition_size, &mut buf[100..136]);
        LittleEndian::write_u32(&mut buf[136..140], self.status_report_feedback_number);
        buf
    }
}

/// Hardware VP8 dequantization matrix, one row per segment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Vp8IqMatrix {
    pub quantization_values: [[u16; 6]; 4],
}

impl Vp8IqMatrix {
    pub const SIZE: usize = 48;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        for (i, segment) in self.quantization_values.iter().enumerate() {
            LittleEndian::write_u16_into(segment, &mut buf[i * 12..(i + 1) * 12]);
        }
        buf
    }
}
