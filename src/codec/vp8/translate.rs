//! Translation of VP8 client buffers into hardware parameters
//!
//! Each translator reads one client structure and writes its part of
//! [`DecodeParams`]. Validation happens before the first write, so a
//! translator that returns an error leaves the parameters untouched.

use super::hal::{CodecPicture, Vp8IqMatrix, Vp8PicParams};
use super::quant::SegmentDequant;
use super::va::{IqMatrixBufferVp8, PictureParameterBufferVp8, SliceParameterBufferVp8, MAX_PARTITIONS};
use crate::error::{Error, Result};
use crate::hwaccel::common::MAX_REFERENCE_SLOTS;
use crate::hwaccel::render_target::{RenderTargetTable, INVALID_FRAME_INDEX};
use crate::hwaccel::vaapi::{MediaSurface, ResourceRef, SurfaceHeap, VaBufferId};
use tracing::trace;

/// Token partition count the hardware encodes as 3 rather than by halving
const MAX_TOKEN_PARTITIONS: u8 = 8;

/// Per-frame state handed to the command generator
///
/// Parameter storage is `None` until the context's resources are allocated;
/// translators treat that as an invalid parameter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeParams {
    pub pic_params: Option<Vp8PicParams>,
    pub iq_matrix: Option<Vp8IqMatrix>,
    /// Bytes of compressed data bound to the frame
    pub data_size: u32,
    /// Slices announced by slice-parameter buffers
    pub num_slices: u32,
    /// Bitstream slot the frame's data sits in
    pub bitstream_slot: Option<usize>,
    /// Coefficient probability bytes supplied this frame
    pub coef_prob_size: u32,
    pub last_ref: Option<ResourceRef>,
    pub golden_ref: Option<ResourceRef>,
    pub alt_ref: Option<ResourceRef>,
    pub stream_out: Option<VaBufferId>,
    pub stream_out_enabled: bool,
}

impl DecodeParams {
    /// Storage for a freshly initialised context
    pub fn allocated() -> Self {
        DecodeParams {
            pic_params: Some(Vp8PicParams::default()),
            iq_matrix: Some(Vp8IqMatrix::default()),
            ..Default::default()
        }
    }

    /// Clear per-frame counters, keeping parameter storage
    pub fn begin_frame(&mut self) {
        self.data_size = 0;
        self.num_slices = 0;
        self.bitstream_slot = None;
        self.coef_prob_size = 0;
        self.stream_out = None;
        self.stream_out_enabled = false;
    }
}

fn clamp_reference(index: u32, reference_slots: u32) -> u8 {
    let last = reference_slots.clamp(1, MAX_REFERENCE_SLOTS) - 1;
    // last < MAX_REFERENCE_SLOTS, so the cast is lossless
    index.min(last) as u8
}

fn mbs_minus1(pixels: u32, what: &str) -> Result<u16> {
    if pixels == 0 {
        return Err(Error::invalid_parameter(format!("frame {} is zero", what)));
    }
    u16::try_from((pixels - 1) / 16)
        .map_err(|_| Error::invalid_parameter(format!("frame {} {} out of range", what, pixels)))
}

/// Translate client picture parameters
///
/// Reference surfaces are only looked up for inter frames. A reference that
/// does not resolve, or resolves outside the reference slots, is clamped to
/// the last slot.
pub fn translate_picture(
    params: &mut DecodeParams,
    pic: &PictureParameterBufferVp8,
    surfaces: &SurfaceHeap,
    render_targets: &RenderTargetTable,
    reference_slots: u32,
) -> Result<()> {
    if params.pic_params.is_none() {
        return Err(Error::invalid_parameter("picture parameter storage not allocated"));
    }

    let fields = pic.pic_fields;
    let inter_frame = fields.key_frame() != 0;
    let lookup = |id| {
        if inter_frame {
            surfaces.get(id)
        } else {
            None
        }
    };
    let last = lookup(pic.last_ref_frame);
    let golden = lookup(pic.golden_ref_frame);
    let alt = lookup(pic.alt_ref_frame);

    let curr_idx = render_targets.frame_index(render_targets.current());
    if curr_idx == INVALID_FRAME_INDEX {
        return Err(Error::invalid_parameter("current render target not registered"));
    }
    let reference = |surface: Option<&MediaSurface>| {
        clamp_reference(
            render_targets.frame_index(surface.map(|s| s.id)),
            reference_slots,
        )
    };

    let width_mbs = mbs_minus1(pic.frame_width, "width")?;
    let height_mbs = mbs_minus1(pic.frame_height, "height")?;
    let curr_idx = u8::try_from(curr_idx)
        .map_err(|_| Error::invalid_parameter(format!("frame index {} out of range", curr_idx)))?;

    let hw = Vp8PicParams {
        curr_pic: CodecPicture {
            frame_idx: curr_idx,
            ..Default::default()
        },
        frame_width_in_mbs_minus1: width_mbs,
        frame_height_in_mbs_minus1: height_mbs,
        curr_pic_idx: curr_idx,
        last_ref_pic_index: reference(last),
        golden_ref_pic_index: reference(golden),
        alt_ref_pic_index: reference(alt),
        deblocked_pic_idx: curr_idx,
        reserved8_bits: 0,

        key_frame: !inter_frame,
        version: fields.version() as u8,
        segmentation_enabled: fields.segmentation_enabled() != 0,
        update_mb_segmentation_map: fields.update_mb_segmentation_map() != 0,
        update_segment_feature_data: fields.update_segment_feature_data() != 0,
        filter_type: fields.filter_type() != 0,
        sign_bias_golden: fields.sign_bias_golden() != 0,
        sign_bias_alternate: fields.sign_bias_alternate() != 0,
        mb_no_coeff_skip: fields.mb_no_coeff_skip() != 0,
        mode_ref_lf_delta_update: fields.mode_ref_lf_delta_update() != 0,
        loop_filter_disable: fields.loop_filter_disable() != 0,
        loop_filter_adj_enable: fields.loop_filter_adj_enable() != 0,

        loop_filter_level: pic.loop_filter_level,
        ref_lf_delta: pic.loop_filter_deltas_ref_frame,
        mode_lf_delta: pic.loop_filter_deltas_mode,
        sharpness_level: fields.sharpness_level() as u8,
        mb_segment_tree_probs: pic.mb_segment_tree_probs,
        prob_skip_false: pic.prob_skip_false,
        prob_intra: pic.prob_intra,
        prob_last: pic.prob_last,
        prob_golden: pic.prob_gf,
        y_mode_prob: pic.y_mode_probs,
        uv_mode_prob: pic.uv_mode_probs,
        mv_update_prob: pic.mv_probs,

        // the hardware wants bits already used, the client supplies bits remaining
        p0_entropy_count: 8u8.wrapping_sub(pic.bool_coder_ctx.count) & 0x7,
        p0_entropy_value: pic.bool_coder_ctx.value,
        p0_entropy_range: u32::from(pic.bool_coder_ctx.range),
        status_report_feedback_number: 0,

        ..params.pic_params.clone().unwrap_or_default()
    };

    trace!(
        "picture: curr {} last {} golden {} alt {} key {}",
        hw.curr_pic_idx,
        hw.last_ref_pic_index,
        hw.golden_ref_pic_index,
        hw.alt_ref_pic_index,
        hw.key_frame
    );

    params.pic_params = Some(hw);
    params.last_ref = last.map(|s| s.resource());
    params.golden_ref = golden.map(|s| s.resource());
    params.alt_ref = alt.map(|s| s.resource());
    Ok(())
}

/// Translate the first slice of a slice-parameter buffer
///
/// `slice.slice_data_offset` must already be relative to the start of the
/// frame's bitstream slot.
pub fn translate_slice(params: &mut DecodeParams, slice: &SliceParameterBufferVp8) -> Result<()> {
    let hw = params
        .pic_params
        .as_mut()
        .ok_or_else(|| Error::invalid_parameter("picture parameter storage not allocated"))?;

    if slice.num_of_partitions == 0 || slice.num_of_partitions as usize > MAX_PARTITIONS {
        return Err(Error::invalid_parameter(format!(
            "{} partitions out of range",
            slice.num_of_partitions
        )));
    }
    let token_partitions = slice.num_of_partitions - 1;
    let coded_partitions = if token_partitions != MAX_TOKEN_PARTITIONS {
        token_partitions >> 1
    } else {
        3
    };

    let first_mb_byte_offset = slice
        .slice_data_offset
        .checked_add(slice.macroblock_offset.div_ceil(8))
        .ok_or_else(|| Error::invalid_parameter("first macroblock offset overflows"))?;

    let mut partition_size = slice.partition_size;
    // the first partition's size includes the partial byte the header ended in
    if slice.macroblock_offset & 7 == 0 {
        partition_size[0] = partition_size[0]
            .checked_sub(1)
            .ok_or_else(|| Error::invalid_parameter("first partition is empty"))?;
    }

    hw.coded_coeff_token_partition = coded_partitions;
    hw.first_mb_byte_offset = first_mb_byte_offset;
    hw.partition_size = partition_size;
    Ok(())
}

/// Translate quantizer indices into the hardware dequantization matrix
pub fn translate_iq_matrix(params: &mut DecodeParams, matrix: &IqMatrixBufferVp8) -> Result<()> {
    let hw = params
        .iq_matrix
        .as_mut()
        .ok_or_else(|| Error::invalid_parameter("IQ matrix storage not allocated"))?;

    for (out, indices) in hw
        .quantization_values
        .iter_mut()
        .zip(matrix.quantization_index.iter())
    {
        *out = SegmentDequant::from_indices(indices).to_array();
    }
    Ok(())
}
