//! VP8 decode context
//!
//! [`Vp8Decoder`] implements the VA decode entry points for VP8. A frame
//! moves through three phases:
//!
//! 1. `begin_picture` selects the render target and clears per-frame counters
//! 2. `render_picture` translates client buffers, any number of times
//! 3. `end_picture` hands the translated frame to a [`CommandGenerator`]
//!
//! Each `render_picture` call is applied to a staged copy of the frame
//! state and committed only when no buffer in the batch aborts the call. A
//! buffer of an unsupported kind does not abort: the rest of the batch is
//! committed and the call reports the unsupported kind.
//!
//! A frame that consumed pool records and is then abandoned, by calling
//! `begin_picture` again without a successful `end_picture`, has its
//! records retired. Slice data staged before that point must be created
//! again.

use super::pool::Vp8BufferPool;
use super::translate::{translate_iq_matrix, translate_picture, translate_slice, DecodeParams};
use super::va::{IqMatrixBufferVp8, PictureParameterBufferVp8, ProbabilityBufferVp8, SliceParameterBufferVp8};
use crate::error::{Error, Result};
use crate::hwaccel::gpu::{BufferAllocator, GpuBuffer};
use crate::hwaccel::render_target::RenderTargetTable;
use crate::hwaccel::vaapi::{
    BufferType, MediaBuffer, MediaContext, SurfaceHeap, SurfaceId, VaBufferId, VA_INVALID_ID,
};
use crate::hwaccel::{CodecMode, CommandGenerator, DdiDecoder, DecodeJob, DecoderConfig, HwCodecType};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Where the context is in the frame lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// No frame started since the last submission
    Idle,
    /// Between `begin_picture` and `end_picture`
    Receiving,
}

/// A translated VP8 frame, borrowed from the context for submission
#[derive(Debug)]
pub struct Vp8DecodeJob<'a> {
    pub params: &'a DecodeParams,
    pub bitstream: &'a GpuBuffer,
    pub probability: &'a GpuBuffer,
    pub render_target: SurfaceId,
}

/// Adjusted slice parameters to mirror into the pool's slice-control array
struct SliceControlCopy {
    /// Slots reserved in the current pool frame, `None` to reserve at commit
    offset: Option<usize>,
    slices: Vec<SliceParameterBufferVp8>,
}

/// Frame state a `render_picture` call works on before it is committed
struct StagedFrame {
    params: DecodeParams,
    group_index: u32,
    probability: Option<Vec<u8>>,
    slice_control: Option<SliceControlCopy>,
    binds_pool: bool,
    unsupported: Option<BufferType>,
}

/// VP8 decode context
pub struct Vp8Decoder {
    config: DecoderConfig,
    width: u32,
    height: u32,
    mode: Option<CodecMode>,
    render_targets: RenderTargetTable,
    pool: Vp8BufferPool,
    params: DecodeParams,
    group_index: u32,
    state: FrameState,
    /// Pool records consumed by the frame since the last submission
    frame_staged: bool,
    frames_submitted: u64,
}

impl Vp8Decoder {
    /// Create a context; fails if `config` does not validate
    pub fn new(config: DecoderConfig, allocator: Arc<dyn BufferAllocator>) -> Result<Self> {
        config.validate()?;
        Ok(Vp8Decoder {
            render_targets: RenderTargetTable::new(config.render_targets),
            pool: Vp8BufferPool::new(allocator),
            config,
            width: 0,
            height: 0,
            mode: None,
            params: DecodeParams::default(),
            group_index: 0,
            state: FrameState::Idle,
            frame_staged: false,
            frames_submitted: 0,
        })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Committed frame parameters
    pub fn params(&self) -> &DecodeParams {
        &self.params
    }

    pub fn pool(&self) -> &Vp8BufferPool {
        &self.pool
    }

    pub fn render_targets(&self) -> &RenderTargetTable {
        &self.render_targets
    }

    /// Slice-parameter groups consumed in the current frame
    pub fn group_index(&self) -> u32 {
        self.group_index
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    fn expect_receiving(&self, op: &str) -> Result<()> {
        if self.state != FrameState::Receiving {
            return Err(Error::invalid_state(format!("{} outside of a frame", op)));
        }
        Ok(())
    }

    fn render_buffer(
        &self,
        staged: &mut StagedFrame,
        buffer: &MediaBuffer,
        data: &[u8],
        surfaces: &SurfaceHeap,
    ) -> Result<()> {
        match buffer.kind {
            BufferType::SliceData => {
                let slot = buffer.bitstream_slot.ok_or_else(|| {
                    Error::invalid_buffer(format!("slice data buffer {} not staged", buffer.id))
                })?;
                if buffer.pool_frame != Some(self.pool.frame()) {
                    return Err(Error::invalid_buffer(format!(
                        "slice data buffer {} was staged for an earlier frame",
                        buffer.id
                    )));
                }
                staged.params.bitstream_slot = Some(slot);
                staged.params.data_size += buffer.size;
                staged.binds_pool = true;
            }
            BufferType::SliceParameter => {
                if staged.params.num_slices != 0 {
                    // VP8 carries one slice per frame
                    debug!("ignoring extra slice parameter buffer {}", buffer.id);
                    return Ok(());
                }
                if buffer.num_elements == 0 {
                    return Err(Error::invalid_buffer(format!(
                        "slice parameter buffer {} has no elements",
                        buffer.id
                    )));
                }
                let mut slices = SliceParameterBufferVp8::parse_array(data, buffer.num_elements)?;
                let base = self.pool.slice_data_offset(staged.group_index);
                for slice in slices.iter_mut() {
                    slice.slice_data_offset = slice
                        .slice_data_offset
                        .checked_add(base)
                        .ok_or_else(|| Error::invalid_parameter("slice data offset overflows"))?;
                }
                let reserved = match (buffer.slice_control_offset, buffer.pool_frame) {
                    (Some(offset), Some(frame))
                        if frame == self.pool.frame()
                            && offset + slices.len() <= self.pool.slice_controls().len() =>
                    {
                        Some(offset)
                    }
                    _ => None,
                };
                if reserved.is_none() && self.pool.slice_control_free() < slices.len() {
                    return Err(Error::allocation_failed(format!(
                        "no slice control slots left for buffer {}",
                        buffer.id
                    )));
                }
                translate_slice(&mut staged.params, &slices[0])?;
                staged.params.num_slices += buffer.num_elements;
                staged.group_index += 1;
                staged.slice_control = Some(SliceControlCopy {
                    offset: reserved,
                    slices,
                });
                staged.binds_pool = true;
            }
            BufferType::PictureParameter => {
                let pic = PictureParameterBufferVp8::parse(data)?;
                translate_picture(
                    &mut staged.params,
                    &pic,
                    surfaces,
                    &self.render_targets,
                    self.config.reference_slots,
                )?;
            }
            BufferType::Probability => {
                if !self.pool.is_initialized() {
                    return Err(Error::invalid_parameter("probability buffer not allocated"));
                }
                let probs = ProbabilityBufferVp8::coeff_probs(data)?;
                staged.probability = Some(probs.to_vec());
                staged.params.coef_prob_size = buffer.size;
            }
            BufferType::IqMatrix => {
                let matrix = IqMatrixBufferVp8::parse(data)?;
                translate_iq_matrix(&mut staged.params, &matrix)?;
            }
            BufferType::DecodeStreamout => {
                staged.params.stream_out = Some(buffer.id);
                staged.params.stream_out_enabled = true;
            }
            other => {
                warn!("unsupported buffer type {:?} in buffer {}", other, buffer.id);
                staged.unsupported = Some(other);
            }
        }
        Ok(())
    }

    /// Apply a staged frame
    ///
    /// Every pool write here was checked while staging. The probability
    /// table goes last since it cannot be taken back.
    fn commit(&mut self, staged: StagedFrame) -> Result<()> {
        if let Some(copy) = staged.slice_control {
            let offset = match copy.offset {
                Some(offset) => offset,
                None => self.pool.allocate_slice_control(copy.slices.len() as u32)?,
            };
            self.pool.write_slice_controls(offset, &copy.slices)?;
        }
        if let Some(probs) = staged.probability {
            self.pool.write_probability(&probs)?;
        }
        self.frame_staged |= staged.binds_pool;
        self.params = staged.params;
        self.group_index = staged.group_index;
        Ok(())
    }
}

impl DdiDecoder for Vp8Decoder {
    fn codec(&self) -> HwCodecType {
        HwCodecType::VP8
    }

    fn check_resolution(&self, mode: CodecMode, width: u32, height: u32) -> Result<()> {
        let (max_width, max_height) = match mode {
            CodecMode::Vp8Vld => (self.config.max_width, self.config.max_height),
        };
        if width > max_width || height > max_height {
            return Err(Error::ResolutionNotSupported {
                width,
                height,
                max_width,
                max_height,
            });
        }
        Ok(())
    }

    fn context_init(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.mode = Some(CodecMode::Vp8Vld);
    }

    fn init_resources(&mut self) -> Result<()> {
        self.params = DecodeParams::allocated();
        if let Err(e) = self.pool.initialize(&self.config, self.width, self.height) {
            self.params = DecodeParams::default();
            return Err(e);
        }
        info!("vp8 context resources ready for {}x{}", self.width, self.height);
        Ok(())
    }

    fn create_buffer(
        &mut self,
        media: &mut MediaContext,
        kind: BufferType,
        num_elements: u32,
        data: &[u8],
    ) -> Result<VaBufferId> {
        let mut buffer = MediaBuffer::new(kind, num_elements, data.to_vec());
        match kind {
            BufferType::SliceData => {
                let staged = self.pool.stage_slice_data(data)?;
                buffer.bitstream_slot = Some(staged.slot);
                buffer.pool_frame = Some(self.pool.frame());
            }
            BufferType::SliceParameter => {
                self.alloc_slice_control_buffer(&mut buffer)?;
                if let (Some(offset), Ok(slices)) = (
                    buffer.slice_control_offset,
                    SliceParameterBufferVp8::parse_array(data, num_elements),
                ) {
                    self.pool.write_slice_controls(offset, &slices)?;
                }
            }
            _ => {}
        }
        Ok(media.buffers.insert(buffer))
    }

    fn alloc_slice_control_buffer(&mut self, buffer: &mut MediaBuffer) -> Result<()> {
        let offset = self.pool.allocate_slice_control(buffer.num_elements)?;
        buffer.slice_control_offset = Some(offset);
        buffer.pool_frame = Some(self.pool.frame());
        Ok(())
    }

    fn begin_picture(&mut self, media: &MediaContext, render_target: SurfaceId) -> Result<()> {
        if media.surfaces.get(render_target).is_none() {
            return Err(Error::InvalidSurface(render_target));
        }
        if self.state == FrameState::Receiving && self.frame_staged {
            debug!("discarding unsubmitted frame {}", self.pool.frame());
            self.pool.end_frame()?;
        }
        self.frame_staged = false;
        let index = self.render_targets.set_current(render_target)?;
        self.params.begin_frame();
        self.group_index = 0;
        self.state = FrameState::Receiving;
        trace!("begin picture: surface {} frame index {}", render_target, index);
        Ok(())
    }

    fn render_picture(&mut self, media: &mut MediaContext, buffers: &[VaBufferId]) -> Result<()> {
        self.expect_receiving("render_picture")?;

        let mut staged = StagedFrame {
            params: self.params.clone(),
            group_index: self.group_index,
            probability: None,
            slice_control: None,
            binds_pool: false,
            unsupported: None,
        };

        let MediaContext { buffers: heap, surfaces } = media;
        for &id in buffers {
            let outcome = if id == VA_INVALID_ID {
                Err(Error::invalid_buffer("invalid buffer id in render list"))
            } else if heap.get(id).is_none() {
                Err(Error::invalid_buffer(format!("unknown buffer {}", id)))
            } else if heap.map_buffer(id).is_none() {
                Err(Error::invalid_buffer(format!("buffer {} could not be mapped", id)))
            } else {
                let outcome = match heap.get(id) {
                    Some(buffer) => self.render_buffer(&mut staged, buffer, buffer.data(), surfaces),
                    None => Err(Error::invalid_buffer(format!("unknown buffer {}", id))),
                };
                heap.unmap_buffer(id);
                outcome
            };
            if let Err(e) = outcome {
                error!(buffer = id, "render_picture aborted: {}", e);
                return Err(e);
            }
        }

        let unsupported = staged.unsupported;
        self.commit(staged)?;
        match unsupported {
            Some(kind) => Err(Error::UnsupportedBufferType(kind)),
            None => Ok(()),
        }
    }

    fn end_picture(&mut self, generator: &mut dyn CommandGenerator) -> Result<()> {
        self.expect_receiving("end_picture")?;
        if self.params.num_slices == 0 {
            return Err(Error::invalid_parameter("no slice parameters rendered for frame"));
        }
        let render_target = self
            .render_targets
            .current()
            .ok_or_else(|| Error::invalid_state("no render target"))?;
        let slot = self
            .params
            .bitstream_slot
            .ok_or_else(|| Error::invalid_parameter("no slice data rendered for frame"))?;
        let bitstream = self
            .pool
            .bitstream_buffer(slot)
            .ok_or_else(|| Error::invalid_buffer(format!("bitstream slot {} missing", slot)))?;
        let probability = self
            .pool
            .probability_buffer()
            .ok_or_else(|| Error::invalid_parameter("probability buffer not allocated"))?;

        generator.execute(DecodeJob::Vp8(Vp8DecodeJob {
            params: &self.params,
            bitstream,
            probability,
            render_target,
        }))?;

        self.pool.end_frame()?;
        self.frame_staged = false;
        self.frames_submitted += 1;
        self.state = FrameState::Idle;
        debug!("submitted vp8 frame {}", self.frames_submitted);
        Ok(())
    }

    fn destroy_context(&mut self) {
        self.pool.teardown();
        self.params = DecodeParams::default();
        self.render_targets.clear();
        self.group_index = 0;
        self.frame_staged = false;
        self.state = FrameState::Idle;
    }
}
