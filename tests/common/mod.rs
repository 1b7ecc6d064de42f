//! Common test utilities for vaddi integration tests
//!
//! Builders for VP8 client buffers, a recording command generator and an
//! allocator that fails on demand.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use vaddi::codec::vp8::va::{BoolCoderContext, COEFF_PROB_SIZE};
use vaddi::codec::vp8::{
    IqMatrixBufferVp8, PictureParameterBufferVp8, ProbabilityBufferVp8, SliceParameterBufferVp8,
    VaPicFields, Vp8Decoder, Vp8IqMatrix, Vp8PicParams,
};
use vaddi::error::{Error, Result};
use vaddi::hwaccel::gpu::{
    AllocationTracker, BufferAllocator, BufferDesc, Fence, GpuBuffer, HostReservation,
    SystemAllocator,
};
use vaddi::hwaccel::vaapi::{BufferType, MediaContext, SurfaceId, VaBufferId, VA_INVALID_SURFACE};
use vaddi::hwaccel::{CommandGenerator, DdiDecoder, DecodeJob, DecoderConfig};

// ============================================================================
// Client buffer builders
// ============================================================================

/// Picture parameters for a key frame of the given size
pub fn key_frame_params(width: u32, height: u32) -> PictureParameterBufferVp8 {
    PictureParameterBufferVp8 {
        frame_width: width,
        frame_height: height,
        loop_filter_level: [10, 20, 30, 40],
        loop_filter_deltas_ref_frame: [1, 0, -1, -1],
        loop_filter_deltas_mode: [4, -2, 2, 4],
        prob_skip_false: 200,
        prob_intra: 63,
        prob_last: 128,
        prob_gf: 64,
        y_mode_probs: [112, 86, 140, 37],
        uv_mode_probs: [162, 101, 204],
        bool_coder_ctx: BoolCoderContext {
            range: 254,
            value: 0x5a,
            count: 3,
        },
        ..Default::default()
    }
}

/// Picture parameters for an inter frame referencing the given surfaces
pub fn inter_frame_params(
    width: u32,
    height: u32,
    last: SurfaceId,
    golden: SurfaceId,
    alt: SurfaceId,
) -> PictureParameterBufferVp8 {
    let mut fields = VaPicFields::default();
    fields.set_key_frame(1);
    PictureParameterBufferVp8 {
        last_ref_frame: last,
        golden_ref_frame: golden,
        alt_ref_frame: alt,
        pic_fields: fields,
        ..key_frame_params(width, height)
    }
}

/// Single slice with a first partition and `partitions - 1` token partitions
pub fn slice_params(
    partitions: u8,
    data_offset: u32,
    macroblock_bits: u32,
    first_partition: u32,
) -> SliceParameterBufferVp8 {
    let mut partition_size = [0u32; 9];
    partition_size[0] = first_partition;
    for size in partition_size.iter_mut().take(partitions as usize).skip(1) {
        *size = 16;
    }
    SliceParameterBufferVp8 {
        slice_data_size: first_partition + 16 * (partitions as u32 - 1),
        slice_data_offset: data_offset,
        slice_data_flag: 0,
        macroblock_offset: macroblock_bits,
        num_of_partitions: partitions,
        partition_size,
    }
}

pub fn iq_matrix(index: u16) -> IqMatrixBufferVp8 {
    IqMatrixBufferVp8 {
        quantization_index: [[index; 6]; 4],
    }
}

pub fn probabilities(seed: u8) -> ProbabilityBufferVp8 {
    let mut probs = ProbabilityBufferVp8::default();
    for (i, p) in probs.dct_coeff_probs.iter_mut().enumerate() {
        *p = seed.wrapping_add(i as u8);
    }
    probs
}

pub fn coeff_prob_bytes(seed: u8) -> Vec<u8> {
    probabilities(seed).dct_coeff_probs[..COEFF_PROB_SIZE].to_vec()
}

// ============================================================================
// Command generator
// ============================================================================

/// What a submitted VP8 frame looked like
#[derive(Debug, Clone)]
pub struct SubmittedFrame {
    pub pic_params: Vp8PicParams,
    pub iq_matrix: Vp8IqMatrix,
    pub data_size: u32,
    pub num_slices: u32,
    pub coef_prob_size: u32,
    pub bitstream: Vec<u8>,
    pub probabilities: Vec<u8>,
    pub render_target: SurfaceId,
    pub has_last_ref: bool,
}

/// Records every frame
///
/// Hardware reads retire immediately unless `hold_fences` is set, in which
/// case they stay outstanding until `complete_all`.
#[derive(Default)]
pub struct RecordingGenerator {
    pub frames: Vec<SubmittedFrame>,
    pending: Vec<Fence>,
    pub hold_fences: bool,
    pub fail_next: bool,
}

impl RecordingGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retire every outstanding hardware read
    pub fn complete_all(&mut self) {
        for fence in self.pending.drain(..) {
            fence.complete();
        }
    }
}

impl CommandGenerator for RecordingGenerator {
    fn execute(&mut self, job: DecodeJob<'_>) -> Result<()> {
        if self.fail_next {
            self.fail_next = false;
            return Err(Error::invalid_state("generator rejected submission"));
        }
        let DecodeJob::Vp8(job) = job;
        let params = job.params;
        let data_size = params.data_size as usize;
        self.frames.push(SubmittedFrame {
            pic_params: params.pic_params.clone().unwrap_or_default(),
            iq_matrix: params.iq_matrix.unwrap_or_default(),
            data_size: params.data_size,
            num_slices: params.num_slices,
            coef_prob_size: params.coef_prob_size,
            bitstream: job.bitstream.contents()[..data_size].to_vec(),
            probabilities: job.probability.contents()[..COEFF_PROB_SIZE].to_vec(),
            render_target: job.render_target,
            has_last_ref: params.last_ref.is_some(),
        });
        for buffer in [job.bitstream, job.probability] {
            buffer.fence().begin_read();
            if self.hold_fences {
                self.pending.push(buffer.fence().clone());
            } else {
                buffer.fence().complete();
            }
        }
        Ok(())
    }
}

// ============================================================================
// Allocators
// ============================================================================

/// Fails the nth allocation (1-based) of either kind
pub struct FailingAllocator {
    inner: SystemAllocator,
    fail_at: usize,
    calls: AtomicUsize,
}

impl FailingAllocator {
    pub fn new(fail_at: usize) -> Self {
        FailingAllocator {
            inner: SystemAllocator::new(),
            fail_at,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) -> Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_at {
            return Err(Error::allocation_failed("injected failure"));
        }
        Ok(())
    }
}

impl BufferAllocator for FailingAllocator {
    fn create_buffer(&self, desc: &BufferDesc) -> Result<GpuBuffer> {
        self.tick()?;
        self.inner.create_buffer(desc)
    }

    fn reserve_host(&self, name: &'static str, bytes: usize) -> Result<HostReservation> {
        self.tick()?;
        self.inner.reserve_host(name, bytes)
    }

    fn tracker(&self) -> &Arc<AllocationTracker> {
        self.inner.tracker()
    }
}

// ============================================================================
// Decode session
// ============================================================================

/// A VP8 context with its client-side state
pub struct Session {
    pub decoder: Vp8Decoder,
    pub media: MediaContext,
    pub allocator: Arc<SystemAllocator>,
}

impl Session {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_config(width, height, DecoderConfig::default())
    }

    pub fn with_config(width: u32, height: u32, config: DecoderConfig) -> Self {
        let allocator = Arc::new(SystemAllocator::new());
        let mut decoder = Vp8Decoder::new(config, allocator.clone()).expect("valid config");
        decoder.context_init(width, height);
        decoder.init_resources().expect("init resources");
        Session {
            decoder,
            media: MediaContext::new(),
            allocator,
        }
    }

    pub fn surface(&mut self) -> SurfaceId {
        self.media.surfaces.create_surface(64, 64)
    }

    pub fn create(&mut self, kind: BufferType, num_elements: u32, data: &[u8]) -> VaBufferId {
        self.decoder
            .create_buffer(&mut self.media, kind, num_elements, data)
            .expect("create buffer")
    }

    pub fn picture(&mut self, pic: &PictureParameterBufferVp8) -> VaBufferId {
        self.create(BufferType::PictureParameter, 1, &pic.to_bytes())
    }

    pub fn slice(&mut self, slice: &SliceParameterBufferVp8) -> VaBufferId {
        self.create(BufferType::SliceParameter, 1, &slice.to_bytes())
    }

    pub fn slice_data(&mut self, data: &[u8]) -> VaBufferId {
        self.create(BufferType::SliceData, 1, data)
    }

    pub fn iq(&mut self, matrix: &IqMatrixBufferVp8) -> VaBufferId {
        self.create(BufferType::IqMatrix, 1, &matrix.to_bytes())
    }

    pub fn probs(&mut self, probs: &ProbabilityBufferVp8) -> VaBufferId {
        self.create(BufferType::Probability, 1, &probs.to_bytes())
    }

    pub fn render(&mut self, buffers: &[VaBufferId]) -> Result<()> {
        self.decoder.render_picture(&mut self.media, buffers)
    }

    /// Run one complete frame and return what was submitted
    pub fn decode_frame(
        &mut self,
        target: SurfaceId,
        pic: &PictureParameterBufferVp8,
        slice: &SliceParameterBufferVp8,
        data: &[u8],
        generator: &mut RecordingGenerator,
    ) -> Result<SubmittedFrame> {
        let data_id = self.slice_data(data);
        let pic_id = self.picture(pic);
        let slice_id = self.slice(slice);
        let iq_id = self.iq(&iq_matrix(40));
        let prob_id = self.probs(&probabilities(1));

        self.decoder.begin_picture(&self.media, target)?;
        self.render(&[pic_id, iq_id, prob_id, slice_id, data_id])?;
        self.decoder.end_picture(generator)?;
        generator
            .frames
            .last()
            .cloned()
            .ok_or_else(|| Error::invalid_state("nothing submitted"))
    }
}

pub fn no_reference() -> SurfaceId {
    VA_INVALID_SURFACE
}
