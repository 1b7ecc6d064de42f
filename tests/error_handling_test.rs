//! Error handling tests for vaddi
//!
//! These tests verify that the VP8 context handles malformed, truncated or
//! garbage client buffers without panicking. Every failure must surface as
//! an `Error` carrying the right VA status.

use std::panic;
use vaddi::codec::vp8::{IqMatrixBufferVp8, PictureParameterBufferVp8, SliceParameterBufferVp8};
use vaddi::error::Error;
use vaddi::hwaccel::vaapi::{BufferType, VaStatus};
use vaddi::hwaccel::DdiDecoder;

// Include common test utilities
#[path = "common/mod.rs"]
mod common;

use common::*;

// ============================================================================
// Helper Functions
// ============================================================================

/// Test that a closure does not panic
fn assert_no_panic<F: FnOnce() -> R + panic::UnwindSafe, R>(f: F, description: &str) {
    let result = panic::catch_unwind(f);
    assert!(result.is_ok(), "Panic occurred: {}", description);
}

/// Pseudo-random bytes from a simple LCG
fn garbage(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) as u8
        })
        .collect()
}

fn render_status(kind: BufferType, num_elements: u32, data: &[u8]) -> Result<(), Error> {
    let mut session = Session::new(64, 64);
    let target = session.surface();
    session.decoder.begin_picture(&session.media, target)?;
    let id = session
        .decoder
        .create_buffer(&mut session.media, kind, num_elements, data)?;
    session.render(&[id])
}

// ============================================================================
// Truncated buffers
// ============================================================================

#[test]
fn test_truncated_picture_parameters() {
    let bytes = key_frame_params(64, 64).to_bytes();
    let err = render_status(BufferType::PictureParameter, 1, &bytes[..64]).unwrap_err();
    assert_eq!(err.status(), VaStatus::InvalidParameter);
}

#[test]
fn test_truncated_slice_parameters() {
    let bytes = slice_params(2, 0, 0, 8).to_bytes();
    let err = render_status(BufferType::SliceParameter, 1, &bytes[..40]).unwrap_err();
    assert_eq!(err.status(), VaStatus::InvalidParameter);
}

#[test]
fn test_slice_parameters_claim_more_elements_than_present() {
    let bytes = slice_params(2, 0, 0, 8).to_bytes();
    let mut session = Session::new(64, 64);
    let target = session.surface();
    session.decoder.begin_picture(&session.media, target).unwrap();
    let id = session.create(BufferType::SliceParameter, 3, &bytes);
    let err = session.render(&[id]).unwrap_err();
    assert_eq!(err.status(), VaStatus::InvalidParameter);
}

#[test]
fn test_truncated_iq_matrix() {
    let err = render_status(BufferType::IqMatrix, 1, &[1; 20]).unwrap_err();
    assert_eq!(err.status(), VaStatus::InvalidParameter);
}

#[test]
fn test_truncated_probabilities() {
    let err = render_status(BufferType::Probability, 1, &[1; 512]).unwrap_err();
    assert_eq!(err.status(), VaStatus::InvalidParameter);
}

#[test]
fn test_empty_buffer_is_invalid_buffer() {
    let err = render_status(BufferType::PictureParameter, 1, &[]).unwrap_err();
    assert_eq!(err.status(), VaStatus::InvalidBuffer);
}

#[test]
fn test_zero_element_slice_parameters() {
    let bytes = slice_params(2, 0, 0, 8).to_bytes();
    let err = render_status(BufferType::SliceParameter, 0, &bytes).unwrap_err();
    assert_eq!(err.status(), VaStatus::InvalidBuffer);
}

// ============================================================================
// Malformed values
// ============================================================================

#[test]
fn test_zero_frame_dimensions() {
    let pic = PictureParameterBufferVp8 {
        frame_width: 0,
        frame_height: 16,
        ..Default::default()
    };
    let err = render_status(BufferType::PictureParameter, 1, &pic.to_bytes()).unwrap_err();
    assert_eq!(err.status(), VaStatus::InvalidParameter);
}

#[test]
fn test_partition_count_out_of_range() {
    for partitions in [0u8, 10, 255] {
        let slice = SliceParameterBufferVp8 {
            num_of_partitions: partitions,
            partition_size: [4; 9],
            ..Default::default()
        };
        let err = render_status(BufferType::SliceParameter, 1, &slice.to_bytes()).unwrap_err();
        assert_eq!(err.status(), VaStatus::InvalidParameter, "{} partitions", partitions);
    }
}

#[test]
fn test_iq_indices_out_of_range_are_clamped() {
    let matrix = IqMatrixBufferVp8 {
        quantization_index: [[u16::MAX; 6], [128; 6], [1000; 6], [0; 6]],
    };
    assert!(render_status(BufferType::IqMatrix, 1, &matrix.to_bytes()).is_ok());
}

// ============================================================================
// Garbage input
// ============================================================================

#[test]
fn test_garbage_buffers_do_not_panic() {
    let kinds = [
        BufferType::PictureParameter,
        BufferType::SliceParameter,
        BufferType::IqMatrix,
        BufferType::Probability,
        BufferType::SliceData,
        BufferType::DecodeStreamout,
        BufferType::Other(1234),
    ];
    for (i, kind) in kinds.iter().enumerate() {
        for len in [1usize, 71, 72, 112, 1072, 4096] {
            let data = garbage(len, (i * 31 + len) as u32);
            let kind = *kind;
            assert_no_panic(
                move || {
                    let _ = render_status(kind, 1, &data);
                },
                &format!("{:?} with {} garbage bytes", kind, len),
            );
        }
    }
}

#[test]
fn test_garbage_frame_then_valid_frame() {
    let mut session = Session::new(32, 32);
    let target = session.surface();
    let mut generator = RecordingGenerator::new();

    session.decoder.begin_picture(&session.media, target).unwrap();
    let junk = session.create(BufferType::PictureParameter, 1, &garbage(112, 7));
    let _ = session.render(&[junk]);

    let frame = session
        .decode_frame(
            target,
            &key_frame_params(32, 32),
            &slice_params(5, 0, 3, 12),
            &[9; 40],
            &mut generator,
        )
        .unwrap();
    assert_eq!(frame.pic_params.coded_coeff_token_partition, 2);
    assert_eq!(frame.pic_params.frame_width_in_mbs_minus1, 1);
}
