//! Error types for the VA-API decode layer

use crate::hwaccel::vaapi::{BufferType, VaStatus};
use thiserror::Error;

/// Result type alias for decode-layer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the decode layer
///
/// Every variant maps onto exactly one VA status code through
/// [`Error::status`], which is what a VA driver entry point hands back to
/// the client.
#[derive(Error, Debug)]
pub enum Error {
    /// A required parameter or internal storage was missing or malformed
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A buffer id did not resolve, could not be mapped, or carried no elements
    #[error("Invalid buffer: {0}")]
    InvalidBuffer(String),

    /// A surface id did not resolve to a live surface
    #[error("Invalid surface: {0}")]
    InvalidSurface(u32),

    /// A buffer of a kind this decoder does not handle was rendered
    #[error("Unsupported buffer type: {0:?}")]
    UnsupportedBufferType(BufferType),

    /// The profile has no decode mode on this hardware
    #[error("Unsupported profile: {0}")]
    UnsupportedProfile(String),

    /// Requested frame dimensions exceed the hardware limit
    #[error("Resolution {width}x{height} exceeds maximum {max_width}x{max_height}")]
    ResolutionNotSupported {
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },

    /// GPU object creation, host reservation or lock failure
    #[error("Allocation failed: {0}")]
    AllocationFailed(String),

    /// Operation called in the wrong phase of the frame lifecycle
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

impl Error {
    /// Create an invalid parameter error
    pub fn invalid_parameter<S: Into<String>>(msg: S) -> Self {
        Error::InvalidParameter(msg.into())
    }

    /// Create an invalid buffer error
    pub fn invalid_buffer<S: Into<String>>(msg: S) -> Self {
        Error::InvalidBuffer(msg.into())
    }

    /// Create an allocation failure
    pub fn allocation_failed<S: Into<String>>(msg: S) -> Self {
        Error::AllocationFailed(msg.into())
    }

    /// Create an unsupported profile error
    pub fn unsupported_profile<S: Into<String>>(msg: S) -> Self {
        Error::UnsupportedProfile(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// VA status code reported to the client for this error
    pub fn status(&self) -> VaStatus {
        match self {
            Error::InvalidParameter(_) => VaStatus::InvalidParameter,
            Error::InvalidBuffer(_) => VaStatus::InvalidBuffer,
            Error::InvalidSurface(_) => VaStatus::InvalidSurface,
            Error::UnsupportedBufferType(_) => VaStatus::UnsupportedBufferType,
            Error::UnsupportedProfile(_) => VaStatus::UnsupportedProfile,
            Error::ResolutionNotSupported { .. } => VaStatus::ResolutionNotSupported,
            Error::AllocationFailed(_) => VaStatus::AllocationFailed,
            Error::InvalidState(_) => VaStatus::OperationFailed,
            Error::Config(_) | Error::Init(_) => VaStatus::OperationFailed,
        }
    }

    /// Whether the frame survives this error
    ///
    /// Only an unsupported buffer kind leaves the rest of the render call
    /// applied; every other error discards the call.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::UnsupportedBufferType(_))
    }
}

/// Collapse a decode-layer result into the status the client sees
pub fn to_status<T>(result: &Result<T>) -> VaStatus {
    match result {
        Ok(_) => VaStatus::Success,
        Err(e) => e.status(),
    }
}
