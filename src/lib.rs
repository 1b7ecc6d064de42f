//! vaddi - VA-API decode parameter translation in Rust
//!
//! vaddi sits between a VA-API client and a hardware video decoder. It
//! receives the client's parameter, matrix, probability and slice buffers,
//! translates them into the parameter blocks the decode hardware consumes,
//! and manages the GPU buffer pool those blocks and the compressed data
//! live in.
//!
//! # Architecture
//!
//! - `hwaccel`: VA protocol objects, GPU buffers, the render-target table
//!   and the codec-agnostic decode context trait
//! - `codec`: per-codec buffer layouts, translators and decode contexts
//! - `error`: error type and its VA status mapping

pub mod codec;
pub mod error;
pub mod hwaccel;

pub use error::{Error, Result};
pub use hwaccel::{create_ddi_decoder, CommandGenerator, DdiDecoder, DecodeJob, DecoderConfig};

/// vaddi version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;

/// Configuration for the vaddi library
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Enable verbose logging
    pub verbose: bool,
    /// Enable debug output
    pub debug: bool,
    /// Explicit filter directive, overriding `verbose` and `debug`
    pub log_filter: Option<String>,
}

/// Initialize the vaddi library with the given configuration
///
/// Installs a global `tracing` subscriber when logging is requested. A
/// subscriber installed earlier by the host application is left in place.
pub fn init(config: Config) -> Result<()> {
    let level = match (&config.log_filter, config.debug, config.verbose) {
        (Some(filter), _, _) => filter.clone(),
        (None, true, _) => "debug".to_string(),
        (None, false, true) => "info".to_string(),
        (None, false, false) => return Ok(()),
    };

    let filter = tracing_subscriber::EnvFilter::try_new(&level)
        .map_err(|e| Error::Init(format!("Invalid log filter '{}': {}", level, e)))?;

    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }

    Ok(())
}
