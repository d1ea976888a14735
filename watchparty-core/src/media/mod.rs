//! Media Streaming
//!
//! Serves byte windows of a single media file with HTTP partial-content
//! semantics. Everything here is stateless and recomputed per request.

mod asset;
mod range;
mod stream;

pub use asset::*;
pub use range::*;
pub use stream::*;

use thiserror::Error;

/// Errors that can occur while serving media
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Video not found")]
    NotFound,

    #[error("Requested range not satisfiable (size {size})")]
    RangeNotSatisfiable { size: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
