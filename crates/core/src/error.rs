//! Error types for the conversion pipeline.

use thiserror::Error;

/// Errors raised while reconstructing and serializing a document.
///
/// The CLI collapses everything to a single non-zero exit code, but the
/// variants stay separate so library callers can tell a broken event
/// stream from an output failure.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed event stream: {0}")]
    BadEventStream(String),

    #[error("image encode error: {0}")]
    ImageEncode(String),

    #[error("picture sequence exhausted after {0:#06X} pictures")]
    PictureOverflow(u32),
}

/// Convenience Result type alias for ConvertError.
pub type Result<T> = std::result::Result<T, ConvertError>;
