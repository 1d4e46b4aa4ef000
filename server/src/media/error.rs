//! Media Errors

use thiserror::Error;

/// Errors raised while decoding, deriving or encoding images.
#[derive(Error, Debug)]
pub enum MediaError {
    /// Payload exceeds the configured processing limit.
    #[error("File too large for processing: {0} bytes")]
    TooLarge(usize),

    /// The file kind has no raster codec.
    #[error("Unsupported kind: {0}")]
    UnsupportedKind(String),

    /// Bytes could not be parsed as the expected image format.
    #[error("Image decode failed: {0}")]
    DecodeFailed(String),

    /// Re-encoding a derived image failed.
    #[error("Image encoding failed: {0}")]
    EncodeFailed(String),

    /// Requested frame does not exist.
    #[error("Frame {index} out of range ({count} frames)")]
    FrameOutOfRange {
        /// Requested frame index.
        index: usize,
        /// Number of decoded frames.
        count: usize,
    },
}
