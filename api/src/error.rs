//! The low-level error type shared by the image layer.
//!
//! Read up on error handling in Rust using the [`error::Error`](std::error::Error)
//! trait if you haven't already.
//!
//! [`ImgError`] covers failures that can occur while interpreting the raw
//! byte region as a filesystem image: a region too small to hold a header, an
//! offset that does not fall inside the usable area, or a (de)serialization
//! failure while reading/writing an on-image structure. Everything above the
//! image layer (missing paths, name collisions, and so on) is a `mmapfs`-level
//! concept, layered on top of this one with `#[from]`, exactly as the image
//! layer itself layers `io::Error` and `bincode::Error` in here.

use std::io;
use thiserror::Error;

/// Error type returned by the image layer (`Handle` and the on-image types).
#[derive(Error, Debug)]
pub enum ImgError {
    /// I/O failure while backing an image with a file (see [`crate::image::MappedImage`]).
    #[error("I/O error backing the image")]
    Io(#[from] io::Error),

    /// Failure (de)serializing an on-image structure at a given offset.
    #[error("failed to (de)serialize an on-image structure")]
    Serialize(#[from] bincode::Error),

    /// The region handed to [`crate::image::Handle::acquire`] is too small to
    /// even hold the image header.
    #[error("region is too small to hold an image header: {0}")]
    RegionTooSmall(&'static str),

    /// An offset was used that does not fall within the usable region (at or
    /// past `HEADER_SIZE`, and before the end of the mapped bytes), or would
    /// do so only after an access past the end of the requested range.
    #[error("offset out of bounds: {0}")]
    OffsetOutOfBounds(&'static str),

    /// Arithmetic on an offset or size would have overflowed or underflowed.
    #[error("offset/size arithmetic overflow: {0}")]
    ArithmeticOverflow(&'static str),

    /// Catch-all for anything else that does not deserve its own variant.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Generic alias for a `Result` with the error type [`ImgError`].
pub type Result<T> = std::result::Result<T, ImgError>;
