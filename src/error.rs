//! Error taxonomy for the cutout pipeline.

use std::time::Duration;

/// Errors produced while turning a photo into a garment cutout.
///
/// `NoDetections`, `NoMasks` and `EmptyMask` are expected outcomes ("nothing
/// found"). Everything else is a failure of the request itself.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The detector found no clothing regions above threshold.
    #[error("No clothes detected")]
    NoDetections,

    /// Regions were detected but the segmenter produced no mask for any of them.
    #[error("No masks generated")]
    NoMasks,

    /// Masks were produced but their union contains no foreground pixel.
    #[error("No masks generated (combined mask is empty)")]
    EmptyMask,

    /// A model backend could not be loaded or invoked.
    #[error("model unavailable: {0:#}")]
    ModelUnavailable(anyhow::Error),

    /// The request exceeded its processing budget.
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The uploaded bytes could not be decoded as an image.
    #[error("invalid image: {0}")]
    InvalidImage(#[source] image::ImageError),

    /// A bounding box violates `x1 < x2`, `y1 < y2` or lies outside the image.
    #[error("invalid bounding box ({x1}, {y1}, {x2}, {y2}) for {width}x{height} image")]
    InvalidBox {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        width: u32,
        height: u32,
    },

    /// A mask does not share the dimensions of the image it belongs to.
    #[error("mask is {mask_width}x{mask_height} but image is {width}x{height}")]
    DimensionMismatch {
        mask_width: u32,
        mask_height: u32,
        width: u32,
        height: u32,
    },

    /// A caller-supplied argument is out of range.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The cutout could not be encoded as PNG.
    #[error("failed to encode cutout: {0}")]
    Encode(#[source] image::ImageError),

    /// An inference worker panicked or was cancelled.
    #[error("inference task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

impl Error {
    /// True for outcomes that mean "nothing usable in this photo" rather than
    /// a system failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NoDetections | Error::NoMasks | Error::EmptyMask)
    }

    /// Message placed in the `error` field of the wire response.
    pub fn user_message(&self) -> String {
        match self {
            Error::NoDetections => "No clothes detected".to_string(),
            Error::NoMasks | Error::EmptyMask => "No masks generated".to_string(),
            Error::Timeout(_) => "Request timed out, please try again later".to_string(),
            Error::InvalidImage(_) => "Uploaded file is not a supported image".to_string(),
            _ => "Segmentation service unavailable, please try again later".to_string(),
        }
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
