mod sam2;

pub use sam2::Sam2;

use crate::error::{Error, Result};
use crate::geometry::{BoundingBox, Mask};
use image::RgbImage;
use std::path::Path;
use std::sync::Arc;

/// Trait for promptable segmentation models
/// Allows swapping the SAM backend for a deterministic stand-in in tests
pub trait Segmenter: Send + Sync {
    /// Segment the object inside one box
    ///
    /// # Arguments
    /// * `image` - Input RGB image
    /// * `bbox` - Box prompt, inside `image`
    ///
    /// # Returns
    /// * A mask with the same dimensions as `image`, or `None` when the model
    ///   declines to produce one for this box
    fn segment(&self, image: &RgbImage, bbox: &BoundingBox) -> Result<Option<Mask>>;
}

/// Create the default segmentation model (SAM 2.1)
pub fn create_default_segmenter(model_path: impl AsRef<Path>) -> anyhow::Result<Arc<dyn Segmenter>> {
    let model = Sam2::new(model_path)?;
    Ok(Arc::new(model))
}

/// Reject prompts that do not fit the image they are meant for.
pub(crate) fn check_box(image: &RgbImage, bbox: &BoundingBox) -> Result<()> {
    let (width, height) = image.dimensions();
    if bbox.fits(width, height) {
        Ok(())
    } else {
        Err(Error::InvalidBox {
            x1: bbox.x1(),
            y1: bbox.y1(),
            x2: bbox.x2(),
            y2: bbox.y2(),
            width,
            height,
        })
    }
}
