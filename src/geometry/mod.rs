//! Box and mask algebra shared by the detector, segmenter and compositor.

mod bbox;
mod mask;

pub use bbox::BoundingBox;
pub use mask::{CropRegion, Mask};
