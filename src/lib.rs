//! Garment cutout extraction: detect clothing in a photo, segment each
//! region, and composite the union into one cropped transparent PNG.

pub mod compositor;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod preprocess;
pub mod response;
pub mod segmentation;
mod session;

pub use compositor::{merge_and_composite, Cutout, EncodedCutout};
pub use detection::{Detection, Detector};
pub use error::{Error, Result};
pub use geometry::{BoundingBox, CropRegion, Mask};
pub use pipeline::{Pipeline, PipelineConfig};
pub use response::CutoutResponse;
pub use segmentation::Segmenter;
