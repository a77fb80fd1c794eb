mod grounding_dino;
mod tokenizer;

pub use grounding_dino::GroundingDino;
pub use tokenizer::{EncodedPrompt, WordPieceTokenizer};

use crate::error::{Error, Result};
use crate::geometry::BoundingBox;
use image::RgbImage;
use std::path::Path;
use std::sync::Arc;

/// One candidate region returned by a detector.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    /// Vocabulary phrase(s) the region matched; may be empty when no single
    /// token cleared the text threshold.
    pub label: String,
}

/// Trait for zero-shot, text-prompted object detectors
///
/// Implementations hold process-wide model state and are shared read-only
/// across requests, so `detect` takes `&self` and must be safe to call from
/// several threads.
pub trait Detector: Send + Sync {
    /// Find regions of `image` matching any phrase of `vocabulary`
    ///
    /// # Arguments
    /// * `image` - Input RGB image
    /// * `vocabulary` - Non-empty list of label phrases
    /// * `box_threshold` - Minimum region confidence, in (0, 1]
    /// * `text_threshold` - Minimum per-token confidence for a phrase to be
    ///   reported as the label, in (0, 1]
    ///
    /// # Returns
    /// * Possibly empty detections, every box inside `image`. Finding nothing
    ///   is not an error.
    fn detect(
        &self,
        image: &RgbImage,
        vocabulary: &[String],
        box_threshold: f32,
        text_threshold: f32,
    ) -> Result<Vec<Detection>>;
}

/// Create the default detector (Grounding DINO)
pub fn create_default_detector(
    model_path: impl AsRef<Path>,
    vocab_path: impl AsRef<Path>,
) -> anyhow::Result<Arc<dyn Detector>> {
    let tokenizer = WordPieceTokenizer::from_file(vocab_path)?;
    let model = GroundingDino::new(model_path, tokenizer)?;
    Ok(Arc::new(model))
}

/// Thresholds are probabilities in (0, 1].
pub(crate) fn check_threshold(name: &str, value: f32) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "{name} must be in (0, 1], got {value}"
        )))
    }
}
