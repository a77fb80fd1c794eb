use super::{check_box, Segmenter};
use crate::error::{Error, Result};
use crate::geometry::{BoundingBox, Mask};
use crate::preprocess::{Preprocessor, ResizeMode};
use crate::session::SharedSession;
use anyhow::Context;
use image::{imageops::FilterType, RgbImage};
use ndarray::{Array2, Array3, ArrayView2, Axis, Ix4};
use ort::value::Tensor;
use std::path::Path;

/// Side of the square model input, also the prompt coordinate space.
const INPUT_SIZE: u32 = 1024;

/// Logits above this are foreground.
const MASK_THRESHOLD: f32 = 0.0;

/// SAM point labels marking the two corners of a box prompt.
const BOX_TOP_LEFT: f32 = 2.0;
const BOX_BOTTOM_RIGHT: f32 = 3.0;

/// SAM 2.1 promptable segmenter
///
/// Expects a single ONNX graph taking `image` [1,3,1024,1024], `point_coords`
/// [1,N,2] and `point_labels` [1,N], and returning mask logits
/// [1,K,1024,1024] with `iou_predictions` [1,K].
pub struct Sam2 {
    session: SharedSession,
    preprocessor: Preprocessor,
}

impl Sam2 {
    /// Create a new SAM 2.1 model from an ONNX file
    ///
    /// # Default Configuration
    /// - Input stretched to 1024x1024 (Lanczos3)
    /// - ImageNet normalization
    pub fn new<P: AsRef<Path>>(model_path: P) -> anyhow::Result<Self> {
        let session = SharedSession::load("SAM 2.1", model_path.as_ref())?;
        let preprocessor = Preprocessor::new(
            ResizeMode::Exact {
                width: INPUT_SIZE,
                height: INPUT_SIZE,
            },
            FilterType::Lanczos3,
        );

        Ok(Self {
            session,
            preprocessor,
        })
    }

    /// Logits of the best-scoring mask candidate, in model space.
    fn infer(&self, image: &RgbImage, bbox: &BoundingBox) -> anyhow::Result<Option<Array2<f32>>> {
        let input_tensor = self.preprocessor.preprocess(image)?;

        let (width, height) = image.dimensions();
        let [x1, y1, x2, y2] = bbox.scaled(
            INPUT_SIZE as f32 / width as f32,
            INPUT_SIZE as f32 / height as f32,
        );
        let point_coords = Array3::from_shape_vec((1, 2, 2), vec![x1, y1, x2, y2])?;
        let point_labels = Array2::from_shape_vec((1, 2), vec![BOX_TOP_LEFT, BOX_BOTTOM_RIGHT])?;

        let inputs = ort::inputs![
            "image" => Tensor::from_array(input_tensor)?,
            "point_coords" => Tensor::from_array(point_coords)?,
            "point_labels" => Tensor::from_array(point_labels)?,
        ];

        let mut session = self.session.lock()?;
        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = session
            .run(inputs)
            .context("Failed to run segmenter inference")?;

        let iou: Vec<f32> = outputs["iou_predictions"]
            .try_extract_array::<f32>()?
            .iter()
            .copied()
            .collect();
        let masks = outputs["masks"]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?;

        let candidates = masks.shape()[1];
        let Some(best) = best_candidate(&iou[..candidates.min(iou.len())]) else {
            return Ok(None);
        };
        tracing::debug!("Chose mask candidate {} of {} (iou {:.3})", best, candidates, iou[best]);

        Ok(Some(
            masks
                .index_axis(Axis(0), 0)
                .index_axis(Axis(0), best)
                .to_owned(),
        ))
    }
}

impl Segmenter for Sam2 {
    fn segment(&self, image: &RgbImage, bbox: &BoundingBox) -> Result<Option<Mask>> {
        let _span = tracing::debug_span!("sam2_segment").entered();

        check_box(image, bbox)?;

        let Some(logits) = self.infer(image, bbox).map_err(Error::ModelUnavailable)? else {
            return Ok(None);
        };

        let _post_span = tracing::debug_span!("postprocess").entered();
        let (width, height) = image.dimensions();
        Ok(Some(mask_from_logits(logits.view(), width, height)))
    }
}

/// Index of the highest predicted IoU, `None` when there are no candidates.
fn best_candidate(iou: &[f32]) -> Option<usize> {
    iou.iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(index, _)| index)
}

/// Resample model-space logits to `width` x `height` (nearest neighbour,
/// pixel centres) and threshold them into a mask.
fn mask_from_logits(logits: ArrayView2<f32>, width: u32, height: u32) -> Mask {
    let (rows, cols) = logits.dim();
    if rows == 0 || cols == 0 {
        return Mask::empty(width, height);
    }

    let scale_x = cols as f32 / width as f32;
    let scale_y = rows as f32 / height as f32;

    Mask::from_fn(width, height, |x, y| {
        let mx = (((x as f32 + 0.5) * scale_x) as usize).min(cols - 1);
        let my = (((y as f32 + 0.5) * scale_y) as usize).min(rows - 1);
        logits[[my, mx]] > MASK_THRESHOLD
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn best_candidate_picks_highest_iou() {
        assert_eq!(best_candidate(&[0.75, 0.81, 0.64]), Some(1));
        assert_eq!(best_candidate(&[0.5]), Some(0));
        assert_eq!(best_candidate(&[]), None);
    }

    #[test]
    fn mask_matches_requested_dimensions() {
        let logits = Array2::<f32>::from_elem((8, 8), 1.0);
        for (w, h) in [(3, 5), (8, 8), (640, 480), (1, 1)] {
            let mask = mask_from_logits(logits.view(), w, h);
            assert_eq!(mask.dimensions(), (w, h));
            assert_eq!(mask.count(), (w * h) as usize);
        }
    }

    #[test]
    fn upsampling_preserves_quadrants() {
        // foreground in the top-left quadrant of model space
        let logits = array![[4.0, -4.0], [-4.0, -4.0]];
        let mask = mask_from_logits(logits.view(), 6, 4);
        for y in 0..4 {
            for x in 0..6 {
                assert_eq!(mask.get(x, y), x < 3 && y < 2, "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn downsampling_samples_pixel_centres() {
        let logits = Array2::from_shape_fn((4, 4), |(r, c)| if r == 1 && c == 2 { 1.0 } else { -1.0 });
        let mask = mask_from_logits(logits.view(), 2, 2);
        // output pixel (1, 0) samples model cell (row 1, col 3), which is background
        assert_eq!(mask.count(), 0);

        let mask = mask_from_logits(logits.view(), 4, 4);
        assert!(mask.get(2, 1));
        assert_eq!(mask.count(), 1);
    }

    #[test]
    fn zero_logit_is_background() {
        let logits = Array2::<f32>::zeros((2, 2));
        assert_eq!(mask_from_logits(logits.view(), 2, 2).count(), 0);
    }

    #[test]
    fn check_box_rejects_prompts_for_a_larger_image() {
        let bbox = BoundingBox::new(0.0, 0.0, 50.0, 50.0, 100, 100).unwrap();
        assert!(check_box(&RgbImage::new(100, 100), &bbox).is_ok());
        assert!(matches!(
            check_box(&RgbImage::new(40, 100), &bbox),
            Err(Error::InvalidBox { width: 40, .. })
        ));
    }
}
