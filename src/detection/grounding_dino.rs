use super::tokenizer::{EncodedPrompt, WordPieceTokenizer};
use super::{check_threshold, Detection, Detector};
use crate::error::{Error, Result};
use crate::geometry::BoundingBox;
use crate::preprocess::{Preprocessor, ResizeMode};
use crate::session::SharedSession;
use anyhow::Context;
use image::{imageops::FilterType, RgbImage};
use ndarray::{Array2, Array3, ArrayView2, Axis, Ix3};
use ort::value::Tensor;
use std::path::Path;

/// Text positions the model's text encoder accepts.
const MAX_TEXT_LEN: usize = 256;

/// Grounding DINO open-vocabulary detector
///
/// The prompt is the vocabulary joined as `"phrase . phrase . ..."`. Every
/// query predicts a normalized (cx, cy, w, h) box plus one logit per prompt
/// token; a query's confidence is its best token probability.
pub struct GroundingDino {
    session: SharedSession,
    tokenizer: WordPieceTokenizer,
    preprocessor: Preprocessor,
}

impl GroundingDino {
    /// Create a detector from an ONNX export and its BERT tokenizer
    ///
    /// # Default Configuration
    /// - Shortest edge resized to 800, longest capped at 1333 (bilinear)
    /// - ImageNet normalization
    pub fn new<P: AsRef<Path>>(model_path: P, tokenizer: WordPieceTokenizer) -> anyhow::Result<Self> {
        let session = SharedSession::load("Grounding DINO", model_path.as_ref())?;
        let preprocessor = Preprocessor::new(
            ResizeMode::ShortestEdge {
                shortest: 800,
                longest: 1333,
            },
            FilterType::Triangle,
        );

        Ok(Self {
            session,
            tokenizer,
            preprocessor,
        })
    }

    /// Run the model, returning per-query token logits [Q, T] and boxes [Q, 4].
    fn infer(
        &self,
        image: &RgbImage,
        prompt: &EncodedPrompt,
    ) -> anyhow::Result<(Array2<f32>, Array2<f32>)> {
        let pixel_values = self.preprocessor.preprocess(image)?;
        let (_, _, height, width) = pixel_values.dim();
        let seq_len = prompt.len();

        let input_ids = Array2::from_shape_vec((1, seq_len), prompt.input_ids.clone())?;
        let token_type_ids = Array2::<i64>::zeros((1, seq_len));
        let attention_mask = Array2::<i64>::ones((1, seq_len));
        let pixel_mask = Array3::<i64>::ones((1, height, width));

        let inputs = ort::inputs![
            "pixel_values" => Tensor::from_array(pixel_values)?,
            "input_ids" => Tensor::from_array(input_ids)?,
            "token_type_ids" => Tensor::from_array(token_type_ids)?,
            "attention_mask" => Tensor::from_array(attention_mask)?,
            "pixel_mask" => Tensor::from_array(pixel_mask)?,
        ];

        let mut session = self.session.lock()?;
        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = session
            .run(inputs)
            .context("Failed to run detector inference")?;

        // [1, Q, T] and [1, Q, 4]
        let logits = outputs["logits"]
            .try_extract_array::<f32>()?
            .to_owned()
            .into_dimensionality::<Ix3>()?
            .index_axis_move(Axis(0), 0);
        let boxes = outputs["pred_boxes"]
            .try_extract_array::<f32>()?
            .to_owned()
            .into_dimensionality::<Ix3>()?
            .index_axis_move(Axis(0), 0);

        Ok((logits, boxes))
    }
}

impl Detector for GroundingDino {
    fn detect(
        &self,
        image: &RgbImage,
        vocabulary: &[String],
        box_threshold: f32,
        text_threshold: f32,
    ) -> Result<Vec<Detection>> {
        let _span = tracing::debug_span!("grounding_dino_detect").entered();

        check_query(image, vocabulary, box_threshold, text_threshold)?;

        let prompt = self
            .tokenizer
            .encode_prompt(vocabulary, MAX_TEXT_LEN)
            .map_err(|e| Error::InvalidInput(format!("{e:#}")))?;

        let (logits, boxes) = self.infer(image, &prompt).map_err(Error::ModelUnavailable)?;

        let _post_span = tracing::debug_span!("postprocess").entered();
        let detections = decode_detections(
            logits.view(),
            boxes.view(),
            &prompt,
            vocabulary,
            image.dimensions(),
            box_threshold,
            text_threshold,
        );

        tracing::debug!(
            "Detected {} regions: {:?}",
            detections.len(),
            detections.iter().map(|d| d.label.as_str()).collect::<Vec<_>>()
        );

        Ok(detections)
    }
}

/// Validate the input constraints every detector shares.
pub(crate) fn check_query(
    image: &RgbImage,
    vocabulary: &[String],
    box_threshold: f32,
    text_threshold: f32,
) -> Result<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(Error::InvalidInput("image has no pixels".to_string()));
    }
    if vocabulary.is_empty() {
        return Err(Error::InvalidInput("label vocabulary is empty".to_string()));
    }
    check_threshold("box_threshold", box_threshold)?;
    check_threshold("text_threshold", text_threshold)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Turn raw per-query outputs into thresholded, image-space detections.
///
/// Only the first `prompt.len()` token logits of each query are meaningful;
/// the remainder is padding up to the model's text length.
fn decode_detections(
    logits: ArrayView2<f32>,
    boxes: ArrayView2<f32>,
    prompt: &EncodedPrompt,
    vocabulary: &[String],
    (width, height): (u32, u32),
    box_threshold: f32,
    text_threshold: f32,
) -> Vec<Detection> {
    let tokens = prompt.len().min(logits.ncols());
    let (w, h) = (width as f32, height as f32);
    let mut detections = Vec::new();

    for (query, (token_logits, cxcywh)) in logits.outer_iter().zip(boxes.outer_iter()).enumerate() {
        let probs: Vec<f32> = token_logits.iter().take(tokens).map(|&x| sigmoid(x)).collect();
        let confidence = probs.iter().copied().fold(0.0f32, f32::max);
        if confidence <= box_threshold {
            continue;
        }

        let mut phrases: Vec<usize> = probs
            .iter()
            .zip(&prompt.phrase_index)
            .filter(|&(&p, _)| p > text_threshold)
            .filter_map(|(_, &phrase)| phrase)
            .collect();
        phrases.dedup();
        let label = phrases
            .iter()
            .filter_map(|&i| vocabulary.get(i))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");

        let (cx, cy, bw, bh) = (cxcywh[0] * w, cxcywh[1] * h, cxcywh[2] * w, cxcywh[3] * h);
        let Some(bbox) = BoundingBox::clamped(
            cx - bw / 2.0,
            cy - bh / 2.0,
            cx + bw / 2.0,
            cy + bh / 2.0,
            width,
            height,
        ) else {
            tracing::debug!("Dropping query {} with degenerate box {:?}", query, cxcywh);
            continue;
        };

        detections.push(Detection {
            bbox,
            confidence,
            label,
        });
    }

    detections
}
