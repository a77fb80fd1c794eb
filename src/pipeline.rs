//! Per-request orchestration: detect, segment every box, merge, encode.

use crate::compositor::{merge_and_composite, EncodedCutout};
use crate::detection::{check_threshold, Detection, Detector};
use crate::error::{Error, Result};
use crate::geometry::{BoundingBox, Mask};
use crate::segmentation::Segmenter;
use image::RgbImage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::Instrument;

/// Clothing phrases the detector is prompted with.
pub const CLOTHING_VOCABULARY: [&str; 16] = [
    "clothes", "shirt", "t-shirt", "pants", "dress", "jacket", "coat", "skirt", "blouse",
    "sweater", "hoodie", "jeans", "trousers", "shorts", "gown", "jumpsuit",
];

pub const DEFAULT_BOX_THRESHOLD: f32 = 0.35;
pub const DEFAULT_TEXT_THRESHOLD: f32 = 0.25;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Fixed per-process settings for every request.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub vocabulary: Vec<String>,
    pub box_threshold: f32,
    pub text_threshold: f32,
    /// Budget for one whole request, inference included.
    pub timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vocabulary: CLOTHING_VOCABULARY.iter().map(|s| s.to_string()).collect(),
            box_threshold: DEFAULT_BOX_THRESHOLD,
            text_threshold: DEFAULT_TEXT_THRESHOLD,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.vocabulary.is_empty() || self.vocabulary.iter().any(|p| p.trim().is_empty()) {
            return Err(Error::InvalidInput(
                "vocabulary must hold at least one non-blank phrase".to_string(),
            ));
        }
        check_threshold("box_threshold", self.box_threshold)?;
        check_threshold("text_threshold", self.text_threshold)?;
        if self.timeout.is_zero() {
            return Err(Error::InvalidInput("timeout must be positive".to_string()));
        }
        Ok(())
    }
}

/// Decode an uploaded file (any common raster format) to 8-bit RGB.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(bytes).map_err(Error::InvalidImage)?;
    Ok(image.to_rgb8())
}

/// Garment extraction pipeline
///
/// Holds the process-wide model handles; cheap to share behind an `Arc` and
/// safe to drive from concurrent requests.
pub struct Pipeline {
    detector: Arc<dyn Detector>,
    segmenter: Arc<dyn Segmenter>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        detector: Arc<dyn Detector>,
        segmenter: Arc<dyn Segmenter>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            detector,
            segmenter,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract every detected garment from `image` as one encoded cutout.
    ///
    /// All-or-nothing: on timeout or model failure no partial result is
    /// returned.
    pub async fn run(&self, image: RgbImage) -> Result<EncodedCutout> {
        let span = tracing::info_span!("request", width = image.width(), height = image.height());
        self.with_timeout(self.detect_and_cutout(Arc::new(image)))
            .instrument(span)
            .await
    }

    /// Segment a caller-chosen region, skipping detection.
    pub async fn run_with_box(&self, image: RgbImage, bbox: BoundingBox) -> Result<EncodedCutout> {
        let span = tracing::info_span!("request_with_box", width = image.width(), height = image.height());
        let image = Arc::new(image);
        let detections = vec![Detection {
            bbox,
            confidence: 1.0,
            label: String::new(),
        }];
        self.with_timeout(self.cutout(image, detections))
            .instrument(span)
            .await
    }

    async fn with_timeout<F>(&self, stages: F) -> Result<EncodedCutout>
    where
        F: std::future::Future<Output = Result<EncodedCutout>>,
    {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.config.timeout, stages).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.config.timeout)),
        };

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        match &result {
            Ok(encoded) => tracing::info!(
                "Cutout {}x{} ({} bytes) in {:.1}ms",
                encoded.width,
                encoded.height,
                encoded.png.len(),
                elapsed_ms
            ),
            Err(e) if e.is_not_found() => tracing::info!("{} after {:.1}ms", e, elapsed_ms),
            Err(e) => tracing::warn!("Request failed after {:.1}ms: {}", elapsed_ms, e),
        }
        result
    }

    async fn detect_and_cutout(&self, image: Arc<RgbImage>) -> Result<EncodedCutout> {
        let detections = self.detect(Arc::clone(&image)).await?;
        if detections.is_empty() {
            return Err(Error::NoDetections);
        }
        tracing::info!("Detected {} clothing regions", detections.len());

        self.cutout(image, detections).await
    }

    async fn detect(&self, image: Arc<RgbImage>) -> Result<Vec<Detection>> {
        let detector = Arc::clone(&self.detector);
        let vocabulary = self.config.vocabulary.clone();
        let (box_threshold, text_threshold) = (self.config.box_threshold, self.config.text_threshold);

        tokio::task::spawn_blocking(move || {
            detector.detect(&image, &vocabulary, box_threshold, text_threshold)
        })
        .await?
    }

    /// Segment, gate, merge and encode.
    async fn cutout(&self, image: Arc<RgbImage>, detections: Vec<Detection>) -> Result<EncodedCutout> {
        let masks = self.segment_all(Arc::clone(&image), &detections).await?;
        if masks.is_empty() {
            return Err(Error::NoMasks);
        }

        let cutout = tokio::task::spawn_blocking(move || {
            merge_and_composite(&image, &masks).and_then(|cutout| cutout.encode())
        })
        .await??;

        Ok(cutout)
    }

    /// One segmentation call per box; boxes without a mask are dropped.
    async fn segment_all(&self, image: Arc<RgbImage>, detections: &[Detection]) -> Result<Vec<Mask>> {
        let mut tasks = JoinSet::new();
        for (index, detection) in detections.iter().enumerate() {
            let segmenter = Arc::clone(&self.segmenter);
            let image = Arc::clone(&image);
            let bbox = detection.bbox;
            tasks.spawn_blocking(move || (index, segmenter.segment(&image, &bbox)));
        }

        let mut masks = Vec::with_capacity(detections.len());
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined?;
            match result? {
                Some(mask) => masks.push((index, mask)),
                None => tracing::debug!(
                    "No mask for box {} ({:?})",
                    index,
                    detections[index].label
                ),
            }
        }

        masks.sort_by_key(|(index, _)| *index);
        Ok(masks.into_iter().map(|(_, mask)| mask).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.vocabulary.len(), 16);
        assert_eq!(config.vocabulary[2], "t-shirt");
    }

    #[test]
    fn validate_rejects_out_of_range_settings() {
        let bad = [
            PipelineConfig {
                vocabulary: vec![],
                ..Default::default()
            },
            PipelineConfig {
                vocabulary: vec!["dress".to_string(), " ".to_string()],
                ..Default::default()
            },
            PipelineConfig {
                box_threshold: 0.0,
                ..Default::default()
            },
            PipelineConfig {
                text_threshold: 1.01,
                ..Default::default()
            },
            PipelineConfig {
                timeout: Duration::ZERO,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?}");
        }
    }

    #[test]
    fn decode_image_accepts_png_and_rejects_garbage() {
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(image::RgbaImage::new(3, 2))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let decoded = decode_image(&png).unwrap();
        assert_eq!(decoded.dimensions(), (3, 2));

        assert!(matches!(
            decode_image(b"not an image"),
            Err(Error::InvalidImage(_))
        ));
    }
}
