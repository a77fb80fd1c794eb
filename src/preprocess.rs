use anyhow::{ensure, Result};
use image::{imageops, RgbImage};
use ndarray::Array4;

/// ImageNet channel means, as both DINO and SAM backbones expect.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// How the input image is brought to model resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    /// Stretch to an exact size, ignoring aspect ratio.
    Exact { width: u32, height: u32 },
    /// Scale so the shorter edge hits `shortest` unless that pushes the
    /// longer edge past `longest`, in which case the shorter edge shrinks to
    /// fit. The longer edge is truncated to whole pixels.
    ShortestEdge { shortest: u32, longest: u32 },
}

/// Preprocessor for converting RGB images to model input tensors
pub struct Preprocessor {
    mode: ResizeMode,
    filter: imageops::FilterType,
}

impl Preprocessor {
    pub fn new(mode: ResizeMode, filter: imageops::FilterType) -> Self {
        Self { mode, filter }
    }

    /// Model-space size for an image of the given dimensions.
    pub fn target_size(&self, width: u32, height: u32) -> (u32, u32) {
        match self.mode {
            ResizeMode::Exact { width, height } => (width, height),
            ResizeMode::ShortestEdge { shortest, longest } => {
                let (short, long) = (width.min(height) as f64, width.max(height) as f64);
                let mut size = shortest as f64;
                if long / short * size > longest as f64 {
                    size = (longest as f64 * short / long).round();
                }
                // the long edge is truncated, not rounded
                let short_edge = (size as u32).max(1);
                let long_edge = ((size * long / short) as u32).max(1);
                if width < height {
                    (short_edge, long_edge)
                } else {
                    (long_edge, short_edge)
                }
            }
        }
    }

    /// Preprocess an RGB image into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to model dimensions
    /// 2. Scale to [0, 1] and normalize with ImageNet mean/std
    /// 3. Transpose from HWC to NCHW format
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, image: &RgbImage) -> Result<Array4<f32>> {
        let _span = tracing::debug_span!("preprocess").entered();

        let (src_width, src_height) = image.dimensions();
        ensure!(
            src_width > 0 && src_height > 0,
            "cannot preprocess an empty {}x{} image",
            src_width,
            src_height
        );

        let (target_width, target_height) = self.target_size(src_width, src_height);
        let resized = if image.dimensions() != (target_width, target_height) {
            imageops::resize(image, target_width, target_height, self.filter)
        } else {
            image.clone()
        };

        let (width, height) = resized.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                tensor[[0, c, y as usize, x as usize]] = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            }
        }

        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn exact_mode_stretches() {
        let pre = Preprocessor::new(
            ResizeMode::Exact {
                width: 16,
                height: 16,
            },
            imageops::FilterType::Lanczos3,
        );
        let image = RgbImage::from_pixel(40, 10, Rgb([0, 0, 0]));
        let tensor = pre.preprocess(&image).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 16, 16]);
    }

    #[test]
    fn shortest_edge_mode_keeps_aspect() {
        let pre = Preprocessor::new(
            ResizeMode::ShortestEdge {
                shortest: 800,
                longest: 1333,
            },
            imageops::FilterType::Triangle,
        );
        // 800 * 4 / 3 = 1066.67
        assert_eq!(pre.target_size(400, 300), (1066, 800));
        assert_eq!(pre.target_size(300, 400), (800, 1066));
        assert_eq!(pre.target_size(640, 640), (800, 800));
        // very wide: the short edge is rounded down to fit, then the long edge follows it
        assert_eq!(pre.target_size(2000, 500), (1332, 333));
    }

    #[test]
    fn normalizes_with_imagenet_stats() {
        let pre = Preprocessor::new(
            ResizeMode::Exact {
                width: 2,
                height: 2,
            },
            imageops::FilterType::Nearest,
        );
        let image = RgbImage::from_pixel(2, 2, Rgb([255, 0, 128]));
        let tensor = pre.preprocess(&image).unwrap();

        let r = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let g = (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
        let b = (128.0 / 255.0 - IMAGENET_MEAN[2]) / IMAGENET_STD[2];
        assert!((tensor[[0, 0, 1, 1]] - r).abs() < 1e-5);
        assert!((tensor[[0, 1, 0, 1]] - g).abs() < 1e-5);
        assert!((tensor[[0, 2, 1, 0]] - b).abs() < 1e-5);
    }

    #[test]
    fn rejects_empty_image() {
        let pre = Preprocessor::new(
            ResizeMode::Exact {
                width: 4,
                height: 4,
            },
            imageops::FilterType::Nearest,
        );
        assert!(pre.preprocess(&RgbImage::new(0, 0)).is_err());
    }
}
