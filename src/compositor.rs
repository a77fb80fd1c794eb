//! Mask merging and RGBA cutout synthesis.

use crate::error::{Error, Result};
use crate::geometry::{CropRegion, Mask};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgba, RgbImage, RgbaImage};
use std::io::Cursor;

/// Cropped garment with a binary alpha channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Cutout {
    pub image: RgbaImage,
    /// Where the crop sits in the source image (inclusive bounds).
    pub region: CropRegion,
}

impl Cutout {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Lossless PNG encoding, alpha preserved.
    pub fn encode(&self) -> Result<EncodedCutout> {
        let _span = tracing::debug_span!("encode_png").entered();

        let mut png = Vec::new();
        DynamicImage::ImageRgba8(self.image.clone())
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(Error::Encode)?;

        let (width, height) = self.dimensions();
        Ok(EncodedCutout {
            png,
            width,
            height,
            region: self.region,
        })
    }
}

/// A cutout encoded as PNG, with its placement in the source image.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedCutout {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub region: CropRegion,
}

impl EncodedCutout {
    pub fn to_base64(&self) -> String {
        B64.encode(&self.png)
    }
}

/// Union `masks`, crop `image` to the union's bounding region and use the
/// cropped union as alpha.
///
/// Pixel colors are copied verbatim; nothing is resized or blended.
pub fn merge_and_composite(image: &RgbImage, masks: &[Mask]) -> Result<Cutout> {
    let _span = tracing::debug_span!("merge_and_composite", masks = masks.len()).entered();

    let (width, height) = image.dimensions();
    if let Some(mask) = masks.iter().find(|m| m.dimensions() != (width, height)) {
        return Err(Error::DimensionMismatch {
            mask_width: mask.width(),
            mask_height: mask.height(),
            width,
            height,
        });
    }

    let combined = Mask::union_all(masks)?.ok_or(Error::NoMasks)?;
    let region = combined.bounding_region().ok_or(Error::EmptyMask)?;
    let alpha = combined.crop(&region)?.to_alpha();

    tracing::debug!(
        "Combined mask has {} foreground pixels, crop {}x{} at ({}, {})",
        combined.count(),
        region.width(),
        region.height(),
        region.x_min,
        region.y_min
    );

    let cutout = RgbaImage::from_fn(region.width(), region.height(), |x, y| {
        let [r, g, b] = image.get_pixel(region.x_min + x, region.y_min + y).0;
        Rgba([r, g, b, alpha.get_pixel(x, y)[0]])
    });

    Ok(Cutout {
        image: cutout,
        region,
    })
}
