use crate::error::{Error, Result};
use image::{GrayImage, Luma};

/// Inclusive pixel rectangle: both the minimum and maximum coordinates
/// belong to the region, so a single pixel is a 1x1 region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl CropRegion {
    pub fn width(&self) -> u32 {
        self.x_max - self.x_min + 1
    }

    pub fn height(&self) -> u32 {
        self.y_max - self.y_min + 1
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        (self.x_min..=self.x_max).contains(&x) && (self.y_min..=self.y_max).contains(&y)
    }
}

/// Binary segmentation mask, flattened row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

impl Mask {
    /// Wrap row-major membership data for a `width` x `height` grid.
    pub fn new(width: u32, height: u32, data: Vec<bool>) -> Result<Self> {
        if data.len() != width as usize * height as usize {
            return Err(Error::InvalidInput(format!(
                "mask data has {} cells, expected {}x{}",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// All-background mask.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![false; width as usize * height as usize],
        }
    }

    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> bool,
    {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Membership at (x, y); out-of-range coordinates are background.
    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Number of foreground pixels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// Elementwise OR with another mask of the same size.
    pub fn union(&self, other: &Mask) -> Result<Mask> {
        if self.dimensions() != other.dimensions() {
            return Err(Error::DimensionMismatch {
                mask_width: other.width,
                mask_height: other.height,
                width: self.width,
                height: self.height,
            });
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| a || b)
            .collect();
        Ok(Mask {
            width: self.width,
            height: self.height,
            data,
        })
    }

    /// Union of every mask in `masks`, or `None` for an empty sequence.
    pub fn union_all<'a, I>(masks: I) -> Result<Option<Mask>>
    where
        I: IntoIterator<Item = &'a Mask>,
    {
        let mut masks = masks.into_iter();
        let Some(first) = masks.next() else {
            return Ok(None);
        };
        masks
            .try_fold(first.clone(), |combined, mask| combined.union(mask))
            .map(Some)
    }

    /// Smallest inclusive region holding every foreground pixel, `None` when
    /// the mask is entirely background.
    pub fn bounding_region(&self) -> Option<CropRegion> {
        let width = self.width as usize;
        let mut region: Option<CropRegion> = None;

        for (row, cells) in self.data.chunks(width.max(1)).enumerate() {
            let Some(first) = cells.iter().position(|&v| v) else {
                continue;
            };
            // position() found a hit, so rposition() cannot miss
            let last = cells.iter().rposition(|&v| v).unwrap_or(first);
            let (y, x_first, x_last) = (row as u32, first as u32, last as u32);

            region = Some(match region {
                None => CropRegion {
                    x_min: x_first,
                    y_min: y,
                    x_max: x_last,
                    y_max: y,
                },
                Some(r) => CropRegion {
                    x_min: r.x_min.min(x_first),
                    y_min: r.y_min,
                    x_max: r.x_max.max(x_last),
                    y_max: y,
                },
            });
        }

        region
    }

    /// Sub-mask covering `region`, which must lie inside this mask.
    pub fn crop(&self, region: &CropRegion) -> Result<Mask> {
        if region.x_max >= self.width || region.y_max >= self.height {
            return Err(Error::InvalidInput(format!(
                "crop region {:?} exceeds {}x{} mask",
                region, self.width, self.height
            )));
        }
        Ok(Mask::from_fn(region.width(), region.height(), |x, y| {
            self.get(region.x_min + x, region.y_min + y)
        }))
    }

    /// Alpha channel for this mask: 255 where foreground, 0 elsewhere.
    pub fn to_alpha(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([if self.get(x, y) { 255 } else { 0 }])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn left_half(width: u32, height: u32) -> Mask {
        Mask::from_fn(width, height, |x, _| x < width / 2)
    }

    fn right_half(width: u32, height: u32) -> Mask {
        Mask::from_fn(width, height, |x, _| x >= width / 2)
    }

    fn diagonal(size: u32) -> Mask {
        Mask::from_fn(size, size, |x, y| x == y)
    }

    #[test]
    fn new_rejects_wrong_length() {
        assert!(Mask::new(3, 3, vec![false; 8]).is_err());
        assert!(Mask::new(3, 3, vec![false; 9]).is_ok());
    }

    #[test]
    fn get_is_background_outside_grid() {
        let mask = Mask::from_fn(4, 4, |_, _| true);
        assert!(mask.get(3, 3));
        assert!(!mask.get(4, 0));
        assert!(!mask.get(0, 4));
    }

    #[test]
    fn union_is_commutative() {
        let a = left_half(10, 6);
        let b = Mask::from_fn(10, 6, |x, y| x == y + 3);
        assert_eq!(a.union(&b).unwrap(), b.union(&a).unwrap());
    }

    #[test]
    fn union_is_idempotent() {
        let a = diagonal(7);
        assert_eq!(a.union(&a).unwrap(), a);
    }

    #[test]
    fn union_all_is_order_independent() {
        let masks = [left_half(8, 8), diagonal(8), Mask::empty(8, 8)];
        let forward = Mask::union_all(masks.iter()).unwrap().unwrap();
        let backward = Mask::union_all(masks.iter().rev()).unwrap().unwrap();
        assert_eq!(forward, backward);
        for y in 0..8 {
            for x in 0..8 {
                assert_eq!(forward.get(x, y), x < 4 || x == y);
            }
        }
    }

    #[test]
    fn union_all_of_nothing_is_none() {
        assert!(Mask::union_all(std::iter::empty()).unwrap().is_none());
    }

    #[test]
    fn union_rejects_mismatched_sizes() {
        let err = Mask::empty(4, 4).union(&Mask::empty(4, 5)).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { mask_height: 5, .. }));
    }

    #[test]
    fn disjoint_halves_cover_full_frame() {
        let combined = left_half(10, 10).union(&right_half(10, 10)).unwrap();
        assert_eq!(combined.count(), 100);
        assert_eq!(
            combined.bounding_region(),
            Some(CropRegion {
                x_min: 0,
                y_min: 0,
                x_max: 9,
                y_max: 9
            })
        );
    }

    #[test]
    fn bounding_region_of_single_pixel_is_one_by_one() {
        let mask = Mask::from_fn(20, 20, |x, y| x == 5 && y == 5);
        let region = mask.bounding_region().unwrap();
        assert_eq!(
            region,
            CropRegion {
                x_min: 5,
                y_min: 5,
                x_max: 5,
                y_max: 5
            }
        );
        assert_eq!((region.width(), region.height()), (1, 1));
    }

    #[test]
    fn bounding_region_of_empty_mask_is_none() {
        assert!(Mask::empty(6, 3).bounding_region().is_none());
        assert!(Mask::empty(0, 0).bounding_region().is_none());
    }

    #[test]
    fn bounding_region_contains_all_pixels_and_is_minimal() {
        let points = [(3u32, 7u32), (11, 2), (6, 12), (9, 9)];
        let mask = Mask::from_fn(16, 16, |x, y| points.contains(&(x, y)));
        let region = mask.bounding_region().unwrap();

        for y in 0..16 {
            for x in 0..16 {
                if mask.get(x, y) {
                    assert!(region.contains(x, y));
                }
            }
        }

        // every edge of the region touches a foreground pixel
        assert!((region.y_min..=region.y_max).any(|y| mask.get(region.x_min, y)));
        assert!((region.y_min..=region.y_max).any(|y| mask.get(region.x_max, y)));
        assert!((region.x_min..=region.x_max).any(|x| mask.get(x, region.y_min)));
        assert!((region.x_min..=region.x_max).any(|x| mask.get(x, region.y_max)));
        assert_eq!(
            region,
            CropRegion {
                x_min: 3,
                y_min: 2,
                x_max: 11,
                y_max: 12
            }
        );
    }

    #[test]
    fn crop_and_alpha() {
        let mask = Mask::from_fn(6, 6, |x, y| (2..=3).contains(&x) && y == 4);
        let region = mask.bounding_region().unwrap();
        let cropped = mask.crop(&region).unwrap();
        assert_eq!(cropped.dimensions(), (2, 1));
        assert_eq!(cropped.count(), 2);

        let alpha = Mask::from_fn(2, 2, |x, y| x == y).to_alpha();
        assert_eq!(alpha.get_pixel(0, 0)[0], 255);
        assert_eq!(alpha.get_pixel(1, 0)[0], 0);
        assert_eq!(alpha.get_pixel(0, 1)[0], 0);
        assert_eq!(alpha.get_pixel(1, 1)[0], 255);
    }

    #[test]
    fn crop_rejects_region_outside_mask() {
        let region = CropRegion {
            x_min: 0,
            y_min: 0,
            x_max: 6,
            y_max: 0,
        };
        assert!(Mask::empty(6, 6).crop(&region).is_err());
    }
}
