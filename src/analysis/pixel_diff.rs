use image::{GrayImage, Luma, Rgba, RgbaImage};
use log::debug;
use rayon::{iter::{IndexedParallelIterator, ParallelIterator}, slice::ParallelSliceMut};

use crate::{
    analysis::round2,
    error::Result,
    image_utils::ensure_same_dimensions,
};

/// Boolean grid marking pixels whose color difference exceeds the threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DifferenceMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl DifferenceMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    pub fn from_fn<F: Fn(u32, u32) -> bool>(width: u32, height: u32, f: F) -> Self {
        let mut bits = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                bits.push(f(x, y));
            }
        }
        Self { width, height, bits }
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

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[y as usize * self.width as usize + x as usize]
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Number of set pixels in the half-open rectangle `[x0, x1) x [y0, y1)`.
    pub fn count_in(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> usize {
        let x1 = x1.min(self.width);
        let y1 = y1.min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return 0;
        }

        (y0..y1)
            .map(|y| {
                let row = y as usize * self.width as usize;
                self.bits[row + x0 as usize..row + x1 as usize]
                    .iter()
                    .filter(|&&b| b)
                    .count()
            })
            .sum()
    }

    /// 255 where set, 0 elsewhere.
    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([if self.get(x, y) { 255 } else { 0 }])
        })
    }
}

#[derive(Debug, Clone)]
pub struct PixelDiff {
    pub mask: DifferenceMask,
    pub different_pixels: usize,
    pub total_pixels: usize,
}

impl PixelDiff {
    pub fn percentage(&self) -> f64 {
        if self.total_pixels == 0 {
            return 0.0;
        }
        self.different_pixels as f64 / self.total_pixels as f64 * 100.0
    }

    pub fn rounded_percentage(&self) -> f64 {
        round2(self.percentage())
    }
}

pub struct PixelDiffer {
    threshold: u8,
    parallel: bool,
}

impl PixelDiffer {
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold,
            parallel: true,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn diff(&self, design: &RgbaImage, implementation: &RgbaImage) -> Result<PixelDiff> {
        ensure_same_dimensions(design, implementation)?;
        let (width, height) = design.dimensions();

        let mut mask = DifferenceMask::new(width, height);

        if width > 0 && height > 0 {
            let row_len = width as usize;
            let fill_row = |y: usize, mask_row: &mut [bool]| {
                for (x, marked) in mask_row.iter_mut().enumerate() {
                    let sum = channel_difference_sum(
                        design.get_pixel(x as u32, y as u32),
                        implementation.get_pixel(x as u32, y as u32),
                    );
                    // mean > T  <=>  sum > 3T, exact in integers
                    *marked = sum > 3 * self.threshold as u32;
                }
            };

            if self.parallel {
                mask.bits
                    .par_chunks_mut(row_len)
                    .enumerate()
                    .for_each(|(y, mask_row)| fill_row(y, mask_row));
            } else {
                mask.bits
                    .chunks_mut(row_len)
                    .enumerate()
                    .for_each(|(y, mask_row)| fill_row(y, mask_row));
            }
        }

        let different_pixels = mask.count();
        let total_pixels = mask.len();
        debug!(
            "pixel diff at threshold {}: {different_pixels}/{total_pixels} pixels differ",
            self.threshold
        );

        Ok(PixelDiff {
            mask,
            different_pixels,
            total_pixels,
        })
    }
}

/// Sum of absolute differences over R, G and B. Alpha is ignored.
fn channel_difference_sum(a: &Rgba<u8>, b: &Rgba<u8>) -> u32 {
    (0..3).map(|i| a[i].abs_diff(b[i]) as u32).sum()
}
