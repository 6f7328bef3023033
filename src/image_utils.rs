use std::path::Path;

use image::{DynamicImage, Rgba, RgbaImage};

use crate::error::{Result, VisualDiffError};

/// Decodes an image file, attaching the offending path to any failure.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path = path.as_ref();
    image::open(path).map_err(|source| VisualDiffError::Load {
        path: path.to_path_buf(),
        source,
    })
}

pub fn ensure_same_dimensions(a: &RgbaImage, b: &RgbaImage) -> Result<()> {
    if a.dimensions() != b.dimensions() {
        return Err(VisualDiffError::DimensionMismatch(
            a.width(),
            a.height(),
            b.width(),
            b.height(),
        ));
    }
    Ok(())
}

/// Straight-alpha "over": `src` on top of `dst`, with the source alpha
/// multiplied by `src_alpha_scale` first.
pub fn blend_over(dst: Rgba<u8>, src: Rgba<u8>, src_alpha_scale: f32) -> Rgba<u8> {
    let sa = src[3] as f32 / 255.0 * src_alpha_scale.clamp(0.0, 1.0);
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);

    if out_a <= f32::EPSILON {
        return Rgba([0, 0, 0, 0]);
    }

    let channel = |i: usize| {
        let value = (src[i] as f32 * sa + dst[i] as f32 * da * (1.0 - sa)) / out_a;
        value.round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        channel(0),
        channel(1),
        channel(2),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}
