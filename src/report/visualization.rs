use image::{GrayImage, Rgba, RgbaImage, imageops};
use imageproc::{
    distance_transform::Norm,
    drawing::draw_filled_rect_mut,
    morphology::dilate,
    rect::Rect,
};
use log::debug;

use crate::{
    DEFAULT_OPACITY,
    analysis::pixel_diff::DifferenceMask,
    error::{Result, VisualDiffError},
    image_utils::{blend_over, ensure_same_dimensions},
    report::font,
};

#[derive(Debug, Clone)]
pub struct VisualizationConfig {
    pub overlay_opacity: f32,
    /// Straight-alpha color composited over differing pixels.
    pub highlight_color: Rgba<u8>,
    /// Chebyshev radius of the dilation applied to the mask; 1 is a 3x3 max filter.
    pub dilation_radius: u8,
    pub panel_margin: u32,
    pub header_height: u32,
    /// Distance from the top of the canvas to the top of each panel.
    pub panel_offset: u32,
    pub background: Rgba<u8>,
    pub header_background: Rgba<u8>,
    pub label_color: Rgba<u8>,
    pub show_labels: bool,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            overlay_opacity: DEFAULT_OPACITY,
            highlight_color: Rgba([255, 0, 0, 128]),
            dilation_radius: 1,
            panel_margin: 10,
            header_height: 35,
            panel_offset: 40,
            background: Rgba([30, 30, 30, 255]),
            header_background: Rgba([50, 50, 50, 255]),
            label_color: Rgba([255, 255, 255, 255]),
            show_labels: true,
        }
    }
}

pub struct Visualizer {
    config: VisualizationConfig,
}

impl Visualizer {
    pub fn new() -> Self {
        Self { config: VisualizationConfig::default() }
    }

    pub fn with_config(config: VisualizationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VisualizationConfig {
        &self.config
    }

    /// Design as the base layer, implementation composited over it with
    /// its alpha scaled by the configured opacity.
    pub fn create_overlay(&self, design: &RgbaImage, implementation: &RgbaImage) -> Result<RgbaImage> {
        ensure_same_dimensions(design, implementation)?;
        let opacity = self.config.overlay_opacity;
        if !(opacity > 0.0 && opacity <= 1.0) {
            return Err(VisualDiffError::InvalidParameter(format!(
                "Opacity must be in (0, 1], got {opacity}"
            )));
        }

        let (width, height) = design.dimensions();
        Ok(RgbaImage::from_fn(width, height, |x, y| {
            blend_over(*design.get_pixel(x, y), *implementation.get_pixel(x, y), opacity)
        }))
    }

    /// Mask grown by the configured dilation radius, as 0/255 gray.
    pub fn dilated_mask(&self, mask: &DifferenceMask) -> GrayImage {
        let gray = mask.to_gray_image();
        if self.config.dilation_radius == 0 || mask.is_empty() {
            return gray;
        }
        dilate(&gray, Norm::LInf, self.config.dilation_radius)
    }

    /// Red tint over a copy of the implementation wherever the dilated mask is set.
    ///
    /// The highlight color is alpha-composited over each marked pixel, so at the
    /// default alpha of 128 the implementation stays visible underneath. It is
    /// never pasted in place of the pixel.
    pub fn create_diff_highlight(&self, implementation: &RgbaImage, mask: &DifferenceMask) -> Result<RgbaImage> {
        if implementation.dimensions() != mask.dimensions() {
            let (mw, mh) = mask.dimensions();
            return Err(VisualDiffError::DimensionMismatch(
                implementation.width(),
                implementation.height(),
                mw,
                mh,
            ));
        }

        let stencil = self.dilated_mask(mask);
        let mut result = implementation.clone();
        let mut painted = 0usize;

        for (x, y, pixel) in result.enumerate_pixels_mut() {
            if stencil.get_pixel(x, y)[0] > 0 {
                *pixel = blend_over(*pixel, self.config.highlight_color, 1.0);
                painted += 1;
            }
        }
        debug!("highlighted {painted} pixels ({} before dilation)", mask.count());

        Ok(result)
    }

    /// Design, implementation and highlighted diff side by side under
    /// labeled header strips.
    pub fn create_side_by_side(
        &self,
        design: &RgbaImage,
        implementation: &RgbaImage,
        diff: &RgbaImage,
    ) -> Result<RgbaImage> {
        ensure_same_dimensions(design, implementation)?;
        ensure_same_dimensions(design, diff)?;

        self.create_comparison(&[("Design", design), ("Implementation", implementation), ("Diff", diff)])
    }

    /// Lays out same-height panels left to right with a fixed margin.
    pub fn create_comparison(&self, panels: &[(&str, &RgbaImage)]) -> Result<RgbaImage> {
        if panels.is_empty() {
            return Err(VisualDiffError::InvalidParameter(
                "Comparison needs at least one panel".into(),
            ));
        }

        let margin = self.config.panel_margin;
        let height = panels.iter().map(|(_, img)| img.height()).max().unwrap_or(0);
        let total_width = panels.iter().map(|(_, img)| img.width()).sum::<u32>()
            + margin * (panels.len() as u32 - 1);
        let total_height = height + self.config.panel_offset;

        let mut canvas = RgbaImage::from_pixel(total_width, total_height, self.config.background);

        let mut x_offset = 0u32;
        for (label, img) in panels {
            self.draw_header(&mut canvas, x_offset, img.width(), label);
            imageops::replace(&mut canvas, *img, x_offset as i64, self.config.panel_offset as i64);
            x_offset += img.width() + margin;
        }

        Ok(canvas)
    }

    fn draw_header(&self, canvas: &mut RgbaImage, x: u32, width: u32, label: &str) {
        if width == 0 || self.config.header_height == 0 {
            return;
        }

        let strip = Rect::at(x as i32, 0).of_size(width, self.config.header_height);
        draw_filled_rect_mut(canvas, strip, self.config.header_background);

        if !self.config.show_labels {
            return;
        }

        let label = label.to_ascii_uppercase();
        let padding = 4;
        let fits = |scale: u32| {
            font::text_width(&label, scale) + 2 * padding <= width
                && font::text_height(scale) + 2 * padding <= self.config.header_height
        };
        let Some(scale) = [2, 1].into_iter().find(|&s| fits(s)) else {
            return;
        };

        let text_x = x + (width - font::text_width(&label, scale)) / 2;
        let text_y = (self.config.header_height - font::text_height(scale)) / 2;
        font::draw_text(canvas, text_x as i32, text_y as i32, &label, scale, self.config.label_color);
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}
