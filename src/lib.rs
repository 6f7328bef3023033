use std::{fmt, path::Path};

use image::{DynamicImage, RgbaImage};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    analysis::{
        align::Aligner,
        pixel_diff::{PixelDiff, PixelDiffer},
        regions::{GridTiling, RegionAnalyzer},
    },
    error::{Result, VisualDiffError},
    image_utils::load_image,
    report::{
        OutputPaths, Report, ReportBuilder, Verdict,
        output::{ArtifactWriter, Artifacts},
        visualization::{VisualizationConfig, Visualizer},
    },
};

pub mod error;
pub mod image_utils;
pub mod analysis;
pub mod report;

pub const DEFAULT_THRESHOLD: u32 = 30;
pub const DEFAULT_OPACITY: f32 = 0.5;
pub const DEFAULT_GRID_SIZE: u32 = 4;
pub const DEFAULT_REGION_CUTOFF: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    /// Mean RGB difference (0-255) above which a pixel counts as different.
    pub threshold: u32,
    /// Opacity of the implementation layer in the overlay, in (0, 1].
    pub opacity: f32,
    pub grid_size: u32,
    /// Regions are reported only when their diff percentage exceeds this.
    pub region_cutoff: f64,
    pub tiling: GridTiling,
    pub parallel: bool,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            opacity: DEFAULT_OPACITY,
            grid_size: DEFAULT_GRID_SIZE,
            region_cutoff: DEFAULT_REGION_CUTOFF,
            tiling: GridTiling::Truncate,
            parallel: true,
        }
    }
}

impl CompareConfig {
    pub fn validate(&self) -> Result<()> {
        if self.threshold > 255 {
            return Err(VisualDiffError::InvalidParameter(format!(
                "Threshold must be between 0 and 255, got {}",
                self.threshold
            )));
        }
        if !(self.opacity > 0.0 && self.opacity <= 1.0) {
            return Err(VisualDiffError::InvalidParameter(format!(
                "Opacity must be in (0, 1], got {}",
                self.opacity
            )));
        }
        // grid size and cutoff are checked where the analyzer is built
        RegionAnalyzer::new(self.grid_size, self.region_cutoff)?;
        Ok(())
    }

    fn threshold_u8(&self) -> Result<u8> {
        u8::try_from(self.threshold).map_err(|_| {
            VisualDiffError::InvalidParameter(format!(
                "Threshold must be between 0 and 255, got {}",
                self.threshold
            ))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of(image: &RgbaImage) -> Self {
        Self::new(image.width(), image.height())
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One grid cell whose local diff ratio exceeded the reporting cutoff.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Region {
    #[serde(rename = "position")]
    pub label: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub diff_percentage: f64,
}

pub struct VisualComparator {
    design: DynamicImage,
    implementation: DynamicImage,
    config: CompareConfig,
}

impl VisualComparator {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(design: P, implementation: Q) -> Result<Self> {
        let design = load_image(design)?;
        let implementation = load_image(implementation)?;

        Ok(Self::from_images(design, implementation))
    }

    pub fn from_images(design: DynamicImage, implementation: DynamicImage) -> Self {
        Self {
            design,
            implementation,
            config: CompareConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CompareConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CompareConfig {
        &self.config
    }

    pub fn compare(&self) -> Result<ComparisonResult> {
        self.config.validate()?;
        let threshold = self.config.threshold_u8()?;

        let aligned = Aligner::new().align(self.design.clone(), self.implementation.clone());

        let diff = PixelDiffer::new(threshold)
            .with_parallel(self.config.parallel)
            .diff(&aligned.design, &aligned.implementation)?;

        let regions = RegionAnalyzer::new(self.config.grid_size, self.config.region_cutoff)?
            .with_tiling(self.config.tiling)
            .with_parallel(self.config.parallel)
            .analyze(&diff.mask);

        let visualizer = Visualizer::with_config(VisualizationConfig {
            overlay_opacity: self.config.opacity,
            ..VisualizationConfig::default()
        });
        debug!("rendering overlay, highlight and comparison images");
        let overlay = visualizer.create_overlay(&aligned.design, &aligned.implementation)?;
        let diff_highlight = visualizer.create_diff_highlight(&aligned.implementation, &diff.mask)?;
        let comparison = visualizer.create_side_by_side(
            &aligned.design,
            &aligned.implementation,
            &diff_highlight,
        )?;

        let result = ComparisonResult {
            design_size: aligned.design_size,
            impl_size: aligned.impl_size,
            threshold,
            diff,
            regions,
            overlay,
            diff_highlight,
            comparison,
        };
        info!(
            "overall difference {:.2}% -> {}",
            result.diff.percentage(),
            result.verdict()
        );

        Ok(result)
    }

    /// Compares and writes every artifact to `output_dir`, returning the report.
    pub fn compare_to_dir<P: AsRef<Path>>(&self, output_dir: P) -> Result<Report> {
        let result = self.compare()?;
        result.save(output_dir)
    }
}

#[derive(Debug, Clone)]
pub struct ComparisonResult {
    pub design_size: Size,
    /// Implementation size as captured, before alignment.
    pub impl_size: Size,
    pub threshold: u8,
    pub diff: PixelDiff,
    pub regions: Vec<Region>,
    pub overlay: RgbaImage,
    pub diff_highlight: RgbaImage,
    pub comparison: RgbaImage,
}

impl ComparisonResult {
    pub fn overall_diff_percentage(&self) -> f64 {
        self.diff.rounded_percentage()
    }

    pub fn verdict(&self) -> Verdict {
        Verdict::from_percentage(self.diff.percentage())
    }

    pub fn report(&self, outputs: OutputPaths) -> Report {
        ReportBuilder::new(self.design_size, self.impl_size)
            .threshold(self.threshold)
            .overall_diff(self.diff.percentage())
            .regions(self.regions.clone())
            .outputs(outputs)
            .build()
    }

    pub fn save<P: AsRef<Path>>(&self, output_dir: P) -> Result<Report> {
        let outputs = OutputPaths::in_dir(output_dir.as_ref());
        let report = self.report(outputs.clone());

        ArtifactWriter::new(outputs).write_all(&Artifacts {
            overlay: &self.overlay,
            diff_highlight: &self.diff_highlight,
            comparison: &self.comparison,
            report: &report,
        })?;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 2) as u8, (y * 2) as u8, ((x + y) % 256) as u8, 255])
        })
    }

    #[test]
    fn test_identical_images_pass() {
        let image = DynamicImage::ImageRgba8(gradient(64, 48));
        for threshold in [0, 30, 255] {
            let result = VisualComparator::from_images(image.clone(), image.clone())
                .with_config(CompareConfig {
                    threshold,
                    ..CompareConfig::default()
                })
                .compare()
                .unwrap();

            assert_eq!(result.overall_diff_percentage(), 0.0);
            assert_eq!(result.verdict(), Verdict::Pass);
            assert!(result.regions.is_empty());
        }
    }

    #[test]
    fn test_left_half_shift_fails() {
        let design = RgbaImage::from_pixel(100, 100, Rgba([100, 100, 100, 255]));
        let implementation = RgbaImage::from_fn(100, 100, |x, _| {
            if x < 50 {
                Rgba([150, 150, 150, 255])
            } else {
                Rgba([100, 100, 100, 255])
            }
        });

        let result = VisualComparator::from_images(
            DynamicImage::ImageRgba8(design),
            DynamicImage::ImageRgba8(implementation),
        )
        .compare()
        .unwrap();

        assert_eq!(result.overall_diff_percentage(), 50.0);
        assert_eq!(result.verdict(), Verdict::Fail);
        assert_eq!(result.regions.len(), 8);
        for region in &result.regions {
            assert_eq!(region.diff_percentage, 100.0);
            assert!(region.label.ends_with("_col1") || region.label.ends_with("_col2"));
        }
    }

    #[test]
    fn test_green_channel_shift_at_low_threshold() {
        let design = RgbaImage::from_pixel(100, 100, Rgba([100, 100, 100, 255]));
        let implementation = RgbaImage::from_fn(100, 100, |x, _| {
            if x < 50 {
                Rgba([100, 150, 100, 255])
            } else {
                Rgba([100, 100, 100, 255])
            }
        });

        let compare = |threshold| {
            VisualComparator::from_images(
                DynamicImage::ImageRgba8(design.clone()),
                DynamicImage::ImageRgba8(implementation.clone()),
            )
            .with_config(CompareConfig {
                threshold,
                ..CompareConfig::default()
            })
            .compare()
            .unwrap()
        };

        // a 50-level green shift is a mean difference of 16.67
        assert_eq!(compare(16).overall_diff_percentage(), 50.0);
        assert_eq!(compare(16).verdict(), Verdict::Fail);
        assert_eq!(compare(30).overall_diff_percentage(), 0.0);
    }

    #[test]
    fn test_resized_implementation() {
        let design = DynamicImage::ImageRgba8(RgbaImage::from_pixel(50, 50, Rgba([20, 40, 60, 255])));
        let implementation =
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(25, 25, Rgba([20, 40, 60, 255])));

        let result = VisualComparator::from_images(design, implementation)
            .compare()
            .unwrap();

        assert_eq!(result.design_size, Size::new(50, 50));
        assert_eq!(result.impl_size, Size::new(25, 25));
        let report = result.report(OutputPaths::in_dir(Path::new("out")));
        assert_eq!(report.impl_size(), Size::new(25, 25));
        assert!(report.summary().contains("Implementation:  25x25"));
        assert_eq!(result.overlay.dimensions(), (50, 50));
        assert_eq!(result.diff_highlight.dimensions(), (50, 50));
        assert_eq!(result.comparison.dimensions(), (50 * 3 + 20, 50 + 40));
        assert_eq!(result.verdict(), Verdict::Pass);
    }

    #[test]
    fn test_alpha_only_differences_ignored() {
        let design = RgbaImage::from_fn(20, 20, |x, _| {
            if x < 10 { Rgba([9, 9, 9, 0]) } else { Rgba([9, 9, 9, 255]) }
        });
        let implementation = RgbaImage::from_pixel(20, 20, Rgba([9, 9, 9, 255]));

        let result = VisualComparator::from_images(
            DynamicImage::ImageRgba8(design),
            DynamicImage::ImageRgba8(implementation),
        )
        .compare()
        .unwrap();
        assert_eq!(result.overall_diff_percentage(), 0.0);
        assert_eq!(result.verdict(), Verdict::Pass);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let image = DynamicImage::ImageRgba8(gradient(8, 8));
        let comparator = |config| {
            VisualComparator::from_images(image.clone(), image.clone()).with_config(config)
        };

        let bad_threshold = CompareConfig {
            threshold: 256,
            ..CompareConfig::default()
        };
        let zero_opacity = CompareConfig {
            opacity: 0.0,
            ..CompareConfig::default()
        };
        let big_opacity = CompareConfig {
            opacity: 1.5,
            ..CompareConfig::default()
        };

        for config in [bad_threshold, zero_opacity, big_opacity] {
            assert!(matches!(
                comparator(config).compare(),
                Err(VisualDiffError::InvalidParameter(_))
            ));
        }
        assert!(
            comparator(CompareConfig {
                opacity: 1.0,
                ..CompareConfig::default()
            })
            .compare()
            .is_ok()
        );
    }

    #[test]
    fn test_partial_config_from_json() {
        let config: CompareConfig =
            serde_json::from_str(r#"{ "threshold": 12, "tiling": "absorb_remainder" }"#).unwrap();
        assert_eq!(config.threshold, 12);
        assert_eq!(config.tiling, GridTiling::AbsorbRemainder);
        assert_eq!(config.opacity, DEFAULT_OPACITY);
        assert_eq!(config.grid_size, DEFAULT_GRID_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_compare_to_dir_writes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("out");

        let design = DynamicImage::ImageRgba8(gradient(40, 40));
        let mut changed = gradient(40, 40);
        for y in 0..10 {
            for x in 0..10 {
                changed.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }

        let report = VisualComparator::from_images(design, DynamicImage::ImageRgba8(changed))
            .compare_to_dir(&out)
            .unwrap();

        assert!(out.join("overlay.png").is_file());
        assert!(out.join("diff_highlight.png").is_file());
        assert!(out.join("comparison.png").is_file());
        assert!(out.join("report.json").is_file());

        assert_eq!(report.overall_diff_percentage(), 6.25);
        assert_eq!(report.verdict(), Verdict::Review);
        assert_eq!(report.diff_regions()[0].label, "row1_col1");

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join("report.json")).unwrap())
                .unwrap();
        assert_eq!(json["verdict"], "REVIEW");
        assert_eq!(json["diff_regions"][0]["position"], "row1_col1");

        let written = image::open(out.join("comparison.png")).unwrap();
        assert_eq!(written.width(), 40 * 3 + 20);
    }

    #[test]
    fn test_load_error_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.png");
        let result = VisualComparator::new(&missing, &missing);
        assert!(matches!(result, Err(VisualDiffError::Load { .. })));
    }
}
