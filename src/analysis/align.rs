use image::{DynamicImage, RgbaImage, imageops::{self, FilterType}};
use log::{debug, warn};

use crate::Size;

/// Both images in RGBA at the design image's dimensions.
#[derive(Debug, Clone)]
pub struct AlignedPair {
    pub design: RgbaImage,
    pub implementation: RgbaImage,
    pub design_size: Size,
    /// Size of the implementation image before any resampling.
    pub impl_size: Size,
}

impl AlignedPair {
    pub fn size(&self) -> Size {
        self.design_size
    }

    pub fn was_resized(&self) -> bool {
        self.design_size != self.impl_size
    }
}

pub struct Aligner {
    filter: FilterType,
}

impl Aligner {
    pub fn new() -> Self {
        Self {
            filter: FilterType::Lanczos3,
        }
    }

    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    /// The design image is the sizing reference and is never resized.
    pub fn align(&self, design: DynamicImage, implementation: DynamicImage) -> AlignedPair {
        let design = design.into_rgba8();
        let implementation = implementation.into_rgba8();

        let design_size = Size::of(&design);
        let impl_size = Size::of(&implementation);
        debug!("aligning design {design_size} with implementation {impl_size}");

        let implementation = if design_size == impl_size {
            implementation
        } else {
            warn!("resizing implementation from {impl_size} to {design_size}");
            imageops::resize(
                &implementation,
                design_size.width,
                design_size.height,
                self.filter,
            )
        };

        AlignedPair {
            design,
            implementation,
            design_size,
            impl_size,
        }
    }
}

impl Default for Aligner {
    fn default() -> Self {
        Self::new()
    }
}
