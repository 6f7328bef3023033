use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisualDiffError {
    #[error("Failed to load image {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode output image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Report serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Images must share dimensions: {0}x{1} vs {2}x{3}")]
    DimensionMismatch(u32, u32, u32, u32),
}

pub type Result<T> = std::result::Result<T, VisualDiffError>;
