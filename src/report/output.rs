use std::{
    fs,
    io::{Cursor, Write as _},
    path::Path,
};

use image::{ImageFormat, RgbaImage};
use log::info;
use tempfile::NamedTempFile;

use crate::{
    error::{Result, VisualDiffError},
    report::{OutputPaths, Report},
};

pub struct Artifacts<'a> {
    pub overlay: &'a RgbaImage,
    pub diff_highlight: &'a RgbaImage,
    pub comparison: &'a RgbaImage,
    pub report: &'a Report,
}

/// Writes all artifacts of a run. Nothing is written unless every artifact
/// encodes and stages, and a destination is only ever replaced by a complete
/// file, never truncated in place.
pub struct ArtifactWriter {
    paths: OutputPaths,
}

impl ArtifactWriter {
    pub fn new(paths: OutputPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    /// Stages every artifact as a temporary file next to its destination and
    /// only renames them into place once all four are fully written. The
    /// report is renamed last, so it never references an image from another
    /// run that failed halfway.
    pub fn write_all(&self, artifacts: &Artifacts<'_>) -> Result<()> {
        // encode everything up front so nothing touches disk on failure
        let files = [
            (&self.paths.overlay, encode_png(artifacts.overlay)?),
            (&self.paths.diff_highlight, encode_png(artifacts.diff_highlight)?),
            (&self.paths.comparison, encode_png(artifacts.comparison)?),
            (&self.paths.report, artifacts.report.to_json()?.into_bytes()),
        ];

        let dir = self
            .paths
            .dir()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        fs::create_dir_all(dir).map_err(|source| VisualDiffError::Write {
            path: dir.to_path_buf(),
            source,
        })?;

        // dropping a NamedTempFile removes it, so an early return cleans up
        let mut staged = Vec::with_capacity(files.len());
        for (path, bytes) in &files {
            staged.push((*path, stage(dir, path, bytes)?));
        }

        for (path, temp) in staged {
            temp.persist(path).map_err(|err| VisualDiffError::Write {
                path: path.clone(),
                source: err.error,
            })?;
        }

        info!("wrote {} artifacts to {}", files.len(), dir.display());
        Ok(())
    }
}

fn stage(dir: &Path, destination: &Path, bytes: &[u8]) -> Result<NamedTempFile> {
    let write_error = |source| VisualDiffError::Write {
        path: destination.to_path_buf(),
        source,
    };

    let mut temp = tempfile::Builder::new()
        .prefix(".visual-diff-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(write_error)?;
    temp.write_all(bytes).map_err(write_error)?;
    temp.as_file().sync_all().map_err(write_error)?;

    Ok(temp)
}

fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(VisualDiffError::Encode)?;
    Ok(buffer.into_inner())
}
