//! Input discovery and output paths.

use crate::constants::output_extensions;
use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Kind of per-image output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Persisted detections as GeoJSON.
    Detections,
    /// Notification events as JSON Lines.
    Notifications,
}

/// Determine the output directory for an image.
pub fn output_dir_for(input: &Path, explicit_output_dir: Option<&Path>) -> PathBuf {
    explicit_output_dir.map_or_else(
        || {
            input
                .parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
        },
        Path::to_path_buf,
    )
}

/// Get the output file path of `kind` for an image.
pub fn output_path_for(input: &Path, output_dir: &Path, kind: OutputKind) -> PathBuf {
    // non-UTF-8 stems are kept lossily
    let stem = input.file_stem().map_or_else(
        || std::borrow::Cow::Borrowed("output"),
        |s| s.to_string_lossy(),
    );

    let extension = match kind {
        OutputKind::Detections => output_extensions::DETECTIONS,
        OutputKind::Notifications => output_extensions::NOTIFICATIONS,
    };

    output_dir.join(format!("{stem}{extension}"))
}

/// Collect GeoTIFF inputs from paths (files and directories).
pub fn collect_input_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_raster_file(path) {
                files.push(path.clone());
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            collect_raster_files_recursive(path, &mut files)?;
        } else {
            warn!("Skipping non-existent path: {}", path.display());
        }
    }

    files.sort();
    Ok(files)
}

fn collect_raster_files_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_raster_files_recursive(&path, files)?;
        } else if is_raster_file(&path) {
            files.push(path);
        }
    }
    Ok(())
}

/// Check if a file looks like a GeoTIFF.
fn is_raster_file(path: &Path) -> bool {
    use std::ffi::OsStr;

    path.extension().is_some_and(|ext| {
        ext.eq_ignore_ascii_case(OsStr::new("tif")) || ext.eq_ignore_ascii_case(OsStr::new("tiff"))
    })
}
