use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single page. Recorded in the batch statistics, never fatal.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("image decode error: {0}")]
    Decode(#[from] image::ImageError),
    #[error("jpeg encode error: {0}")]
    Encode(#[from] jpeg_encoder::EncodingError),
    #[error("image too large to encode: {width}x{height}")]
    Oversized { width: u32, height: u32 },
    #[error("image has no pixels")]
    Empty,
}

/// Failure that aborts processing of a whole archive.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("unsupported input: {}", .0.display())]
    UnsupportedInput(PathBuf),
    #[error("no images found in {}", .0.display())]
    EmptySource(PathBuf),
    #[error("{0} was not found; install it or add it to PATH")]
    ToolMissing(&'static str),
    #[error("extraction of {} failed: {message}", .path.display())]
    Extraction { path: PathBuf, message: String },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("zip error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("optimizer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("optimizer produced no output")]
    EmptyOutput,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
