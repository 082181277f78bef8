//! Readers that turn an input path into an ordered list of raw page images.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use natord::compare_ignore_case;

use crate::error::ProcessError;
use crate::tools::ExternalTools;

mod epub;
mod folder;
mod rar;
mod zipfile;

pub use self::epub::EpubSource;
pub use self::folder::FolderSource;
pub use self::rar::RarSource;
pub use self::zipfile::ZipSource;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "gif"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Folder,
    ZipLike,
    RarLike,
    Epub,
}

impl SourceKind {
    pub fn detect(path: &Path) -> Result<Self, ProcessError> {
        if path.is_dir() {
            return Ok(SourceKind::Folder);
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("zip" | "cbz") => Ok(SourceKind::ZipLike),
            Some("rar" | "cbr") => Ok(SourceKind::RarLike),
            Some("epub") => Ok(SourceKind::Epub),
            _ => Err(ProcessError::UnsupportedInput(path.to_path_buf())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Bare file name, used in progress and error reports.
    pub name: String,
    pub data: Vec<u8>,
}

pub trait PageSource {
    fn read_pages(&self) -> Result<Vec<SourceEntry>, ProcessError>;
}

/// Picks the reader for `path`. RAR input needs 7-Zip and fails up front
/// when it is not available.
pub fn open_source(
    path: &Path,
    tools: &ExternalTools,
) -> Result<Box<dyn PageSource>, ProcessError> {
    let source: Box<dyn PageSource> = match SourceKind::detect(path)? {
        SourceKind::Folder => Box::new(FolderSource::new(path)),
        SourceKind::ZipLike => Box::new(ZipSource::new(path)),
        SourceKind::Epub => Box::new(EpubSource::new(path)),
        SourceKind::RarLike => {
            let seven_zip = tools
                .seven_zip
                .clone()
                .ok_or(ProcessError::ToolMissing("7-Zip"))?;
            Box::new(RarSource::new(path, seven_zip))
        }
    };
    Ok(source)
}

pub fn is_image_name(name: &str) -> bool {
    if name.ends_with('/') {
        return false;
    }
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn natural_order(a: &str, b: &str) -> Ordering {
    compare_ignore_case(a, b)
}

pub fn display_name(entry: &str) -> String {
    let trimmed = entry.trim_end_matches('/');
    trimmed
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn sort_paths_by_file_name(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| natural_order(&file_name_of(a), &file_name_of(b)));
}
