use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{file_name_of, is_image_name, sort_paths_by_file_name, PageSource, SourceEntry};
use crate::error::ProcessError;

pub struct FolderSource {
    root: PathBuf,
}

impl FolderSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PageSource for FolderSource {
    fn read_pages(&self) -> Result<Vec<SourceEntry>, ProcessError> {
        let paths = collect_image_files(&self.root)?;
        if paths.is_empty() {
            return Err(ProcessError::EmptySource(self.root.clone()));
        }

        paths
            .into_iter()
            .map(|path| {
                Ok(SourceEntry {
                    name: file_name_of(&path),
                    data: fs::read(&path)?,
                })
            })
            .collect()
    }
}

pub(crate) fn collect_image_files(root: &Path) -> Result<Vec<PathBuf>, ProcessError> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|err| {
            let kind = err
                .io_error()
                .map(|io_err| io_err.kind())
                .unwrap_or(io::ErrorKind::Other);
            ProcessError::Io(io::Error::new(kind, err.to_string()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if is_image_name(&entry.file_name().to_string_lossy()) {
            paths.push(entry.into_path());
        }
    }

    sort_paths_by_file_name(&mut paths);
    Ok(paths)
}
