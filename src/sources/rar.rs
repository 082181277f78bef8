use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use super::folder::collect_image_files;
use super::{file_name_of, PageSource, SourceEntry};
use crate::error::ProcessError;

/// RAR and CBR archives, unpacked with an external 7-Zip into a temporary
/// directory that is removed afterwards.
pub struct RarSource {
    path: PathBuf,
    seven_zip: PathBuf,
}

impl RarSource {
    pub fn new(path: impl Into<PathBuf>, seven_zip: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seven_zip: seven_zip.into(),
        }
    }

    fn extract_args(&self, destination: &Path) -> Vec<OsString> {
        let mut output_flag = OsString::from("-o");
        output_flag.push(destination.as_os_str());
        vec![
            "x".into(),
            "-y".into(),
            output_flag,
            self.path.as_os_str().to_os_string(),
        ]
    }
}

impl PageSource for RarSource {
    fn read_pages(&self) -> Result<Vec<SourceEntry>, ProcessError> {
        let workdir = tempfile::tempdir()?;
        debug!(archive = %self.path.display(), "extracting with 7-Zip");

        let output = Command::new(&self.seven_zip)
            .args(self.extract_args(workdir.path()))
            .output()?;
        if !output.status.success() {
            return Err(ProcessError::Extraction {
                path: self.path.clone(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let paths = collect_image_files(workdir.path())?;
        if paths.is_empty() {
            return Err(ProcessError::EmptySource(self.path.clone()));
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_command_line() {
        let source = RarSource::new("/books/vol1.cbr", "/usr/bin/7z");
        let args = source.extract_args(Path::new("/tmp/out"));
        let args: Vec<String> = args
            .iter()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect();
        assert_eq!(args, vec!["x", "-y", "-o/tmp/out", "/books/vol1.cbr"]);
    }

    #[test]
    fn missing_extractor_is_io_error() {
        let source = RarSource::new("/books/vol1.cbr", "/nonexistent/7z-missing");
        assert!(matches!(source.read_pages(), Err(ProcessError::Io(_))));
    }
}
