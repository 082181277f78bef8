use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::compress::{JpegOptimizer, Jpegtran};

const SEVEN_ZIP_NAMES: &[&str] = &["7z", "7za"];
const JPEGTRAN_NAME: &str = "jpegtran";
const WINDOWS_SEVEN_ZIP_PATHS: &[&str] = &[
    r"C:\Program Files\7-Zip\7z.exe",
    r"C:\Program Files (x86)\7-Zip\7z.exe",
    r"D:\Program Files\7-Zip\7z.exe",
    r"D:\Program Files (x86)\7-Zip\7z.exe",
];

/// Helper executables found on this machine. Resolved once and passed to
/// whatever needs them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalTools {
    pub seven_zip: Option<PathBuf>,
    pub jpegtran: Option<PathBuf>,
}

impl ExternalTools {
    pub fn discover() -> Self {
        let seven_zip = SEVEN_ZIP_NAMES
            .iter()
            .find_map(|name| which::which(name).ok())
            .or_else(|| {
                WINDOWS_SEVEN_ZIP_PATHS
                    .iter()
                    .map(Path::new)
                    .find(|path| path.is_file())
                    .map(Path::to_path_buf)
            });
        let jpegtran = which::which(JPEGTRAN_NAME).ok();

        debug!(?seven_zip, ?jpegtran, "external tools resolved");
        Self {
            seven_zip,
            jpegtran,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn optimizer(&self) -> Option<Arc<dyn JpegOptimizer>> {
        self.jpegtran
            .as_ref()
            .map(|path| Arc::new(Jpegtran::new(path.clone())) as Arc<dyn JpegOptimizer>)
    }
}
