use std::fs;
use std::path::PathBuf;
use std::process::Command;

use crate::error::OptimizeError;

/// Lossless post-pass over an already encoded JPEG.
pub trait JpegOptimizer: Send + Sync {
    fn optimize(&self, jpeg: &[u8]) -> Result<Vec<u8>, OptimizeError>;
}

#[derive(Debug, Clone)]
pub struct Jpegtran {
    executable: PathBuf,
}

impl Jpegtran {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

impl JpegOptimizer for Jpegtran {
    fn optimize(&self, jpeg: &[u8]) -> Result<Vec<u8>, OptimizeError> {
        let workdir = tempfile::tempdir()?;
        let input = workdir.path().join("in.jpg");
        let output = workdir.path().join("out.jpg");
        fs::write(&input, jpeg)?;

        let result = Command::new(&self.executable)
            .args(["-copy", "none", "-optimize", "-progressive", "-outfile"])
            .arg(&output)
            .arg(&input)
            .output()?;

        if !result.status.success() {
            return Err(OptimizeError::Failed {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let optimized = fs::read(&output)?;
        if optimized.is_empty() {
            return Err(OptimizeError::EmptyOutput);
        }
        Ok(optimized)
    }
}
