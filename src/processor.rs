use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::info;

use crate::compress::{CompressOptions, CompressionEngine};
use crate::error::ProcessError;
use crate::pipeline::{
    BatchProgress, CompressionWorker, PageTask, ParallelPipeline, ProcessingStatistics,
};
use crate::settings::{CompressionConfig, CropConfig, Settings};
use crate::sources::{open_source, SourceKind};
use crate::tools::ExternalTools;

pub const OUTPUT_SUFFIX: &str = "_tinypic";
pub const OUTPUT_EXTENSION: &str = "cbz";

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProcessOptions {
    pub compression: CompressionConfig,
    pub crop: CropConfig,
    pub force_grayscale: bool,
}

impl ProcessOptions {
    pub fn from_settings(settings: &Settings, force_grayscale: bool) -> Self {
        Self {
            compression: settings.compression_config(),
            crop: settings.crop_config(),
            force_grayscale,
        }
    }

    fn compress_options(&self) -> CompressOptions {
        CompressOptions {
            target_quality: self.compression.target_quality,
            crop: self.crop,
            force_grayscale: self.force_grayscale,
        }
    }
}

/// Compresses one folder or archive into a CBZ next to it.
pub struct ArchiveProcessor {
    options: ProcessOptions,
    tools: ExternalTools,
    engine: CompressionEngine,
    cancel: Arc<AtomicBool>,
}

impl ArchiveProcessor {
    pub fn new(options: ProcessOptions, tools: ExternalTools) -> Self {
        let engine = match tools.optimizer() {
            Some(optimizer) => CompressionEngine::with_optimizer(optimizer),
            None => CompressionEngine::new(),
        };
        Self {
            options,
            tools,
            engine,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Pages finished before the flag is raised are still written.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn process(
        &self,
        input: &Path,
        progress: Option<&mut dyn FnMut(BatchProgress)>,
    ) -> Result<(PathBuf, ProcessingStatistics), ProcessError> {
        self.cancel.store(false, Ordering::SeqCst);

        let kind = SourceKind::detect(input)?;
        let pages = open_source(input, &self.tools)?.read_pages()?;
        let output_path = output_path_for(input, kind);
        info!(
            input = %input.display(),
            pages = pages.len(),
            output = %output_path.display(),
            "processing"
        );

        let tasks: Vec<PageTask> = pages
            .into_iter()
            .enumerate()
            .map(|(index, entry)| PageTask {
                index,
                name: entry.name,
                data: entry.data,
                is_cover: index == 0,
            })
            .collect();

        let worker = CompressionWorker::new(self.engine.clone(), self.options.compress_options());
        let pipeline = ParallelPipeline::new(
            self.options.compression.thread_count,
            Arc::clone(&self.cancel),
        );

        let output_dir = output_dir_of(&output_path);
        let temp = NamedTempFile::new_in(&output_dir)?;
        let (temp, statistics) = pipeline.run_to_archive(tasks, &worker, temp, progress)?;
        temp.persist(&output_path).map_err(io::Error::from)?;

        info!(
            output = %output_path.display(),
            original = statistics.original_size,
            compressed = statistics.compressed_size,
            ratio = statistics.ratio(),
            errors = statistics.errors.len(),
            cancelled = statistics.cancelled,
            "archive written"
        );
        Ok((output_path, statistics))
    }
}

/// `<parent>/<stem>_tinypic.cbz`. Re-processing an earlier output does not
/// stack another suffix.
pub fn output_path_for(input: &Path, kind: SourceKind) -> PathBuf {
    let stem = match kind {
        SourceKind::Folder => input
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string()),
        _ => {
            let stem = input
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .unwrap_or_else(|| "output".to_string());
            match stem.strip_suffix(OUTPUT_SUFFIX) {
                Some(base) => base.to_string(),
                None => stem,
            }
        }
    };

    let parent = input
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    parent.join(format!("{}{}.{}", stem, OUTPUT_SUFFIX, OUTPUT_EXTENSION))
}

fn output_dir_of(output_path: &Path) -> PathBuf {
    output_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
