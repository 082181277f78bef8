//! Batch recompression of manga and comic archives.
//!
//! A folder, ZIP/CBZ, RAR/CBR or EPUB is read into an ordered list of page
//! images. Each page is cropped, optionally split when it is a two-page
//! spread, re-encoded as JPEG on a worker pool, and the results are written
//! in their original order into a single stored CBZ next to the input.

pub mod compress;
pub mod crop;
pub mod error;
pub mod pipeline;
pub mod processor;
pub mod settings;
pub mod sources;
pub mod splitter;
pub mod tools;

pub use compress::{
    estimate_quality, is_grayscale, CompressOptions, CompressedPage, CompressedSpread,
    CompressionEngine, CompressionStats, JpegOptimizer, Jpegtran,
};
pub use crop::{apply_crop, crop_margins, crop_page_number, BoundingBox};
pub use error::{OptimizeError, PageError, ProcessError, SettingsError};
pub use pipeline::{
    BatchProgress, CompressionWorker, PageFailure, PageResult, PageTask, PageWorker,
    ParallelPipeline, ProcessingStatistics,
};
pub use processor::{output_path_for, ArchiveProcessor, ProcessOptions};
pub use settings::{CompressionConfig, CropConfig, CropMode, Settings};
pub use sources::{open_source, PageSource, SourceEntry, SourceKind};
pub use splitter::{is_wide, split_wide};
pub use tools::ExternalTools;
