use std::io::{Seek, Write};

use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{PageResult, ProcessingStatistics};
use crate::error::ProcessError;

pub fn pad_width(total_pages: usize) -> usize {
    total_pages.max(1).to_string().len()
}

pub fn page_entry_name(page: usize, width: usize) -> String {
    format!("{:0width$}.jpg", page, width = width)
}

/// Writes the pages of `results` (already in index order) as stored entries
/// numbered from 1, and folds their sizes into `statistics`.
pub fn write_cbz<W: Write + Seek>(
    output: W,
    results: &[PageResult],
    statistics: &mut ProcessingStatistics,
) -> Result<W, ProcessError> {
    let total_pages: usize = results.iter().map(|result| result.pages().len()).sum();
    let width = pad_width(total_pages);

    let mut writer = ZipWriter::new(output);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .unix_permissions(0o644);

    let mut page = 1usize;
    for result in results {
        if result.outcome.is_err() {
            continue;
        }

        for data in result.pages() {
            writer.start_file(page_entry_name(page, width), options)?;
            writer.write_all(data)?;
            statistics.compressed_size += data.len() as u64;
            page += 1;
        }
        statistics.original_size += result.original_size;
        statistics.processed_files += 1;
    }
    statistics.pages_written = page - 1;

    let output = writer.finish()?;
    let spreads = results.iter().filter(|result| result.expanded()).count();
    debug!(pages = statistics.pages_written, spreads, "archive written");
    Ok(output)
}
