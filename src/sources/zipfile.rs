use std::fs::File;
use std::io::{Read, Seek};
use std::path::PathBuf;

use zip::ZipArchive;

use super::{display_name, is_image_name, natural_order, PageSource, SourceEntry};
use crate::error::ProcessError;

pub struct ZipSource {
    path: PathBuf,
}

impl ZipSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PageSource for ZipSource {
    fn read_pages(&self) -> Result<Vec<SourceEntry>, ProcessError> {
        let mut archive = ZipArchive::new(File::open(&self.path)?)?;
        let pages = read_image_entries(&mut archive)?;
        if pages.is_empty() {
            return Err(ProcessError::EmptySource(self.path.clone()));
        }
        Ok(pages)
    }
}

pub(crate) fn read_image_entries<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<Vec<SourceEntry>, ProcessError> {
    let mut names: Vec<String> = entry_names(archive)?
        .into_iter()
        .filter(|name| is_image_name(name))
        .collect();
    names.sort_by(|a, b| natural_order(a, b));

    names
        .iter()
        .map(|name| {
            Ok(SourceEntry {
                name: display_name(name),
                data: read_entry(archive, name)?,
            })
        })
        .collect()
}

/// Entry names in central directory order.
pub(crate) fn entry_names<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<Vec<String>, ProcessError> {
    (0..archive.len())
        .map(|index| Ok(archive.by_index_raw(index)?.name().to_string()))
        .collect()
}

pub(crate) fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, ProcessError> {
    let mut file = archive.by_name(name)?;
    let mut data = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut data)?;
    Ok(data)
}
