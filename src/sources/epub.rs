use std::fs::File;
use std::io::{Read, Seek};
use std::path::PathBuf;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use zip::ZipArchive;

use super::zipfile::{entry_names, read_entry, read_image_entries};
use super::{display_name, PageSource, SourceEntry};
use crate::error::ProcessError;

/// EPUB books. Pages follow the package manifest when it lists images,
/// otherwise every image in the container is used in natural order.
pub struct EpubSource {
    path: PathBuf,
}

impl EpubSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PageSource for EpubSource {
    fn read_pages(&self) -> Result<Vec<SourceEntry>, ProcessError> {
        let mut archive = ZipArchive::new(File::open(&self.path)?)?;

        let mut pages = manifest_images(&mut archive).unwrap_or_default();
        if pages.is_empty() {
            debug!(book = %self.path.display(), "no manifest images, listing container");
            pages = read_image_entries(&mut archive)?;
        }
        if pages.is_empty() {
            return Err(ProcessError::EmptySource(self.path.clone()));
        }
        Ok(pages)
    }
}

fn manifest_images<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Option<Vec<SourceEntry>> {
    let names = entry_names(archive).ok()?;
    let opf_name = names.iter().find(|name| name.ends_with(".opf"))?.clone();
    let opf = read_entry(archive, &opf_name).ok()?;
    let opf_dir = opf_name
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .unwrap_or("");

    let hrefs = image_hrefs(&String::from_utf8_lossy(&opf))?;
    let mut pages = Vec::with_capacity(hrefs.len());
    for href in hrefs {
        let full_path = if opf_dir.is_empty() {
            href.clone()
        } else {
            format!("{}/{}", opf_dir, href)
        }
        .replace('\\', "/");

        let resolved = if names.contains(&full_path) {
            Some(full_path)
        } else {
            names.iter().find(|name| name.ends_with(&href)).cloned()
        };
        let Some(name) = resolved else {
            continue;
        };

        let data = match read_entry(archive, &name) {
            Ok(data) => data,
            Err(err) => {
                debug!(entry = %name, error = %err, "skipping unreadable manifest image");
                continue;
            }
        };
        pages.push(SourceEntry {
            name: display_name(&name),
            data,
        });
    }
    Some(pages)
}

fn image_hrefs(opf: &str) -> Option<Vec<String>> {
    let document = Html::parse_document(opf);
    let any = Selector::parse("*").ok()?;
    let manifest = document
        .select(&any)
        .find(|element| local_name(element.value().name()) == "manifest")?;

    Some(
        manifest
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|item| local_name(item.value().name()) == "item")
            .filter(|item| {
                item.value()
                    .attr("media-type")
                    .is_some_and(|media| media.starts_with("image/"))
            })
            .filter_map(|item| item.value().attr("href"))
            .filter(|href| !href.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

fn local_name(tag: &str) -> &str {
    tag.rsplit(':').next().unwrap_or(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Sample</dc:title>
    <meta name="cover" content="cover-image"/>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover-image" href="images/cover.jpg" media-type="image/jpeg"/>
    <item id="p1" href="images/page1.png" media-type="image/png"/>
    <item id="style" href="style.css" media-type="text/css"/>
    <item id="p2" href="misplaced/page2.jpg" media-type="image/jpeg"/>
  </manifest>
  <spine>
    <itemref idref="nav"/>
  </spine>
</package>"#;

    fn write_epub(path: &std::path::Path, files: &[(&str, &str)]) {
        let mut writer = ZipWriter::new(File::create(path).expect("create"));
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, data) in files {
            writer.start_file(*name, options).expect("start");
            writer.write_all(data.as_bytes()).expect("write");
        }
        writer.finish().expect("finish");
    }

    #[test]
    fn manifest_order_and_suffix_fallback() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("book.epub");
        write_epub(
            &path,
            &[
                ("mimetype", "application/epub+zip"),
                ("OEBPS/content.opf", OPF),
                ("OEBPS/images/page1.png", "one"),
                ("OEBPS/images/cover.jpg", "cover"),
                ("extra/misplaced/page2.jpg", "two"),
                ("OEBPS/images/unlisted.jpg", "skip"),
            ],
        );

        let pages = EpubSource::new(&path).read_pages().expect("read epub");
        let names: Vec<&str> = pages.iter().map(|page| page.name.as_str()).collect();
        assert_eq!(names, vec!["cover.jpg", "page1.png", "page2.jpg"]);
        assert_eq!(pages[2].data, b"two");
    }

    #[test]
    fn without_manifest_all_images_are_listed() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("loose.epub");
        write_epub(
            &path,
            &[
                ("mimetype", "application/epub+zip"),
                ("img/p10.jpg", "10"),
                ("img/p2.jpg", "2"),
                ("text/ch1.xhtml", "<html/>"),
            ],
        );

        let pages = EpubSource::new(&path).read_pages().expect("read epub");
        let names: Vec<&str> = pages.iter().map(|page| page.name.as_str()).collect();
        assert_eq!(names, vec!["p2.jpg", "p10.jpg"]);
    }

    #[test]
    fn epub_without_images_is_empty_source() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("text.epub");
        write_epub(
            &path,
            &[
                ("mimetype", "application/epub+zip"),
                ("content.opf", "<package><manifest></manifest></package>"),
            ],
        );

        let result = EpubSource::new(&path).read_pages();
        assert!(matches!(result, Err(ProcessError::EmptySource(_))));
    }

    #[test]
    fn prefixed_manifest_keeps_its_order() {
        let opf = r#"<?xml version="1.0" encoding="UTF-8"?>
<opf:package xmlns:opf="http://www.idpf.org/2007/opf" version="2.0">
  <opf:manifest>
    <opf:item id="z" href="z.jpg" media-type="image/jpeg"/>
    <opf:item id="toc" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <opf:item id="a" href="a.jpg" media-type="image/jpeg"/>
  </opf:manifest>
</opf:package>"#;
        assert_eq!(
            image_hrefs(opf).expect("parse"),
            vec!["z.jpg".to_string(), "a.jpg".to_string()]
        );

        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("prefixed.epub");
        write_epub(
            &path,
            &[
                ("mimetype", "application/epub+zip"),
                ("content.opf", opf),
                ("a.jpg", "first by name"),
                ("z.jpg", "first by manifest"),
            ],
        );

        let pages = EpubSource::new(&path).read_pages().expect("read epub");
        let names: Vec<&str> = pages.iter().map(|page| page.name.as_str()).collect();
        assert_eq!(names, vec!["z.jpg", "a.jpg"]);
    }

    #[test]
    fn unreadable_manifest_image_keeps_the_rest() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("damaged.epub");
        write_epub(
            &path,
            &[
                ("mimetype", "application/epub+zip"),
                ("OEBPS/content.opf", OPF),
                ("OEBPS/images/cover.jpg", "cover"),
                ("OEBPS/images/page1.png", "PAGE-ONE-PAYLOAD"),
                ("extra/misplaced/page2.jpg", "two"),
            ],
        );

        // Corrupt the stored bytes of one entry so its checksum fails.
        let mut bytes = std::fs::read(&path).expect("read epub bytes");
        let marker = b"PAGE-ONE-PAYLOAD";
        let at = bytes
            .windows(marker.len())
            .position(|window| window == marker)
            .expect("payload stored verbatim");
        bytes[at..at + marker.len()].copy_from_slice(b"XXXX-XXX-XXXXXXX");
        std::fs::write(&path, bytes).expect("write epub bytes");

        let pages = EpubSource::new(&path).read_pages().expect("read epub");
        let names: Vec<&str> = pages.iter().map(|page| page.name.as_str()).collect();
        assert_eq!(names, vec!["cover.jpg", "page2.jpg"]);
    }

    #[test]
    fn hrefs_skip_non_images() {
        let hrefs = image_hrefs(OPF).expect("parse");
        assert_eq!(
            hrefs,
            vec![
                "images/cover.jpg".to_string(),
                "images/page1.png".to_string(),
                "misplaced/page2.jpg".to_string()
            ]
        );
    }
}
