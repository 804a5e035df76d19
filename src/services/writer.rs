use crate::error::{ComicMergeError, Result};
use crate::services::reader::ArchiveReader;
use crate::types::{Chunk, Page};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Number of decimal digits needed to print `n`.
pub fn digit_width(n: usize) -> usize {
    n.max(1).to_string().len()
}

/// Keeps the most recently used source archive open while a chunk is
/// written, since consecutive pages usually share a source.
#[derive(Default)]
struct SourceCache {
    current: Option<(usize, ZipArchive<BufReader<File>>)>,
}

impl SourceCache {
    fn get(&mut self, page: &Page) -> Result<&mut ZipArchive<BufReader<File>>> {
        let stale = self
            .current
            .as_ref()
            .map(|(source, _)| *source != page.source)
            .unwrap_or(true);

        if stale {
            debug!("Opening source archive: {}", page.archive.display());
            let archive = ArchiveReader::open(&page.archive)?;
            self.current = Some((page.source, archive));
        }

        self.current
            .as_mut()
            .map(|(_, archive)| archive)
            .ok_or_else(|| {
                ComicMergeError::unreadable(&*page.archive, "source archive is not open")
            })
    }
}

pub struct ArchiveWriter {
    page_width: usize,
    chapter_width: Option<usize>,
}

impl ArchiveWriter {
    /// `total_pages` is the page count of the whole merge so that names
    /// sort the same way across every chunk. `chapter_width` enables
    /// per-chapter folders.
    pub fn new(total_pages: usize, chapter_width: Option<usize>) -> Self {
        Self {
            page_width: digit_width(total_pages),
            chapter_width,
        }
    }

    pub fn entry_name(&self, page: &Page) -> String {
        let mut name = format!("{:0width$}", page.sequence, width = self.page_width);
        if let Some(ext) = page.extension() {
            name.push('.');
            name.push_str(&ext);
        }

        match (self.chapter_width, page.chapter) {
            (Some(width), Some(chapter)) => format!("{:0width$}/{}", chapter, name, width = width),
            _ => name,
        }
    }

    /// Writes one chunk as a new archive. On failure the partial file is removed.
    pub fn write_chunk(&self, chunk: &Chunk, path: &Path) -> Result<PathBuf> {
        let write_error = |reason: String| ComicMergeError::WriteError {
            path: path.to_path_buf(),
            chunk: chunk.index,
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| write_error(format!("Failed to create output directory: {}", e)))?;
        }

        let file = File::create(path).map_err(|e| write_error(e.to_string()))?;

        if let Err(e) = self.write_entries(chunk, file) {
            if let Err(remove_err) = fs::remove_file(path) {
                warn!(
                    "Failed to remove partial output {}: {}",
                    path.display(),
                    remove_err
                );
            }
            return Err(write_error(e.to_string()));
        }

        debug!(
            "Wrote chunk {} with {} pages to {}",
            chunk.index,
            chunk.pages.len(),
            path.display()
        );

        Ok(path.to_path_buf())
    }

    fn write_entries(&self, chunk: &Chunk, file: File) -> Result<()> {
        let mut zip = ZipWriter::new(BufWriter::new(file));
        // Pages are already compressed images.
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut sources = SourceCache::default();

        for page in &chunk.pages {
            let archive = sources.get(page)?;
            let mut entry = archive.by_index(page.entry_index)?;

            zip.start_file(self.entry_name(page), options)?;
            std::io::copy(&mut entry, &mut zip)?;
        }

        let mut out = zip.finish()?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{read_entries, write_cbz, write_file};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn page(
        archive: &Arc<Path>,
        entry_index: usize,
        name: &str,
        sequence: usize,
        chapter: Option<usize>,
    ) -> Page {
        Page {
            source: 0,
            archive: Arc::clone(archive),
            entry_index,
            name: name.to_string(),
            size: 1,
            sequence,
            chapter,
        }
    }

    fn chunk(pages: Vec<Page>) -> Chunk {
        Chunk {
            index: 1,
            bytes: pages.iter().map(|p| p.size).sum(),
            pages,
            chapters: Vec::new(),
            oversize: false,
        }
    }

    #[test]
    fn test_digit_width() {
        assert_eq!(digit_width(0), 1);
        assert_eq!(digit_width(9), 1);
        assert_eq!(digit_width(10), 2);
        assert_eq!(digit_width(1234), 4);
    }

    #[test]
    fn test_entry_names() {
        let archive: Arc<Path> = Arc::from(Path::new("a.cbz"));
        let flat = ArchiveWriter::new(120, None);
        assert_eq!(flat.entry_name(&page(&archive, 0, "x/scan 7.png", 7, None)), "007.png");
        assert_eq!(flat.entry_name(&page(&archive, 0, "noext", 12, None)), "012");

        let chaptered = ArchiveWriter::new(120, Some(2));
        assert_eq!(
            chaptered.entry_name(&page(&archive, 0, "p.jpg", 45, Some(3))),
            "03/045.jpg"
        );
    }

    #[test]
    fn test_write_chunk_renames_in_order() {
        let dir = TempDir::new().unwrap();
        let source_path = dir.path().join("src.cbz");
        write_cbz(&source_path, &[("b.jpg", &b"second"[..]), ("a.jpg", &b"first"[..])]);
        let archive: Arc<Path> = Arc::from(source_path.as_path());

        let pages = vec![
            page(&archive, 0, "b.jpg", 9, None),
            page(&archive, 1, "a.jpg", 10, None),
        ];
        let out = dir.path().join("nested/out.cbz");
        let written = ArchiveWriter::new(10, None).write_chunk(&chunk(pages), &out).unwrap();

        assert_eq!(written, out);
        let entries = read_entries(&out);
        assert_eq!(
            entries,
            vec![
                ("09.jpg".to_string(), b"second".to_vec()),
                ("10.jpg".to_string(), b"first".to_vec()),
            ]
        );
    }

    #[test]
    fn test_failed_write_removes_partial_file() {
        let dir = TempDir::new().unwrap();
        let source_path = dir.path().join("src.cbz");
        write_cbz(&source_path, &[("1.jpg", &b"one"[..])]);
        let good: Arc<Path> = Arc::from(source_path.as_path());
        let gone: Arc<Path> = Arc::from(dir.path().join("vanished.cbz").as_path());

        let pages = vec![
            page(&good, 0, "1.jpg", 1, None),
            Page {
                source: 1,
                ..page(&gone, 0, "2.jpg", 2, None)
            },
        ];
        let out = dir.path().join("out.cbz");
        let result = ArchiveWriter::new(2, None).write_chunk(&chunk(pages), &out);

        assert!(matches!(
            result,
            Err(ComicMergeError::WriteError { chunk: 1, .. })
        ));
        assert!(!out.exists());
    }

    #[test]
    fn test_unwritable_destination_is_write_error() {
        let dir = TempDir::new().unwrap();
        let source_path = dir.path().join("src.cbz");
        write_cbz(&source_path, &[("1.jpg", &b"one"[..])]);
        let archive: Arc<Path> = Arc::from(source_path.as_path());

        // The output's parent directory is a regular file.
        let blocker = dir.path().join("blocker");
        write_file(&blocker, b"not a directory");
        let out = blocker.join("out.cbz");

        let result = ArchiveWriter::new(1, None)
            .write_chunk(&chunk(vec![page(&archive, 0, "1.jpg", 1, None)]), &out);
        assert!(matches!(
            result,
            Err(ComicMergeError::WriteError { chunk: 1, .. })
        ));
        assert!(!out.exists());
    }
}
