use crate::error::{ComicMergeError, Result};
use crate::services::reader::ArchiveReader;
use crate::types::{
    ArchiveFormat, Chapter, Page, PageStream, SourceArchive, SourceStatus, SourceSummary,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of reading every source in input order.
#[derive(Debug, Clone)]
pub struct SequencedStream {
    pub stream: PageStream,
    pub sources: Vec<SourceSummary>,
}

impl SequencedStream {
    pub fn skipped_count(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| matches!(s.status, SourceStatus::Skipped(_)))
            .count()
    }
}

pub struct PageSequencer {
    chapter_mode: bool,
}

impl PageSequencer {
    pub fn new(chapter_mode: bool) -> Self {
        Self { chapter_mode }
    }

    /// Reads each source in order and numbers its pages. `on_source` is
    /// called once per source right after it has been read.
    pub fn sequence<F>(&self, paths: &[PathBuf], mut on_source: F) -> Result<SequencedStream>
    where
        F: FnMut(usize, &SourceSummary),
    {
        let mut reads = Vec::with_capacity(paths.len());

        for (idx, path) in paths.iter().enumerate() {
            let format = ArchiveFormat::from_path(path).unwrap_or(ArchiveFormat::Cbz);
            let read = ArchiveReader::read(path, format);

            let summary = Self::summarize(idx, path, &read);
            on_source(idx, &summary);

            match read {
                Ok(archive) => reads.push((path.clone(), Ok(archive))),
                Err(e) if !e.is_fatal() => reads.push((path.clone(), Err(e))),
                Err(e) => return Err(e),
            }
        }

        Ok(self.assign(reads))
    }

    /// Numbers pages across already-read sources. The page counter is local
    /// to this single pass.
    pub fn assign(&self, reads: Vec<(PathBuf, Result<SourceArchive>)>) -> SequencedStream {
        let mut next_sequence = 1;
        let mut flat = Vec::new();
        let mut chapters = Vec::new();
        let mut sources = Vec::with_capacity(reads.len());

        for (idx, (path, read)) in reads.into_iter().enumerate() {
            sources.push(Self::summarize(idx, &path, &read));

            let archive = match read {
                Ok(archive) => archive,
                Err(ComicMergeError::EmptyArchive { .. }) => {
                    debug!("Source {} has no pages, contributing nothing", path.display());
                    continue;
                }
                Err(e) => {
                    warn!("Skipping source {}: {}", path.display(), e);
                    continue;
                }
            };

            let handle: Arc<Path> = Arc::from(archive.path.as_path());
            let chapter = self.chapter_mode.then_some(idx + 1);

            let pages: Vec<Page> = archive
                .entries
                .into_iter()
                .map(|entry| {
                    let page = Page {
                        source: idx,
                        archive: Arc::clone(&handle),
                        entry_index: entry.index,
                        name: entry.name,
                        size: entry.size,
                        sequence: next_sequence,
                        chapter,
                    };
                    next_sequence += 1;
                    page
                })
                .collect();

            if self.chapter_mode {
                chapters.push(Chapter {
                    index: idx + 1,
                    source: path,
                    pages,
                });
            } else {
                flat.extend(pages);
            }
        }

        let stream = if self.chapter_mode {
            PageStream::Chapters(chapters)
        } else {
            PageStream::Flat(flat)
        };

        SequencedStream { stream, sources }
    }

    fn summarize(idx: usize, path: &Path, read: &Result<SourceArchive>) -> SourceSummary {
        let (pages, bytes, status) = match read {
            Ok(archive) => (archive.entries.len(), archive.total_bytes(), SourceStatus::Merged),
            Err(ComicMergeError::EmptyArchive { .. }) => (0, 0, SourceStatus::Empty),
            Err(e) => (0, 0, SourceStatus::Skipped(e.to_string())),
        };

        SourceSummary {
            index: idx + 1,
            path: path.to_path_buf(),
            pages,
            bytes,
            status,
        }
    }
}
