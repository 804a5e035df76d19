use crate::error::Result;
use crate::types::{Chunk, ChunkLimits, Page, PageStream};
use tracing::{debug, info, warn};

/// Smallest piece the planner never splits: one page in flat mode,
/// one chapter in chapter mode.
struct Unit {
    pages: Vec<Page>,
    bytes: u64,
    chapter: Option<usize>,
}

impl Unit {
    fn from_stream(stream: PageStream) -> Vec<Unit> {
        match stream {
            PageStream::Flat(pages) => pages
                .into_iter()
                .map(|page| Unit {
                    bytes: page.size,
                    pages: vec![page],
                    chapter: None,
                })
                .collect(),
            PageStream::Chapters(chapters) => chapters
                .into_iter()
                .filter(|c| !c.pages.is_empty())
                .map(|c| Unit {
                    bytes: c.bytes(),
                    chapter: Some(c.index),
                    pages: c.pages,
                })
                .collect(),
        }
    }
}

pub struct ChunkPlanner;

impl ChunkPlanner {
    /// Partitions the stream into chunks. Concatenating the chunks in order
    /// gives back the stream unchanged.
    pub fn plan(stream: PageStream, limits: &ChunkLimits) -> Result<Vec<Chunk>> {
        limits.validate(stream.is_chaptered())?;

        let chaptered = stream.is_chaptered();
        let units = Unit::from_stream(stream);

        info!(
            "Planning {} {} into chunks (max chapters: {:?}, max bytes: {:?})",
            units.len(),
            if chaptered { "chapters" } else { "pages" },
            limits.max_chapters,
            limits.max_bytes
        );

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut current = Self::new_chunk(1);

        for unit in units {
            if !current.pages.is_empty() && Self::would_exceed(&current, &unit, limits) {
                let next = Self::new_chunk(current.index + 1);
                chunks.push(std::mem::replace(&mut current, next));
            }

            if let Some(max_bytes) = limits.max_bytes {
                if unit.bytes > max_bytes {
                    warn!(
                        "{} of {} bytes exceeds the chunk limit of {} bytes, \
                         placing it alone in chunk {}",
                        Self::describe(&unit),
                        unit.bytes,
                        max_bytes,
                        current.index
                    );
                    current.oversize = true;
                }
            }

            current.bytes += unit.bytes;
            if let Some(chapter) = unit.chapter {
                current.chapters.push(chapter);
            }
            current.pages.extend(unit.pages);
        }

        if !current.pages.is_empty() {
            chunks.push(current);
        }

        for chunk in &chunks {
            debug!(
                "Chunk {}: pages {}-{} ({} pages, {} bytes, {} chapters)",
                chunk.index,
                chunk.first_page().unwrap_or(0),
                chunk.last_page().unwrap_or(0),
                chunk.pages.len(),
                chunk.bytes,
                chunk.chapters.len()
            );
        }

        Ok(chunks)
    }

    fn new_chunk(index: usize) -> Chunk {
        Chunk {
            index,
            pages: Vec::new(),
            bytes: 0,
            chapters: Vec::new(),
            oversize: false,
        }
    }

    fn would_exceed(current: &Chunk, unit: &Unit, limits: &ChunkLimits) -> bool {
        let over_bytes = limits
            .max_bytes
            .map(|max| current.bytes.saturating_add(unit.bytes) > max)
            .unwrap_or(false);

        let over_chapters = match (limits.max_chapters, unit.chapter) {
            (Some(max), Some(_)) => current.chapters.len() + 1 > max,
            _ => false,
        };

        over_bytes || over_chapters
    }

    fn describe(unit: &Unit) -> String {
        match (unit.chapter, unit.pages.first()) {
            (Some(chapter), _) => format!("Chapter {}", chapter),
            (None, Some(page)) => format!("Page {} ({})", page.sequence, page.name),
            (None, None) => "Empty unit".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ComicMergeError;
    use crate::types::Chapter;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    fn pages(sizes: &[u64], first_sequence: usize, chapter: Option<usize>) -> Vec<Page> {
        let archive: Arc<Path> = Arc::from(Path::new("src.cbz"));
        sizes
            .iter()
            .enumerate()
            .map(|(i, size)| Page {
                source: chapter.unwrap_or(1) - 1,
                archive: Arc::clone(&archive),
                entry_index: i,
                name: format!("{}.jpg", i),
                size: *size,
                sequence: first_sequence + i,
                chapter,
            })
            .collect()
    }

    fn chapters(page_counts: &[usize], page_size: u64) -> PageStream {
        let mut next = 1;
        let chapters = page_counts
            .iter()
            .enumerate()
            .map(|(i, count)| {
                let chapter = Chapter {
                    index: i + 1,
                    source: PathBuf::from(format!("{}.cbz", i + 1)),
                    pages: pages(&vec![page_size; *count], next, Some(i + 1)),
                };
                next += count;
                chapter
            })
            .collect();
        PageStream::Chapters(chapters)
    }

    fn sequences(chunks: &[Chunk]) -> Vec<usize> {
        chunks
            .iter()
            .flat_map(|c| c.pages.iter().map(|p| p.sequence))
            .collect()
    }

    #[test]
    fn test_unbounded_is_single_chunk() {
        let stream = PageStream::Flat(pages(&[5, 5, 5], 1, None));
        let chunks = ChunkPlanner::plan(stream, &ChunkLimits::default()).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].pages.len(), 3);
        assert_eq!(chunks[0].bytes, 15);
    }

    #[test]
    fn test_empty_stream_has_no_chunks() {
        let chunks =
            ChunkPlanner::plan(PageStream::Flat(Vec::new()), &ChunkLimits::default()).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_chapter_count_boundaries() {
        let limits = ChunkLimits {
            max_chapters: Some(2),
            max_bytes: None,
        };
        let chunks = ChunkPlanner::plan(chapters(&[3, 4, 2, 5, 1], 10), &limits).unwrap();

        let grouping: Vec<_> = chunks.iter().map(|c| c.chapters.clone()).collect();
        assert_eq!(grouping, vec![vec![1, 2], vec![3, 4], vec![5]]);
        assert_eq!(sequences(&chunks), (1..=15).collect::<Vec<_>>());
    }

    #[test]
    fn test_chapter_count_without_chapter_mode_is_rejected() {
        let limits = ChunkLimits {
            max_chapters: Some(1),
            max_bytes: None,
        };
        let result = ChunkPlanner::plan(PageStream::Flat(pages(&[1, 2], 1, None)), &limits);
        assert!(matches!(result, Err(ComicMergeError::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_byte_limit_flat() {
        let limits = ChunkLimits {
            max_chapters: None,
            max_bytes: Some(10),
        };
        let stream = PageStream::Flat(pages(&[4, 4, 4, 10, 3, 3], 1, None));
        let chunks = ChunkPlanner::plan(stream, &limits).unwrap();

        let sizes: Vec<_> = chunks.iter().map(|c| c.bytes).collect();
        assert_eq!(sizes, vec![8, 4, 10, 6]);
        assert!(chunks.iter().all(|c| c.bytes <= 10));
        assert_eq!(sequences(&chunks), (1..=6).collect::<Vec<_>>());
    }

    #[test]
    fn test_oversize_unit_stands_alone() {
        let limits = ChunkLimits {
            max_chapters: None,
            max_bytes: Some(10),
        };
        let stream = PageStream::Flat(pages(&[3, 25, 3], 1, None));
        let chunks = ChunkPlanner::plan(stream, &limits).unwrap();

        assert_eq!(chunks.len(), 3);
        assert!(chunks[1].oversize);
        assert_eq!(chunks[1].pages.len(), 1);
        assert!(!chunks[0].oversize && !chunks[2].oversize);
    }

    #[test]
    fn test_byte_limit_keeps_chapters_whole() {
        let limits = ChunkLimits {
            max_chapters: None,
            max_bytes: Some(50),
        };
        // chapter sizes: 30, 30, 20, 80
        let chunks = ChunkPlanner::plan(chapters(&[3, 3, 2, 8], 10), &limits).unwrap();

        let grouping: Vec<_> = chunks.iter().map(|c| c.chapters.clone()).collect();
        assert_eq!(grouping, vec![vec![1], vec![2, 3], vec![4]]);
        assert!(chunks[2].oversize);
        assert_eq!(sequences(&chunks), (1..=16).collect::<Vec<_>>());
    }

    #[test]
    fn test_both_limits_split_on_either() {
        let limits = ChunkLimits {
            max_chapters: Some(3),
            max_bytes: Some(40),
        };
        // chapter sizes: 10, 10, 10, 10, 30, 10
        let chunks = ChunkPlanner::plan(chapters(&[1, 1, 1, 1, 3, 1], 10), &limits).unwrap();

        let grouping: Vec<_> = chunks.iter().map(|c| c.chapters.clone()).collect();
        assert_eq!(grouping, vec![vec![1, 2, 3], vec![4, 5], vec![6]]);
        let indices: Vec<_> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }
}
