use crate::error::{ComicMergeError, Result};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Allow-listed comic archive formats, selected by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Cbz,
    Cbr,
}

impl ArchiveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Cbz => "cbz",
            ArchiveFormat::Cbr => "cbr",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "cbz" => Some(ArchiveFormat::Cbz),
            "cbr" => Some(ArchiveFormat::Cbr),
            _ => None,
        }
    }
}

/// One entry of a source container, as listed by its directory.
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub index: usize,
    pub name: String,
    pub size: u64,
}

/// A source archive after its directory has been read.
#[derive(Debug, Clone)]
pub struct SourceArchive {
    pub path: PathBuf,
    pub entries: Vec<EntryInfo>,
}

impl SourceArchive {
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}

/// A single merged page. The payload stays inside the source archive
/// until the writer streams it out.
#[derive(Debug, Clone)]
pub struct Page {
    /// 0-based position of the owning source in the input list.
    pub source: usize,
    pub archive: Arc<Path>,
    pub entry_index: usize,
    pub name: String,
    pub size: u64,
    /// 1-based position in the merged stream.
    pub sequence: usize,
    /// 1-based input position of the owning source, chapter mode only.
    pub chapter: Option<usize>,
}

impl Page {
    /// Extension of the original entry name, if any.
    pub fn extension(&self) -> Option<String> {
        let file_name = self.name.rsplit('/').next().unwrap_or(&self.name);
        let (stem, ext) = file_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct Chapter {
    pub index: usize,
    pub source: PathBuf,
    pub pages: Vec<Page>,
}

impl Chapter {
    pub fn bytes(&self) -> u64 {
        self.pages.iter().map(|p| p.size).sum()
    }
}

/// The sequenced page stream, either flat or grouped by chapter.
#[derive(Debug, Clone)]
pub enum PageStream {
    Flat(Vec<Page>),
    Chapters(Vec<Chapter>),
}

impl PageStream {
    pub fn page_count(&self) -> usize {
        match self {
            PageStream::Flat(pages) => pages.len(),
            PageStream::Chapters(chapters) => chapters.iter().map(|c| c.pages.len()).sum(),
        }
    }

    pub fn total_bytes(&self) -> u64 {
        match self {
            PageStream::Flat(pages) => pages.iter().map(|p| p.size).sum(),
            PageStream::Chapters(chapters) => chapters.iter().map(Chapter::bytes).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.page_count() == 0
    }

    pub fn is_chaptered(&self) -> bool {
        matches!(self, PageStream::Chapters(_))
    }

    pub fn pages(&self) -> Box<dyn Iterator<Item = &Page> + '_> {
        match self {
            PageStream::Flat(pages) => Box::new(pages.iter()),
            PageStream::Chapters(chapters) => {
                Box::new(chapters.iter().flat_map(|c| c.pages.iter()))
            }
        }
    }
}

/// A contiguous run of pages destined for one output archive.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: usize,
    pub pages: Vec<Page>,
    pub bytes: u64,
    pub chapters: Vec<usize>,
    /// Holds a single unit larger than the byte limit.
    pub oversize: bool,
}

impl Chunk {
    pub fn first_page(&self) -> Option<usize> {
        self.pages.first().map(|p| p.sequence)
    }

    pub fn last_page(&self) -> Option<usize> {
        self.pages.last().map(|p| p.sequence)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChunkLimits {
    pub max_chapters: Option<usize>,
    pub max_bytes: Option<u64>,
}

impl ChunkLimits {
    pub fn validate(&self, chapter_mode: bool) -> Result<()> {
        if self.max_chapters == Some(0) {
            return Err(ComicMergeError::invalid(
                "Maximum chapters per chunk must be greater than 0",
            ));
        }

        if self.max_bytes == Some(0) {
            return Err(ComicMergeError::invalid(
                "Maximum bytes per chunk must be greater than 0",
            ));
        }

        if self.max_chapters.is_some() && !chapter_mode {
            return Err(ComicMergeError::invalid(
                "Chunking by chapters requires chapter mode (--chapters)",
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MergeConfig {
    pub output: PathBuf,
    pub chapter_mode: bool,
    pub limits: ChunkLimits,
    pub verbose: bool,
    pub write_manifest: bool,
}

impl MergeConfig {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            chapter_mode: false,
            limits: ChunkLimits::default(),
            verbose: false,
            write_manifest: false,
        }
    }

    /// Output path with any trailing `.cbz` removed.
    pub fn output_base(&self) -> PathBuf {
        let is_cbz = self
            .output
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("cbz"))
            .unwrap_or(false);

        if is_cbz {
            self.output.with_extension("")
        } else {
            self.output.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Merged,
    Empty,
    Skipped(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub index: usize,
    pub path: PathBuf,
    pub pages: usize,
    pub bytes: u64,
    pub status: SourceStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkSummary {
    pub index: usize,
    pub file: PathBuf,
    pub pages: usize,
    pub first_page: usize,
    pub last_page: usize,
    pub chapters: Vec<usize>,
    pub bytes: u64,
    pub oversize: bool,
}

impl ChunkSummary {
    pub fn new(chunk: &Chunk, file: PathBuf) -> Self {
        Self {
            index: chunk.index,
            file,
            pages: chunk.pages.len(),
            first_page: chunk.first_page().unwrap_or(0),
            last_page: chunk.last_page().unwrap_or(0),
            chapters: chunk.chapters.clone(),
            bytes: chunk.bytes,
            oversize: chunk.oversize,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub output_files: Vec<PathBuf>,
    pub sources: Vec<SourceSummary>,
    pub chunks: Vec<ChunkSummary>,
    pub total_pages: usize,
    pub total_bytes: u64,
    pub manifest_file: Option<PathBuf>,
}

impl MergeReport {
    pub fn skipped(&self) -> impl Iterator<Item = &SourceSummary> {
        self.sources
            .iter()
            .filter(|s| matches!(s.status, SourceStatus::Skipped(_)))
    }
}

/// A merge run's report together with the error that stopped it, if any.
#[derive(Debug)]
pub struct MergeOutcome {
    pub report: MergeReport,
    pub error: Option<ComicMergeError>,
}

impl MergeOutcome {
    pub fn into_result(self) -> Result<MergeReport> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.report),
        }
    }
}

/// Parses sizes such as `500000`, `700k`, `200MB` or `1.5GiB` into bytes.
pub fn parse_byte_size(input: &str) -> Result<u64> {
    let pattern = Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?)\s*([kmgt]?)(i?)(b?)\s*$").unwrap();

    let captures = pattern.captures(input).ok_or_else(|| {
        ComicMergeError::invalid(format!("Cannot parse byte size '{}'", input))
    })?;

    let value: f64 = captures[1]
        .parse()
        .map_err(|_| ComicMergeError::invalid(format!("Cannot parse byte size '{}'", input)))?;

    let prefix = captures[2].to_ascii_lowercase();
    let binary = !captures[3].is_empty();
    if binary && prefix.is_empty() {
        return Err(ComicMergeError::invalid(format!(
            "Cannot parse byte size '{}'",
            input
        )));
    }

    let base: f64 = if binary { 1024.0 } else { 1000.0 };
    let exponent = match prefix.as_str() {
        "" => 0,
        "k" => 1,
        "m" => 2,
        "g" => 3,
        _ => 4,
    };

    let bytes = (value * base.powi(exponent)).round();
    if bytes < 1.0 || bytes > u64::MAX as f64 {
        return Err(ComicMergeError::invalid(format!(
            "Byte size '{}' is out of range",
            input
        )));
    }

    Ok(bytes as u64)
}
