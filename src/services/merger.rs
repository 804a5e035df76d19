use crate::error::{ComicMergeError, Result};
use crate::services::planner::ChunkPlanner;
use crate::services::sequencer::PageSequencer;
use crate::services::writer::{digit_width, ArchiveWriter};
use crate::types::{
    Chunk, ChunkLimits, ChunkSummary, MergeConfig, MergeOutcome, MergeReport, SourceStatus,
    SourceSummary,
};
use anyhow::Context;
use serde::Serialize;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const OUTPUT_EXTENSION: &str = "cbz";

/// Output path of chunk `index` (1-based) out of `count`. A single chunk
/// gets no numeric suffix.
pub fn chunk_output_path(base: &Path, index: usize, count: usize) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    if count > 1 {
        name.push(format!("_{:0width$}", index, width = digit_width(count)));
    }
    name.push(".");
    name.push(OUTPUT_EXTENSION);
    PathBuf::from(name)
}

fn manifest_path(base: &Path) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push("_manifest.json");
    PathBuf::from(name)
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[derive(Serialize)]
struct Manifest<'a> {
    created_at: String,
    output: &'a Path,
    chapter_mode: bool,
    limits: &'a ChunkLimits,
    total_pages: usize,
    total_bytes: u64,
    sources: &'a [SourceSummary],
    chunks: &'a [ChunkSummary],
}

pub struct ComicMerger {
    config: MergeConfig,
}

impl ComicMerger {
    pub fn new(config: MergeConfig) -> Result<Self> {
        config.limits.validate(config.chapter_mode)?;
        Ok(Self { config })
    }

    /// Runs the whole pipeline and writes every output archive.
    pub fn merge(&self, sources: &[PathBuf]) -> Result<MergeReport> {
        self.run(sources).into_result()
    }

    /// Like `merge`, but keeps the partial report when the pipeline stops
    /// early: sources read so far and the chunks already written.
    pub fn run(&self, sources: &[PathBuf]) -> MergeOutcome {
        let mut report = MergeReport::default();
        let error = self.write_all(sources, &mut report).err();
        MergeOutcome { report, error }
    }

    /// Reads and plans like `merge` without writing anything. Chunk
    /// summaries carry the file names `merge` would use.
    pub fn preview(&self, sources: &[PathBuf]) -> Result<MergeReport> {
        let mut report = MergeReport::default();
        let chunks = self.prepare(sources, &mut report)?;
        let base = self.config.output_base();
        let chunk_count = chunks.len();

        report.chunks = chunks
            .iter()
            .map(|chunk| {
                ChunkSummary::new(chunk, chunk_output_path(&base, chunk.index, chunk_count))
            })
            .collect();

        Ok(report)
    }

    fn write_all(&self, sources: &[PathBuf], report: &mut MergeReport) -> Result<()> {
        info!(
            "Merging {} sources into {}",
            sources.len(),
            self.config.output.display()
        );

        let planned = self.prepare(sources, report)?;
        let base = self.config.output_base();
        let chunk_count = planned.len();
        let outputs: Vec<PathBuf> = (1..=chunk_count)
            .map(|idx| chunk_output_path(&base, idx, chunk_count))
            .collect();

        self.check_collisions(&outputs, sources)?;

        let chapter_width = self
            .config
            .chapter_mode
            .then(|| digit_width(sources.len()));
        let writer = ArchiveWriter::new(report.total_pages, chapter_width);

        for (chunk, path) in planned.into_iter().zip(outputs) {
            self.progress(format_args!(
                "Writing chunk {}/{}: pages {}-{} ({} bytes) to {}",
                chunk.index,
                chunk_count,
                chunk.first_page().unwrap_or(0),
                chunk.last_page().unwrap_or(0),
                chunk.bytes,
                path.display()
            ));

            let written = writer.write_chunk(&chunk, &path)?;
            report.chunks.push(ChunkSummary::new(&chunk, written.clone()));
            report.output_files.push(written);
        }

        if self.config.write_manifest {
            let path = manifest_path(&base);
            self.write_manifest(&path, report)?;
            report.manifest_file = Some(path);
        }

        info!(
            "Merged {} pages into {} file(s)",
            report.total_pages,
            report.output_files.len()
        );

        Ok(())
    }

    /// Sequences and plans the merge. Source summaries and totals land in
    /// `report` before the empty-stream check so callers can still list
    /// what was skipped.
    fn prepare(&self, sources: &[PathBuf], report: &mut MergeReport) -> Result<Vec<Chunk>> {
        let sequencer = PageSequencer::new(self.config.chapter_mode);
        let total_sources = sources.len();

        let sequenced = sequencer.sequence(sources, |idx, summary| match &summary.status {
            SourceStatus::Merged => self.progress(format_args!(
                "Read archive {}/{}: {} ({} pages, {} bytes)",
                idx + 1,
                total_sources,
                summary.path.display(),
                summary.pages,
                summary.bytes
            )),
            SourceStatus::Empty => self.progress(format_args!(
                "Read archive {}/{}: {} has no pages",
                idx + 1,
                total_sources,
                summary.path.display()
            )),
            SourceStatus::Skipped(reason) => warn!(
                "Skipping archive {}/{}: {}",
                idx + 1,
                total_sources,
                reason
            ),
        })?;

        let skipped = sequenced.skipped_count();
        report.sources = sequenced.sources;
        report.total_pages = sequenced.stream.page_count();
        report.total_bytes = sequenced.stream.total_bytes();

        if sequenced.stream.is_empty() {
            return Err(ComicMergeError::NothingToMerge {
                sources: total_sources,
                skipped,
            });
        }

        info!(
            "Sequenced {} pages ({} bytes) from {} sources",
            report.total_pages, report.total_bytes, total_sources
        );

        let chunks = ChunkPlanner::plan(sequenced.stream, &self.config.limits)?;
        if chunks.len() > 1 {
            info!("Output will be split into {} chunks", chunks.len());
        }

        Ok(chunks)
    }

    fn check_collisions(&self, outputs: &[PathBuf], sources: &[PathBuf]) -> Result<()> {
        for output in outputs {
            if let Some(source) = sources.iter().find(|s| same_file(output, s)) {
                return Err(ComicMergeError::invalid(format!(
                    "Output {} would overwrite source {}",
                    output.display(),
                    source.display()
                )));
            }
        }
        Ok(())
    }

    fn write_manifest(&self, path: &Path, report: &MergeReport) -> Result<()> {
        let manifest = Manifest {
            created_at: chrono::Utc::now().to_rfc3339(),
            output: &self.config.output,
            chapter_mode: self.config.chapter_mode,
            limits: &self.config.limits,
            total_pages: report.total_pages,
            total_bytes: report.total_bytes,
            sources: &report.sources,
            chunks: &report.chunks,
        };

        let json_content = serde_json::to_string_pretty(&manifest)?;
        fs::write(path, json_content)
            .with_context(|| format!("Failed to write manifest {}", path.display()))?;

        info!("Generated manifest file: {}", path.display());
        Ok(())
    }

    fn progress(&self, message: fmt::Arguments<'_>) {
        if self.config.verbose {
            info!("{}", message);
        } else {
            debug!("{}", message);
        }
    }
}
