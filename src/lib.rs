//! # Comic Merge Library
//!
//! Merges comic book archives (`.cbz`) into one or more combined archives,
//! keeping reading order and optionally keeping each source as a chapter.
//!
//! ## Example Usage
//!
//! ```no_run
//! use comic_merge::{discover_comics, ComicMerger, DiscoveryOptions, MergeConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Find the volumes, naturally sorted
//!     let sources = discover_comics(&DiscoveryOptions::new("./scans"))?;
//!
//!     // Keep volumes as chapters, two per output file
//!     let mut config = MergeConfig::new("Saga Omnibus");
//!     config.chapter_mode = true;
//!     config.limits.max_chapters = Some(2);
//!
//!     let report = ComicMerger::new(config)?.merge(&sources)?;
//!
//!     println!("Created {} archives", report.output_files.len());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod services;
pub mod types;

pub use error::{ComicMergeError, Result};
pub use services::{
    discover_comics, natural_sort, ArchiveReader, ArchiveWriter, ChunkPlanner, ComicMerger,
    DiscoveryOptions, PageSequencer,
};
pub use types::{
    parse_byte_size, ArchiveFormat, Chapter, Chunk, ChunkLimits, ChunkSummary, MergeConfig,
    MergeOutcome, MergeReport, Page, PageStream, SourceStatus, SourceSummary,
};

use std::path::PathBuf;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Merges `sources` in the given order and returns the written archives.
pub fn merge(
    output_name: impl Into<PathBuf>,
    sources: &[PathBuf],
    chapter_mode: bool,
    chunk_by_chapters: Option<usize>,
    chunk_by_bytes: Option<u64>,
    verbose: bool,
) -> Result<Vec<PathBuf>> {
    let config = MergeConfig {
        output: output_name.into(),
        chapter_mode,
        limits: ChunkLimits {
            max_chapters: chunk_by_chapters,
            max_bytes: chunk_by_bytes,
        },
        verbose,
        write_manifest: false,
    };

    let report = ComicMerger::new(config)?.merge(sources)?;
    Ok(report.output_files)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs::File;
    use std::io::{Read, Write};
    use std::path::{Path, PathBuf};
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipArchive, ZipWriter};

    pub fn write_file(path: &Path, bytes: &[u8]) {
        std::fs::write(path, bytes).unwrap();
    }

    pub fn write_cbz(path: &Path, entries: &[(&str, &[u8])]) {
        write_cbz_with(path, entries, SimpleFileOptions::default());
    }

    pub fn write_cbz_with(path: &Path, entries: &[(&str, &[u8])], options: SimpleFileOptions) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for (name, bytes) in entries {
            zip.start_file(name.to_string(), options).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }

    /// Writes `<dir>/<name>` holding `pages` jpg pages of `page_size` bytes.
    /// Each payload starts with `<name>#<page>:`.
    pub fn write_comic(dir: &Path, name: &str, pages: usize, page_size: usize) -> PathBuf {
        write_comic_with(dir, name, pages, page_size, SimpleFileOptions::default())
    }

    pub fn write_comic_with(
        dir: &Path,
        name: &str,
        pages: usize,
        page_size: usize,
        options: SimpleFileOptions,
    ) -> PathBuf {
        let path = dir.join(name);
        let payloads: Vec<(String, Vec<u8>)> = (0..pages)
            .map(|i| {
                let mut bytes = format!("{}#{}:", name, i + 1).into_bytes();
                bytes.resize(page_size.max(bytes.len()), b'.');
                (format!("page {:03}.jpg", i + 1), bytes)
            })
            .collect();
        let mut entries: Vec<(&str, &[u8])> = payloads
            .iter()
            .map(|(n, b)| (n.as_str(), b.as_slice()))
            .collect();
        entries.push(("ComicInfo.xml", &b"<ComicInfo/>"[..]));
        write_cbz_with(&path, &entries, options);
        path
    }

    pub fn stored() -> SimpleFileOptions {
        SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
    }

    fn u16_at(bytes: &[u8], at: usize) -> usize {
        u16::from_le_bytes([bytes[at], bytes[at + 1]]) as usize
    }

    fn u32_at(bytes: &[u8], at: usize) -> usize {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]) as usize
    }

    /// `at` points at the general purpose flags, the method follows them.
    fn patch_header(bytes: &mut [u8], at: usize, method: Option<u16>, flags: Option<u16>) {
        if let Some(bits) = flags {
            let current = u16_at(bytes, at) as u16;
            bytes[at..at + 2].copy_from_slice(&(current | bits).to_le_bytes());
        }
        if let Some(method) = method {
            bytes[at + 2..at + 4].copy_from_slice(&method.to_le_bytes());
        }
    }

    /// Rewrites the compression method and ORs flag bits into every local
    /// and central directory header of an archive made by `write_cbz`.
    pub fn patch_entry_headers(path: &Path, method: Option<u16>, flags: Option<u16>) {
        let mut bytes = std::fs::read(path).unwrap();
        let mut at = 0;

        while bytes[at..].starts_with(b"PK\x03\x04") {
            patch_header(&mut bytes, at + 6, method, flags);
            let name_len = u16_at(&bytes, at + 26);
            let extra_len = u16_at(&bytes, at + 28);
            at += 30 + name_len + extra_len + u32_at(&bytes, at + 18);
        }

        let mut patched = 0;
        while bytes[at..].starts_with(b"PK\x01\x02") {
            patch_header(&mut bytes, at + 8, method, flags);
            let name_len = u16_at(&bytes, at + 28);
            let extra_len = u16_at(&bytes, at + 30);
            let comment_len = u16_at(&bytes, at + 32);
            at += 46 + name_len + extra_len + comment_len;
            patched += 1;
        }
        assert!(patched > 0, "no central directory headers in {}", path.display());

        std::fs::write(path, bytes).unwrap();
    }

    /// Flips the first byte of `marker` inside a stored payload, so the
    /// entry still lists fine but fails its checksum when read.
    pub fn corrupt_payload(path: &Path, marker: &[u8]) {
        let mut bytes = std::fs::read(path).unwrap();
        let at = bytes
            .windows(marker.len())
            .position(|w| w == marker)
            .unwrap();
        bytes[at] ^= 0xff;
        std::fs::write(path, bytes).unwrap();
    }

    pub fn read_entries(path: &Path) -> Vec<(String, Vec<u8>)> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut entry = archive.by_index(i).unwrap();
                let mut bytes = Vec::new();
                entry.read_to_end(&mut bytes).unwrap();
                (entry.name().to_string(), bytes)
            })
            .collect()
    }
}
