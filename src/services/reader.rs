use crate::error::{ComicMergeError, Result};
use crate::types::{ArchiveFormat, EntryInfo, SourceArchive};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;
use zip::{CompressionMethod, ZipArchive};

/// Entry extensions counted as comic pages.
pub const PAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "avif", "jxl", "tif", "tiff",
];

const ZIP_SIGNATURES: [&[u8]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];
const RAR_SIGNATURE: &[u8] = b"Rar!\x1a\x07";

/// Container type as identified from its leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Zip,
    Rar,
    Unknown,
}

pub fn detect_container<R: Read>(reader: &mut R) -> std::io::Result<ContainerKind> {
    let mut magic = Vec::with_capacity(8);
    reader.take(8).read_to_end(&mut magic)?;

    if ZIP_SIGNATURES.iter().any(|sig| magic.starts_with(sig)) {
        Ok(ContainerKind::Zip)
    } else if magic.starts_with(RAR_SIGNATURE) {
        Ok(ContainerKind::Rar)
    } else {
        Ok(ContainerKind::Unknown)
    }
}

/// Compression methods the writer can decode when copying pages out.
pub fn is_supported_compression(method: CompressionMethod) -> bool {
    matches!(method, CompressionMethod::Stored | CompressionMethod::Deflated)
}

pub fn is_page_entry(name: &str) -> bool {
    if name.ends_with('/') || name.starts_with("__MACOSX/") {
        return false;
    }

    let file_name = name.rsplit('/').next().unwrap_or(name);
    if file_name.starts_with('.') {
        return false;
    }

    file_name
        .rsplit_once('.')
        .map(|(_, ext)| PAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

pub struct ArchiveReader;

impl ArchiveReader {
    /// Lists the page entries of one source archive in directory order.
    pub fn read(path: &Path, format: ArchiveFormat) -> Result<SourceArchive> {
        debug!("Reading archive directory: {}", path.display());

        let mut archive = Self::open(path)?;
        if format == ArchiveFormat::Cbr {
            debug!("{} is a ZIP container despite its .cbr extension", path.display());
        }

        let mut entries = Vec::new();

        for index in 0..archive.len() {
            let entry = archive
                .by_index_raw(index)
                .map_err(|e| ComicMergeError::unreadable(path, e))?;

            if entry.is_dir() || !is_page_entry(entry.name()) {
                continue;
            }

            // Pages are decoded only at write time, so reject them here
            // while the source can still be skipped.
            if entry.encrypted() {
                return Err(ComicMergeError::unreadable(
                    path,
                    format!("page {} is encrypted", entry.name()),
                ));
            }

            if !is_supported_compression(entry.compression()) {
                return Err(ComicMergeError::unreadable(
                    path,
                    format!(
                        "page {} uses unsupported compression {:?}",
                        entry.name(),
                        entry.compression()
                    ),
                ));
            }

            entries.push(EntryInfo {
                index,
                name: entry.name().to_string(),
                size: entry.size(),
            });
        }

        if entries.is_empty() {
            return Err(ComicMergeError::EmptyArchive {
                path: path.to_path_buf(),
            });
        }

        debug!("Found {} pages in {}", entries.len(), path.display());

        Ok(SourceArchive {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Opens a source container for reading, checking its signature first.
    pub fn open(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
        let mut file = File::open(path).map_err(|e| ComicMergeError::unreadable(path, e))?;

        let kind =
            detect_container(&mut file).map_err(|e| ComicMergeError::unreadable(path, e))?;
        match kind {
            ContainerKind::Zip => {}
            ContainerKind::Rar => {
                return Err(ComicMergeError::unreadable(
                    path,
                    "RAR containers are not supported, repack it as CBZ",
                ));
            }
            ContainerKind::Unknown => {
                return Err(ComicMergeError::unreadable(path, "not a ZIP container"));
            }
        }

        file.seek(SeekFrom::Start(0))
            .map_err(|e| ComicMergeError::unreadable(path, e))?;

        ZipArchive::new(BufReader::new(file)).map_err(|e| ComicMergeError::unreadable(path, e))
    }
}
