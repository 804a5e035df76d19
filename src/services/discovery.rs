use crate::error::{ComicMergeError, Result};
use crate::types::ArchiveFormat;
use regex::Regex;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub folder: PathBuf,
    pub format: ArchiveFormat,
    pub prefix: Option<String>,
    /// 1-based inclusive range over the naturally sorted list.
    pub range: Option<(usize, usize)>,
}

impl DiscoveryOptions {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            format: ArchiveFormat::Cbz,
            prefix: None,
            range: None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Token<'a> {
    Number(&'a str),
    Text(String),
}

fn tokenize<'a>(pattern: &Regex, name: &'a str) -> Vec<Token<'a>> {
    pattern
        .find_iter(name)
        .map(|m| {
            let text = m.as_str();
            if text.as_bytes()[0].is_ascii_digit() {
                Token::Number(text)
            } else {
                Token::Text(text.to_lowercase())
            }
        })
        .collect()
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a_trimmed = a.trim_start_matches('0');
    let b_trimmed = b.trim_start_matches('0');
    a_trimmed
        .len()
        .cmp(&b_trimmed.len())
        .then_with(|| a_trimmed.cmp(b_trimmed))
}

/// Orders names treating digit runs by numeric value, so `vol 2` sorts
/// before `vol 10`. Text runs compare case-insensitively; full ties fall
/// back to plain byte order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let pattern = Regex::new(r"[0-9]+|[^0-9]+").unwrap();
    natural_cmp_with(&pattern, a, b)
}

fn natural_cmp_with(pattern: &Regex, a: &str, b: &str) -> Ordering {
    let left = tokenize(pattern, a);
    let right = tokenize(pattern, b);

    for (l, r) in left.iter().zip(right.iter()) {
        let ordering = match (l, r) {
            (Token::Number(x), Token::Number(y)) => compare_numbers(x, y),
            (Token::Number(_), Token::Text(_)) => Ordering::Less,
            (Token::Text(_), Token::Number(_)) => Ordering::Greater,
            (Token::Text(x), Token::Text(y)) => x.cmp(y),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    left.len().cmp(&right.len()).then_with(|| a.cmp(b))
}

pub fn natural_sort(paths: &mut [PathBuf]) {
    let pattern = Regex::new(r"[0-9]+|[^0-9]+").unwrap();
    paths.sort_by(|a, b| natural_cmp_with(&pattern, &file_name(a), &file_name(b)));
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Lists the comics to merge from a folder, naturally sorted and filtered.
pub fn discover_comics(options: &DiscoveryOptions) -> Result<Vec<PathBuf>> {
    info!(
        "Looking for .{} files in {}",
        options.format.extension(),
        options.folder.display()
    );

    if !options.folder.is_dir() {
        return Err(ComicMergeError::invalid(format!(
            "Input folder {} does not exist",
            options.folder.display()
        )));
    }

    let mut comics = Vec::new();
    let walker = WalkDir::new(&options.folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cannot read folder entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        if ArchiveFormat::from_path(entry.path()) == Some(options.format) {
            comics.push(entry.into_path());
        }
    }

    natural_sort(&mut comics);

    if let Some(prefix) = &options.prefix {
        comics.retain(|path| file_name(path).starts_with(prefix.as_str()));
        debug!("{} comics match prefix '{}'", comics.len(), prefix);
    }

    if let Some((start, end)) = options.range {
        comics = select_range(comics, start, end)?;
    }

    info!("Found {} comics to merge", comics.len());
    Ok(comics)
}

/// Keeps the `start..=end` comics (1-based). Out-of-bounds ends are clamped.
pub fn select_range(comics: Vec<PathBuf>, start: usize, end: usize) -> Result<Vec<PathBuf>> {
    let start = start.max(1);
    if start > end {
        return Err(ComicMergeError::invalid(format!(
            "Range start {} is after range end {}",
            start, end
        )));
    }

    let end = end.min(comics.len());
    Ok(comics
        .into_iter()
        .skip(start - 1)
        .take(end.saturating_sub(start - 1))
        .collect())
}
