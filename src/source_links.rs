//! Loader for the `book_id,url1 url2 ...` link file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::warn;
use thiserror::Error;

use crate::wiki_url::{extract_language, LanguagePattern};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Input file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Error reading input file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One non-empty line of the link file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub book_id: String,
    pub urls: Vec<String>,
}

/// A candidate article URL tagged with its language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlCandidate {
    pub url: String,
    pub lang: String,
}

/// `book_id -> candidates`, candidates kept in file order.
#[derive(Debug, Clone, Default)]
pub struct LinkIndex {
    by_book: HashMap<String, Vec<UrlCandidate>>,
}

impl LinkIndex {
    pub fn from_records(records: &[SourceRecord]) -> Self {
        let mut by_book = HashMap::with_capacity(records.len());
        for record in records {
            let candidates = record
                .urls
                .iter()
                .map(|url| UrlCandidate {
                    url: url.clone(),
                    lang: extract_language(url, LanguagePattern::Strict),
                })
                .collect();
            // Later lines for the same book replace earlier ones.
            by_book.insert(record.book_id.clone(), candidates);
        }
        Self { by_book }
    }

    pub fn candidates(&self, book_id: &str) -> Option<&[UrlCandidate]> {
        self.by_book.get(book_id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.by_book.len()
    }
}

/// Parses one line; `None` for blank or malformed lines.
pub fn parse_line(line: &str) -> Option<SourceRecord> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some((book_id, urls_part)) = line.split_once(',') else {
        warn!("Invalid line format: {}", line);
        return None;
    };
    let urls = urls_part
        .split_whitespace()
        .map(str::to_string)
        .collect::<Vec<_>>();
    Some(SourceRecord {
        book_id: book_id.trim().to_string(),
        urls,
    })
}

pub fn parse_records(text: &str) -> Vec<SourceRecord> {
    text.lines().filter_map(parse_line).collect()
}

pub fn load_records(path: &Path) -> Result<Vec<SourceRecord>, SourceError> {
    let text = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            SourceError::NotFound(path.to_path_buf())
        } else {
            SourceError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    Ok(parse_records(&text))
}

pub fn load_index(path: &Path) -> Result<LinkIndex, SourceError> {
    let records = load_records(path)?;
    Ok(LinkIndex::from_records(&records))
}
