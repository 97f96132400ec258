//! Quoted CSV ledgers of validation verdicts.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::checkpoint::PersistenceError;
use crate::judge::Confidence;

pub const LEDGER_HEADER: [&str; 8] = [
    "gutenberg_url",
    "reasoning",
    "wikipedia_url",
    "confidence",
    "title",
    "authors",
    "filename",
    "book_id",
];

const AUTHORS_MAX_CHARS: usize = 20;

/// One verdict row, before display cleanup.
#[derive(Debug, Clone, Copy)]
pub struct LedgerRecord<'a> {
    pub book_id: &'a str,
    pub filename: &'a str,
    pub title: &'a str,
    pub authors: &'a str,
    pub confidence: Confidence,
    pub reasoning: &'a str,
    pub wikipedia_url: &'a str,
}

pub fn gutenberg_url(book_id: &str) -> String {
    format!("https://www.gutenberg.org/ebooks/{book_id}")
}

pub fn truncate_authors(authors: &str) -> String {
    if authors.chars().count() > AUTHORS_MAX_CHARS {
        let head: String = authors.chars().take(AUTHORS_MAX_CHARS).collect();
        format!("{head}...")
    } else {
        authors.to_string()
    }
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

pub struct LedgerWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl LedgerWriter {
    /// Truncates `path` and writes the header row.
    pub fn create(path: &Path) -> Result<Self, PersistenceError> {
        let writer = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Always)
            .from_path(path)
            .map_err(|err| persistence_error(path, err))?;
        let mut ledger = Self {
            path: path.to_path_buf(),
            writer,
        };
        ledger.write_row(&LEDGER_HEADER)?;
        Ok(ledger)
    }

    /// Appends one row and flushes it to disk.
    pub fn write(&mut self, record: &LedgerRecord<'_>) -> Result<(), PersistenceError> {
        let gutenberg = gutenberg_url(record.book_id);
        let reasoning = single_line(record.reasoning);
        let title = single_line(record.title);
        let authors = truncate_authors(record.authors);
        self.write_row(&[
            gutenberg.as_str(),
            reasoning.as_str(),
            record.wikipedia_url,
            record.confidence.as_str(),
            title.as_str(),
            authors.as_str(),
            record.filename,
            record.book_id,
        ])
    }

    fn write_row(&mut self, fields: &[&str]) -> Result<(), PersistenceError> {
        self.writer
            .write_record(fields)
            .map_err(|err| persistence_error(&self.path, err))?;
        self.writer.flush().map_err(|source| PersistenceError {
            path: self.path.clone(),
            source,
        })
    }
}

fn persistence_error(path: &Path, err: csv::Error) -> PersistenceError {
    PersistenceError {
        path: path.to_path_buf(),
        source: std::io::Error::other(err),
    }
}
