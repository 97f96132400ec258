//! Failure bookkeeping: the append-only error log, per-fetch diagnostics and
//! the retry pass's JSON report.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::error;
use serde::Serialize;

use crate::checkpoint::write_json_atomic;

/// Everything learned about a page while trying to fetch it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchDiagnostics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub api_returned_no_pages: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub missing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract_length: Option<usize>,
    #[serde(skip_serializing_if = "is_false")]
    pub is_disambiguation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_size: Option<u64>,
    #[serde(skip_serializing_if = "is_false")]
    pub is_redirect: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub title_extraction_failed: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub connection_error: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub timeout: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl FetchDiagnostics {
    /// `(name, value)` pairs for the fields that carry information, in a
    /// stable order, for log output.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let mut entries = Vec::new();
        if let Some(page_id) = self.page_id {
            entries.push(("page_id", page_id.to_string()));
        }
        if let Some(lang) = &self.lang {
            entries.push(("lang", lang.clone()));
        }
        if let Some(page_title) = &self.page_title {
            entries.push(("page_title", page_title.clone()));
        }
        let flags = [
            ("api_returned_no_pages", self.api_returned_no_pages),
            ("missing", self.missing),
            ("is_disambiguation", self.is_disambiguation),
            ("is_redirect", self.is_redirect),
            ("title_extraction_failed", self.title_extraction_failed),
            ("connection_error", self.connection_error),
            ("timeout", self.timeout),
        ];
        for (name, set) in flags {
            if set {
                entries.push((name, "true".to_string()));
            }
        }
        if let Some(invalid) = &self.invalid {
            entries.push(("invalid", invalid.clone()));
        }
        if let Some(length) = self.extract_length {
            entries.push(("extract_length", length.to_string()));
        }
        if let Some(size) = self.raw_size {
            entries.push(("raw_size", size.to_string()));
        }
        if let Some(exception) = &self.exception {
            entries.push(("exception", exception.clone()));
        }
        entries
    }
}

/// Append-only text log with one line per terminal failure.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `[timestamp] book_id=..., url=..., error=...`
    pub fn record_item_failure(&self, book_id: &str, url: &str, message: &str) {
        self.append(&format!("book_id={book_id}, url={url}, error={message}"));
    }

    /// `[timestamp] filename=..., error=...`
    pub fn record_file_failure(&self, filename: &str, message: &str) {
        self.append(&format!("filename={filename}, error={message}"));
    }

    pub fn record_file_warning(&self, filename: &str, message: &str) {
        self.append(&format!("filename={filename}, warning={message}"));
    }

    fn append(&self, body: &str) {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("[{timestamp}] {body}\n");
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(err) = written {
            error!("Error writing to error log {}: {}", self.path.display(), err);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStatus {
    Success,
    Failed,
}

/// One retried work item in `retry_results.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryDetail {
    pub book_id: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    pub status: RetryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub diagnostics: FetchDiagnostics,
}

/// Aggregate outcome of a retry pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    pub total: usize,
    pub successful: usize,
    pub still_failed: usize,
    pub details: Vec<RetryDetail>,
}

impl RetryReport {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn push(&mut self, detail: RetryDetail) {
        match detail.status {
            RetryStatus::Success => self.successful += 1,
            RetryStatus::Failed => self.still_failed += 1,
        }
        self.details.push(detail);
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        write_json_atomic(path, self)
    }
}
