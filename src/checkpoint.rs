//! Durable per-key progress, rewritten in full after every recorded outcome.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Error saving progress to {}: {source}", path.display())]
pub struct PersistenceError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Last known outcome of one fetch work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "RawFetchEntry", try_from = "RawFetchEntry")]
pub enum FetchEntry {
    Success { filename: String, timestamp: String },
    Failed { timestamp: String },
}

impl FetchEntry {
    pub fn success(filename: impl Into<String>) -> Self {
        Self::Success {
            filename: filename.into(),
            timestamp: now_timestamp(),
        }
    }

    pub fn failed() -> Self {
        Self::Failed {
            timestamp: now_timestamp(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn filename(&self) -> Option<&str> {
        match self {
            Self::Success { filename, .. } => Some(filename),
            Self::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FetchStatus {
    Success,
    Failed,
}

/// On-disk shape: `{"status", "filename", "timestamp"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawFetchEntry {
    status: FetchStatus,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    timestamp: String,
}

impl From<FetchEntry> for RawFetchEntry {
    fn from(entry: FetchEntry) -> Self {
        match entry {
            FetchEntry::Success {
                filename,
                timestamp,
            } => Self {
                status: FetchStatus::Success,
                filename: Some(filename),
                timestamp,
            },
            FetchEntry::Failed { timestamp } => Self {
                status: FetchStatus::Failed,
                filename: None,
                timestamp,
            },
        }
    }
}

impl TryFrom<RawFetchEntry> for FetchEntry {
    type Error = String;

    fn try_from(raw: RawFetchEntry) -> Result<Self, Self::Error> {
        match raw.status {
            FetchStatus::Success => {
                let filename = raw
                    .filename
                    .ok_or_else(|| "success entry without filename".to_string())?;
                Ok(Self::Success {
                    filename,
                    timestamp: raw.timestamp,
                })
            }
            FetchStatus::Failed => Ok(Self::Failed {
                timestamp: raw.timestamp,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationVerdict {
    Match,
    Mismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Completed,
}

/// Validation progress, keyed by article filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationEntry {
    pub status: ValidationStatus,
    pub verdict: ValidationVerdict,
    pub timestamp: String,
}

impl ValidationEntry {
    pub fn completed(verdict: ValidationVerdict) -> Self {
        Self {
            status: ValidationStatus::Completed,
            verdict,
            timestamp: now_timestamp(),
        }
    }
}

/// Builds the fetch checkpoint key for a work item.
pub fn work_item_key(book_id: &str, url: &str) -> String {
    format!("{book_id}|{url}")
}

/// Splits a fetch checkpoint key back into `(book_id, url)`.
pub fn split_work_item_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('|')
}

pub fn now_timestamp() -> String {
    chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, false)
}

/// Writes `value` as pretty JSON to a sibling temp file, then renames it over
/// `path`.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut temp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);
    if let Err(err) = fs::write(&temp_path, text) {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }
    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }
    Ok(())
}

/// Key → entry mapping backed by one JSON file.
#[derive(Debug)]
pub struct CheckpointStore<E> {
    path: PathBuf,
    entries: BTreeMap<String, E>,
}

impl<E> CheckpointStore<E>
where
    E: Serialize + DeserializeOwned,
{
    /// Loads the mapping. A missing, empty or unreadable file yields an empty
    /// mapping so the run can still proceed.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => match serde_json::from_str::<BTreeMap<String, E>>(&text) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(
                        "Could not load progress file {}: {}. Starting fresh.",
                        path.display(),
                        err
                    );
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                warn!(
                    "Could not read progress file {}: {}. Starting fresh.",
                    path.display(),
                    err
                );
                BTreeMap::new()
            }
        };
        info!(
            "Loaded progress: {} entries from {}",
            entries.len(),
            path.display()
        );
        Self { path, entries }
    }

    pub fn get(&self, key: &str) -> Option<&E> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Upserts `key` and persists the whole mapping. The in-memory entry is
    /// kept even when the write fails.
    pub fn record(&mut self, key: impl Into<String>, entry: E) -> Result<(), PersistenceError> {
        self.entries.insert(key.into(), entry);
        self.persist()
    }

    pub fn persist(&self) -> Result<(), PersistenceError> {
        write_json_atomic(&self.path, &self.entries).map_err(|source| PersistenceError {
            path: self.path.clone(),
            source,
        })
    }
}

impl CheckpointStore<FetchEntry> {
    pub fn is_success(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(FetchEntry::is_success)
    }

    /// Keys whose last outcome was a failure, in key order.
    pub fn failed_keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_success())
            .map(|(key, _)| key.clone())
            .collect()
    }
}
