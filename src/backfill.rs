//! Adds a `wikipedia_url` column to legacy tab-separated result files.

use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;

use crate::source_links::LinkIndex;
use crate::url_resolver::resolve;

const BOOK_ID_COLUMN: usize = 3;
const LANGUAGE_COLUMN: usize = 4;
const MIN_COLUMNS: usize = 6;

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("Failed to back up {}: {source}", path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to rewrite {}: {source}", path.display())]
    Rewrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What happened to one results file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillOutcome {
    Missing,
    Updated { data_rows: usize },
}

/// Appends the resolved URL to every row of a results file's text. The first
/// line is the header; blank lines and rows that are too short pass through.
pub fn add_url_column(text: &str, links: &LinkIndex) -> String {
    let mut updated = String::with_capacity(text.len() + text.len() / 4);
    for (index, line) in text.lines().enumerate() {
        updated.push_str(line);
        if index == 0 {
            updated.push_str("\twikipedia_url");
        } else if !line.trim().is_empty() {
            let columns: Vec<&str> = line.split('\t').collect();
            if columns.len() < MIN_COLUMNS {
                warn!(
                    "Line {} has fewer than {} columns, leaving it unchanged: {}",
                    index + 1,
                    MIN_COLUMNS,
                    line
                );
            } else {
                let url = resolve(links, columns[BOOK_ID_COLUMN], columns[LANGUAGE_COLUMN]);
                updated.push('\t');
                updated.push_str(&url);
            }
        }
        updated.push('\n');
    }
    updated
}

/// Backs `path` up to `<path>.backup` and rewrites it with the extra column.
/// Missing files are skipped.
pub fn backfill_file(path: &Path, links: &LinkIndex) -> Result<BackfillOutcome, BackfillError> {
    if !path.exists() {
        info!("File {} does not exist, skipping.", path.display());
        return Ok(BackfillOutcome::Missing);
    }
    let mut backup_name = path.as_os_str().to_os_string();
    backup_name.push(".backup");
    let backup_path = PathBuf::from(backup_name);
    std::fs::copy(path, &backup_path).map_err(|source| BackfillError::Backup {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Created backup: {}", backup_path.display());

    let rewrite_error = |source| BackfillError::Rewrite {
        path: path.to_path_buf(),
        source,
    };
    let text = std::fs::read_to_string(path).map_err(rewrite_error)?;
    let updated = add_url_column(&text, links);
    std::fs::write(path, updated).map_err(rewrite_error)?;

    let data_rows = text.lines().count().saturating_sub(1);
    info!("Updated {}: {} data rows processed", path.display(), data_rows);
    Ok(BackfillOutcome::Updated { data_rows })
}
