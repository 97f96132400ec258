//! Book metadata catalog (`pg_catalog.csv`).

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

const BOOK_ID_COLUMN: usize = 0;
const TITLE_COLUMN: usize = 3;
const AUTHORS_COLUMN: usize = 5;
const MIN_COLUMNS: usize = 7;

pub const NO_TITLE: &str = "No title available";
pub const UNKNOWN_AUTHORS: &str = "Unknown";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Failed to load catalog {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub title: String,
    pub authors: String,
}

/// Title and authors by book id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<String, CatalogEntry>,
}

impl Catalog {
    /// Parses catalog CSV. The first row is a header; short or malformed rows
    /// are skipped.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let mut entries = HashMap::new();
        let mut skipped = 0usize;
        for row in csv_reader.records() {
            let row = match row {
                Ok(row) => row,
                Err(err) if err.is_io_error() => return Err(err),
                Err(err) => {
                    debug!("Skipping unreadable catalog row: {}", err);
                    skipped += 1;
                    continue;
                }
            };
            if row.len() < MIN_COLUMNS {
                skipped += 1;
                continue;
            }
            let field = |index: usize| row.get(index).unwrap_or_default();
            let title = match field(TITLE_COLUMN) {
                "" => NO_TITLE,
                title => title,
            };
            let authors = match field(AUTHORS_COLUMN) {
                "" => UNKNOWN_AUTHORS,
                authors => authors,
            };
            entries.insert(
                field(BOOK_ID_COLUMN).to_string(),
                CatalogEntry {
                    title: title.to_string(),
                    authors: authors.to_string(),
                },
            );
        }
        if skipped > 0 {
            debug!("Skipped {} short catalog row(s)", skipped);
        }
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let file = std::fs::File::open(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                CatalogError::NotFound(path.to_path_buf())
            } else {
                CatalogError::Csv {
                    path: path.to_path_buf(),
                    source: err.into(),
                }
            }
        })?;
        let catalog = Self::from_reader(file).map_err(|source| CatalogError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded metadata for {} books", catalog.len());
        Ok(catalog)
    }

    pub fn get(&self, book_id: &str) -> Option<&CatalogEntry> {
        self.entries.get(book_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
