//! Deterministic, collision-free article filenames.
//!
//! Counters are never stored on their own. They are rebuilt from the files
//! already present in the output directory, so a restarted run continues
//! numbering where the previous one stopped.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use log::debug;
use regex::Regex;

static ARTICLE_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+)_([a-z][a-z-]*)(?:_(\d+))?\.txt$")
        .expect("article filename pattern should compile")
});

/// `(book_id, lang, n)` parsed back out of an allocated filename. `n` is 1 for
/// the unsuffixed first file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFilename {
    pub book_id: String,
    pub lang: String,
    pub index: u32,
}

pub fn parse_filename(filename: &str) -> Option<ParsedFilename> {
    let captures = ARTICLE_FILENAME.captures(filename)?;
    let index = match captures.get(3) {
        Some(suffix) => suffix.as_str().parse().ok()?,
        None => 1,
    };
    Some(ParsedFilename {
        book_id: captures.get(1)?.as_str().to_string(),
        lang: captures.get(2)?.as_str().to_string(),
        index,
    })
}

#[derive(Debug, Clone, Default)]
pub struct FilenameAllocator {
    counters: HashMap<(String, String), u32>,
}

impl FilenameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an allocator seeded from the files in `dir`. A missing directory
    /// seeds nothing.
    pub fn from_dir(dir: &Path) -> std::io::Result<Self> {
        let mut allocator = Self::new();
        allocator.seed_from_dir(dir)?;
        Ok(allocator)
    }

    pub fn seed_from_dir(&mut self, dir: &Path) -> std::io::Result<()> {
        if !dir.exists() {
            return Ok(());
        }
        let mut seeded = 0usize;
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(parsed) = parse_filename(name) {
                self.observe(&parsed);
                seeded += 1;
            }
        }
        debug!(
            "Seeded filename counters from {} existing file(s) in {}",
            seeded,
            dir.display()
        );
        Ok(())
    }

    /// Raises the counter for the parsed pair to at least its index.
    pub fn observe(&mut self, parsed: &ParsedFilename) {
        let counter = self
            .counters
            .entry((parsed.book_id.clone(), parsed.lang.clone()))
            .or_insert(0);
        *counter = (*counter).max(parsed.index);
    }

    pub fn allocate(&mut self, book_id: &str, lang: &str) -> String {
        let counter = self
            .counters
            .entry((book_id.to_string(), lang.to_string()))
            .or_insert(0);
        *counter += 1;
        if *counter == 1 {
            format!("{book_id}_{lang}.txt")
        } else {
            format!("{book_id}_{lang}_{counter}.txt")
        }
    }
}
