//! Validation pass: asks the judge whether each saved article is about the
//! book it was fetched for, and sorts verdicts into the two ledgers.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use log::{debug, error, info, warn};
use regex::Regex;
use thiserror::Error;

use crate::catalog::Catalog;
use crate::checkpoint::{CheckpointStore, ValidationEntry, ValidationVerdict};
use crate::diagnostics::ErrorLog;
use crate::judge::{excerpt, Judge, JudgeError, JudgeRequest, JudgeVerdict};
use crate::ledger::{LedgerRecord, LedgerWriter};
use crate::report::ValidationStats;
use crate::shutdown::{Sleeper, StopFlag};
use crate::source_links::LinkIndex;
use crate::url_resolver::resolve;

pub const DEFAULT_VALIDATION_THROTTLE: Duration = Duration::from_millis(2_500);
pub const DEFAULT_EXCERPT_CHARS: usize = 2_000;

static VALIDATED_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+)_([a-z]{2,3})(?:_\d+)?\.txt$")
        .expect("validated filename pattern should compile")
});

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Cannot list articles directory {}: {source}", path.display())]
    ArticlesDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `(book_id, lang)` of an article filename, or `None` when it does not
/// follow the `{book_id}_{lang}[_{n}].txt` shape with a 2-3 letter language.
pub fn parse_article_filename(filename: &str) -> Option<(&str, &str)> {
    let captures = VALIDATED_FILENAME.captures(filename)?;
    Some((captures.get(1)?.as_str(), captures.get(2)?.as_str()))
}

/// Decodes article bytes as UTF-8, falling back to latin-1. The flag is set
/// when the fallback was used.
pub fn decode_article(bytes: Vec<u8>) -> (String, bool) {
    match String::from_utf8(bytes) {
        Ok(text) => (text, false),
        Err(err) => {
            let text = err.into_bytes().into_iter().map(char::from).collect();
            (text, true)
        }
    }
}

/// How far one article got once it reached the judge.
enum Judged {
    Verdict(JudgeVerdict),
    Failed,
    Interrupted,
}

/// Everything a validation run reads from and writes to.
pub struct ValidationSetup {
    pub catalog: Catalog,
    pub links: LinkIndex,
    pub checkpoint: CheckpointStore<ValidationEntry>,
    pub matches: LedgerWriter,
    pub mismatches: LedgerWriter,
    pub error_log: ErrorLog,
    pub articles_dir: PathBuf,
}

pub struct ValidationDriver<J, S> {
    judge: J,
    sleeper: S,
    stop: StopFlag,
    setup: ValidationSetup,
    throttle: Duration,
    excerpt_chars: usize,
}

impl<J: Judge, S: Sleeper> ValidationDriver<J, S> {
    pub fn new(judge: J, sleeper: S, setup: ValidationSetup) -> Self {
        Self {
            judge,
            sleeper,
            stop: StopFlag::new(),
            setup,
            throttle: DEFAULT_VALIDATION_THROTTLE,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
        }
    }

    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_excerpt_chars(mut self, excerpt_chars: usize) -> Self {
        self.excerpt_chars = excerpt_chars;
        self
    }

    pub fn run(&mut self) -> Result<ValidationStats, ValidationError> {
        let filenames = list_articles(&self.setup.articles_dir)?;
        info!(
            "Found {} article files, {} previously validated",
            filenames.len(),
            self.setup.checkpoint.len()
        );
        let mut stats = ValidationStats::default();

        for (index, filename) in filenames.iter().enumerate() {
            if self.stop.is_stopped() {
                info!("Stop requested. Progress has been saved.");
                break;
            }
            if self.setup.checkpoint.contains(filename) {
                continue;
            }
            match self.validate_file(filename) {
                Ok(Judged::Verdict(verdict)) => {
                    stats.record_verdict(verdict.is_match, verdict.confidence);
                    self.throttle();
                }
                Ok(Judged::Failed) => {
                    stats.errors += 1;
                    self.throttle();
                }
                Ok(Judged::Interrupted) => {
                    info!("Stop requested while judging {}. It will be retried.", filename);
                    break;
                }
                Err(message) => {
                    self.setup.error_log.record_file_failure(filename, &message);
                    stats.errors += 1;
                }
            }
            if (index + 1) % 10 == 0 {
                info!(
                    "Processed {}/{} articles (Matches: {}, Mismatches: {}, Errors: {})",
                    stats.total_processed,
                    filenames.len(),
                    stats.matches,
                    stats.mismatches,
                    stats.errors
                );
            }
        }
        Ok(stats)
    }

    fn throttle(&self) {
        if self.sleeper.sleep(self.throttle).is_err() {
            debug!("Throttle cut short by stop request");
        }
    }

    /// `Err` for failures before the judge was asked.
    fn validate_file(&mut self, filename: &str) -> Result<Judged, String> {
        let (book_id, lang) = parse_article_filename(filename)
            .ok_or_else(|| "Could not parse filename format".to_string())?;
        let entry = self
            .setup
            .catalog
            .get(book_id)
            .ok_or_else(|| format!("Book ID {book_id} not found in CSV metadata"))?
            .clone();
        let bytes = std::fs::read(self.setup.articles_dir.join(filename))
            .map_err(|err| format!("Failed to read file: {err}"))?;
        let (article_text, used_fallback) = decode_article(bytes);
        if used_fallback {
            self.setup
                .error_log
                .record_file_warning(filename, "Used latin-1 encoding fallback");
        }
        let wikipedia_url = resolve(&self.setup.links, book_id, lang);

        let request = JudgeRequest {
            title: &entry.title,
            authors: &entry.authors,
            excerpt: excerpt(&article_text, self.excerpt_chars),
            excerpt_length: self.excerpt_chars,
        };
        let verdict = match self.judge.judge(&request) {
            Ok(verdict) => verdict,
            Err(JudgeError::Interrupted(_)) => return Ok(Judged::Interrupted),
            Err(err) => {
                error!("ERROR processing {}: {}", filename, err);
                self.setup
                    .error_log
                    .record_file_failure(filename, &format!("API error: {err}"));
                return Ok(Judged::Failed);
            }
        };

        let record = LedgerRecord {
            book_id,
            filename,
            title: &entry.title,
            authors: &entry.authors,
            confidence: verdict.confidence,
            reasoning: &verdict.reasoning,
            wikipedia_url: &wikipedia_url,
        };
        let (ledger, checkpoint_verdict) = if verdict.is_match {
            (&mut self.setup.matches, ValidationVerdict::Match)
        } else {
            (&mut self.setup.mismatches, ValidationVerdict::Mismatch)
        };
        if let Err(err) = ledger.write(&record) {
            error!("{}", err);
            self.setup
                .error_log
                .record_file_failure(filename, &err.to_string());
            return Ok(Judged::Failed);
        }
        if let Err(err) = self
            .setup
            .checkpoint
            .record(filename, ValidationEntry::completed(checkpoint_verdict))
        {
            warn!("{}", err);
        }
        Ok(Judged::Verdict(verdict))
    }
}

/// `*.txt` file names in `dir`, sorted.
fn list_articles(dir: &Path) -> Result<Vec<String>, ValidationError> {
    let dir_error = |source| ValidationError::ArticlesDir {
        path: dir.to_path_buf(),
        source,
    };
    let mut filenames = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(dir_error)? {
        let entry = entry.map_err(dir_error)?;
        if !entry.path().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(".txt") {
                filenames.push(name.to_string());
            }
        }
    }
    filenames.sort();
    Ok(filenames)
}
