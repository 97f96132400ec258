//! Fetch pipeline: primary pass over the link file and the diagnostic retry
//! pass over recorded failures.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::checkpoint::{split_work_item_key, work_item_key, CheckpointStore, FetchEntry};
use crate::diagnostics::{ErrorLog, FetchDiagnostics, RetryDetail, RetryReport, RetryStatus};
use crate::filename_allocator::FilenameAllocator;
use crate::report::FetchStats;
use crate::shutdown::{Sleeper, StopFlag};
use crate::source_links::SourceRecord;
use crate::wiki_client::{ArticleSource, FetchError};
use crate::wiki_url::{extract_language, extract_title, LanguagePattern};

pub const DEFAULT_FETCH_THROTTLE: Duration = Duration::from_millis(2_000);

const SAVE_FAILED: &str = "Failed to save file";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Cannot prepare articles directory {}: {source}", path.display())]
    ArticlesDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write retry results to {}: {source}", path.display())]
    RetryResults {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Terminal state of one work item that was not skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ItemOutcome {
    Saved(String),
    SaveFailed(String),
    FetchFailed(String),
    /// A stop request cut a backoff short; nothing is known about the item.
    Interrupted,
}

pub struct FetchPipeline<A, S> {
    source: A,
    sleeper: S,
    stop: StopFlag,
    checkpoint: CheckpointStore<FetchEntry>,
    error_log: ErrorLog,
    articles_dir: PathBuf,
    throttle: Duration,
}

impl<A: ArticleSource, S: Sleeper> FetchPipeline<A, S> {
    pub fn new(
        source: A,
        sleeper: S,
        checkpoint: CheckpointStore<FetchEntry>,
        error_log: ErrorLog,
        articles_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            sleeper,
            stop: StopFlag::new(),
            checkpoint,
            error_log,
            articles_dir: articles_dir.into(),
            throttle: DEFAULT_FETCH_THROTTLE,
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

    /// Processes every URL of every record, skipping keys already in the
    /// checkpoint. Stops early, between items, once the stop flag is raised.
    pub fn run_fetch(&mut self, records: &[SourceRecord]) -> Result<FetchStats, PipelineError> {
        let mut allocator = self.prepare_allocator()?;
        let mut stats = FetchStats {
            total_books: records.len(),
            ..FetchStats::default()
        };
        info!("Total books to process: {}", stats.total_books);

        'books: for (index, record) in records.iter().enumerate() {
            info!(
                "[{}/{}] Processing book_id={} ({} URL(s))",
                index + 1,
                records.len(),
                record.book_id,
                record.urls.len()
            );
            for url in &record.urls {
                if self.stop.is_stopped() {
                    info!("Stop requested. Progress has been saved.");
                    break 'books;
                }
                stats.total_urls += 1;
                let key = work_item_key(&record.book_id, url);
                if self.checkpoint.contains(&key) {
                    let previous = if self.checkpoint.is_success(&key) {
                        "saved"
                    } else {
                        "failed"
                    };
                    info!("  [SKIP] {} (already processed, {})", url, previous);
                    if let Some(filename) =
                        self.checkpoint.get(&key).and_then(FetchEntry::filename)
                    {
                        debug!("  previous file: {}", filename);
                    }
                    stats.skipped += 1;
                    continue;
                }

                match self.process_primary(&mut allocator, &record.book_id, url) {
                    ItemOutcome::Saved(filename) => {
                        info!("  [OK] {}", filename);
                        self.record(key, FetchEntry::success(filename));
                        stats.successful += 1;
                    }
                    ItemOutcome::SaveFailed(message) | ItemOutcome::FetchFailed(message) => {
                        error!("  [FAIL] {}: {}", url, message);
                        self.error_log
                            .record_item_failure(&record.book_id, url, &message);
                        self.record(key, FetchEntry::failed());
                        stats.record_failure(&record.book_id);
                    }
                    ItemOutcome::Interrupted => {
                        info!("  [STOP] {} left for the next run", url);
                        stats.total_urls -= 1;
                        break 'books;
                    }
                }
                self.throttle();
            }
        }

        info!(
            "Total URLs: {}, successful: {}, failed: {}, skipped: {}",
            stats.total_urls, stats.successful, stats.failed, stats.skipped
        );
        Ok(stats)
    }

    /// Re-attempts every failed checkpoint entry with the extended language
    /// pattern and the diagnostic fetch, then writes the report to
    /// `results_path`.
    pub fn run_retry(&mut self, results_path: &Path) -> Result<RetryReport, PipelineError> {
        let mut allocator = self.prepare_allocator()?;
        let failed_keys = self.checkpoint.failed_keys();
        info!("Found {} failed entries to retry", failed_keys.len());
        let mut report = RetryReport::new(failed_keys.len());

        for (index, key) in failed_keys.iter().enumerate() {
            if self.stop.is_stopped() {
                info!("Stop requested. Progress has been saved.");
                break;
            }
            let Some((book_id, url)) = split_work_item_key(key) else {
                warn!("Skipping malformed progress key: {}", key);
                continue;
            };
            info!(
                "[{}/{}] Retrying book_id={}",
                index + 1,
                failed_keys.len(),
                book_id
            );
            info!("  URL: {}", url);

            let Some(detail) = self.retry_item(&mut allocator, book_id, url) else {
                info!("  [STOP] {} left for the next run", url);
                break;
            };
            match detail.status {
                RetryStatus::Success => {
                    if let Some(filename) = &detail.filename {
                        info!("  [SUCCESS] Saved to {}", filename);
                        self.record(key.clone(), FetchEntry::success(filename.clone()));
                    }
                }
                RetryStatus::Failed => {
                    let message = detail.error.as_deref().unwrap_or("Unknown error");
                    error!("  [FAIL] {}", message);
                    for (name, value) in detail.diagnostics.entries() {
                        info!("    {}: {}", name, value);
                    }
                    self.error_log.record_item_failure(book_id, url, message);
                    self.record(key.clone(), FetchEntry::failed());
                }
            }
            report.push(detail);
            self.throttle();
        }

        report
            .save(results_path)
            .map_err(|source| PipelineError::RetryResults {
                path: results_path.to_path_buf(),
                source,
            })?;
        info!(
            "Total retried: {}, successful: {}, still failed: {}",
            report.total, report.successful, report.still_failed
        );
        info!("Detailed results saved to {}", results_path.display());
        Ok(report)
    }

    fn process_primary(
        &self,
        allocator: &mut FilenameAllocator,
        book_id: &str,
        url: &str,
    ) -> ItemOutcome {
        let lang = extract_language(url, LanguagePattern::Strict);
        let title = match extract_title(url) {
            Ok(title) => title,
            Err(err) => return ItemOutcome::FetchFailed(err.to_string()),
        };
        match self.source.fetch(&lang, &title) {
            Ok(content) => {
                let filename = allocator.allocate(book_id, &lang);
                match self.save_article(&filename, &content) {
                    Ok(()) => ItemOutcome::Saved(filename),
                    Err(_) => ItemOutcome::SaveFailed(SAVE_FAILED.to_string()),
                }
            }
            Err(FetchError::Interrupted(_)) => ItemOutcome::Interrupted,
            Err(err) => ItemOutcome::FetchFailed(err.to_string()),
        }
    }

    /// `None` when a stop request interrupted the fetch.
    fn retry_item(
        &self,
        allocator: &mut FilenameAllocator,
        book_id: &str,
        url: &str,
    ) -> Option<RetryDetail> {
        let lang = extract_language(url, LanguagePattern::Extended);
        let mut detail = RetryDetail {
            book_id: book_id.to_string(),
            url: url.to_string(),
            lang: None,
            page_title: None,
            status: RetryStatus::Failed,
            filename: None,
            error: None,
            diagnostics: FetchDiagnostics::default(),
        };
        let title = match extract_title(url) {
            Ok(title) => title,
            Err(err) => {
                detail.error = Some(err.to_string());
                detail.diagnostics.title_extraction_failed = true;
                return Some(detail);
            }
        };

        let fetched = self.source.fetch_with_diagnostics(&lang, &title);
        if matches!(fetched.result, Err(FetchError::Interrupted(_))) {
            return None;
        }
        detail.lang = Some(lang.clone());
        detail.page_title = Some(title);
        detail.diagnostics = fetched.diagnostics;
        match fetched.result {
            Ok(content) => {
                let filename = allocator.allocate(book_id, &lang);
                match self.save_article(&filename, &content) {
                    Ok(()) => {
                        detail.status = RetryStatus::Success;
                        detail.filename = Some(filename);
                    }
                    Err(_) => detail.error = Some(SAVE_FAILED.to_string()),
                }
            }
            Err(err) => detail.error = Some(err.to_string()),
        }
        Some(detail)
    }

    fn throttle(&self) {
        if self.sleeper.sleep(self.throttle).is_err() {
            debug!("Throttle cut short by stop request");
        }
    }

    fn prepare_allocator(&self) -> Result<FilenameAllocator, PipelineError> {
        let dir_error = |source| PipelineError::ArticlesDir {
            path: self.articles_dir.clone(),
            source,
        };
        std::fs::create_dir_all(&self.articles_dir).map_err(dir_error)?;
        FilenameAllocator::from_dir(&self.articles_dir).map_err(dir_error)
    }

    fn save_article(&self, filename: &str, content: &str) -> std::io::Result<()> {
        let path = self.articles_dir.join(filename);
        std::fs::write(&path, content).inspect_err(|err| {
            error!("Error saving file {}: {}", path.display(), err);
        })
    }

    fn record(&mut self, key: String, entry: FetchEntry) {
        debug!("Checkpoint {} -> {:?}", key, entry);
        if let Err(err) = self.checkpoint.record(key, entry) {
            error!("{}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::FetchPipeline;
    use crate::checkpoint::{CheckpointStore, FetchEntry};
    use crate::diagnostics::{ErrorLog, FetchDiagnostics, RetryStatus};
    use crate::shutdown::{Interrupted, RecordingSleeper, StopFlag, ThreadSleeper};
    use crate::source_links::parse_records;
    use crate::wiki_client::fakes::{reply, ScriptedTransport};
    use crate::wiki_client::{
        ArticleSource, DiagnosedFetch, FetchError, HttpReply, HttpTransport, TransportError,
        WikipediaClient,
    };

    /// Raises the stop flag as the request goes out, like a Ctrl-C mid-request.
    struct InterruptingTransport<'a> {
        inner: &'a ScriptedTransport,
        stop: StopFlag,
    }

    impl HttpTransport for InterruptingTransport<'_> {
        fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpReply, TransportError> {
            self.stop.request_stop();
            self.inner.get(url, query)
        }
    }

    /// Answers by page title; unknown titles are missing pages.
    #[derive(Default)]
    struct FakeSource {
        pages: HashMap<String, Result<String, FetchError>>,
        calls: RefCell<Vec<(String, String)>>,
        stop_after_call: Option<StopFlag>,
    }

    impl FakeSource {
        fn with_page(mut self, title: &str, result: Result<&str, FetchError>) -> Self {
            self.pages
                .insert(title.to_string(), result.map(str::to_string));
            self
        }

        fn answer(&self, lang: &str, title: &str) -> Result<String, FetchError> {
            self.calls
                .borrow_mut()
                .push((lang.to_string(), title.to_string()));
            if let Some(stop) = &self.stop_after_call {
                stop.request_stop();
            }
            self.pages
                .get(title)
                .cloned()
                .unwrap_or(Err(FetchError::Missing))
        }
    }

    impl ArticleSource for FakeSource {
        fn fetch(&self, lang: &str, title: &str) -> Result<String, FetchError> {
            self.answer(lang, title)
        }

        fn fetch_with_diagnostics(&self, lang: &str, title: &str) -> DiagnosedFetch {
            let result = self.answer(lang, title);
            DiagnosedFetch {
                diagnostics: FetchDiagnostics {
                    lang: Some(lang.to_string()),
                    page_title: Some(title.to_string()),
                    missing: matches!(result, Err(FetchError::Missing)),
                    ..FetchDiagnostics::default()
                },
                result,
            }
        }
    }

    struct Workspace {
        root: PathBuf,
    }

    impl Workspace {
        fn new(name: &str) -> Self {
            let nonce = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("system time should be valid")
                .as_nanos();
            let root = std::env::temp_dir().join(format!("wikifetch_pipeline_{name}_{nonce}"));
            fs::create_dir_all(&root).expect("workspace should be creatable");
            Self { root }
        }

        fn articles(&self) -> PathBuf {
            self.root.join("articles")
        }

        fn progress(&self) -> PathBuf {
            self.root.join("progress.json")
        }

        fn errors(&self) -> PathBuf {
            self.root.join("errors.log")
        }

        fn pipeline<'a>(
            &self,
            source: &'a FakeSource,
            sleeper: &'a RecordingSleeper,
        ) -> FetchPipeline<&'a FakeSource, &'a RecordingSleeper> {
            FetchPipeline::new(
                source,
                sleeper,
                CheckpointStore::load(self.progress()),
                ErrorLog::new(self.errors()),
                self.articles(),
            )
        }
    }

    impl Drop for Workspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    #[test]
    fn test_single_url_is_saved_and_checkpointed() {
        let workspace = Workspace::new("single");
        let source = FakeSource::default().with_page("Complete_Works", Ok("Collected plays."));
        let sleeper = RecordingSleeper::default();
        let records = parse_records("100,https://en.wikipedia.org/wiki/Complete_Works\n");

        let stats = workspace
            .pipeline(&source, &sleeper)
            .run_fetch(&records)
            .expect("run should complete");

        assert_eq!(stats.successful, 1);
        assert_eq!(sleeper.seconds(), vec![2.0]);
        let progress = CheckpointStore::<FetchEntry>::load(workspace.progress());
        let entry = progress
            .get("100|https://en.wikipedia.org/wiki/Complete_Works")
            .expect("entry should be recorded");
        assert_eq!(entry.filename(), Some("100_en.txt"));
        assert_eq!(
            fs::read_to_string(workspace.articles().join("100_en.txt"))
                .expect("article should exist"),
            "Collected plays."
        );
    }

    #[test]
    fn test_second_url_in_same_language_gets_numbered_file() {
        let workspace = Workspace::new("numbered");
        let source = FakeSource::default()
            .with_page("Hamlet", Ok("Prince of Denmark."))
            .with_page("Macbeth", Ok("Thane of Cawdor."));
        let sleeper = RecordingSleeper::default();
        let records = parse_records(
            "100,https://en.wikipedia.org/wiki/Hamlet https://en.wikipedia.org/wiki/Macbeth\n",
        );

        workspace
            .pipeline(&source, &sleeper)
            .run_fetch(&records)
            .expect("run should complete");

        let progress = CheckpointStore::<FetchEntry>::load(workspace.progress());
        assert_eq!(
            progress
                .get("100|https://en.wikipedia.org/wiki/Macbeth")
                .and_then(FetchEntry::filename),
            Some("100_en_2.txt")
        );
        assert_eq!(
            fs::read_to_string(workspace.articles().join("100_en_2.txt"))
                .expect("article should exist"),
            "Thane of Cawdor."
        );
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let workspace = Workspace::new("idempotent");
        let source = FakeSource::default().with_page("Hamlet", Ok("Prince of Denmark."));
        let records = parse_records(
            "100,https://en.wikipedia.org/wiki/Hamlet\n101,https://fr.wikipedia.org/wiki/Absent\n",
        );
        let first_sleeper = RecordingSleeper::default();
        workspace
            .pipeline(&source, &first_sleeper)
            .run_fetch(&records)
            .expect("first run should complete");
        let checkpoint_after_first =
            fs::read_to_string(workspace.progress()).expect("checkpoint should exist");
        let calls_after_first = source.calls.borrow().len();

        let second_sleeper = RecordingSleeper::default();
        let stats = workspace
            .pipeline(&source, &second_sleeper)
            .run_fetch(&records)
            .expect("second run should complete");

        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.successful + stats.failed, 0);
        assert_eq!(source.calls.borrow().len(), calls_after_first);
        assert!(second_sleeper.seconds().is_empty());
        assert_eq!(
            fs::read_to_string(workspace.progress()).expect("checkpoint should exist"),
            checkpoint_after_first
        );
        let article_count = fs::read_dir(workspace.articles())
            .expect("articles dir should exist")
            .count();
        assert_eq!(article_count, 1);
    }

    #[test]
    fn test_untitled_url_fails_without_network_work() {
        let workspace = Workspace::new("untitled");
        let source = FakeSource::default();
        let sleeper = RecordingSleeper::default();
        let records = parse_records("5,https://en.wikipedia.org/wiki/\n");

        let stats = workspace
            .pipeline(&source, &sleeper)
            .run_fetch(&records)
            .expect("run should complete");

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.failed_book_ids, vec!["5".to_string()]);
        assert!(source.calls.borrow().is_empty());
        let log = fs::read_to_string(workspace.errors()).expect("error log should exist");
        assert!(log.contains(
            "book_id=5, url=https://en.wikipedia.org/wiki/, error=Could not extract page title"
        ));
        let progress = CheckpointStore::<FetchEntry>::load(workspace.progress());
        assert_eq!(
            progress.failed_keys(),
            vec!["5|https://en.wikipedia.org/wiki/".to_string()]
        );
    }

    #[test]
    fn test_missing_page_is_logged_and_checkpointed_as_failed() {
        let workspace = Workspace::new("missing");
        let source = FakeSource::default();
        let sleeper = RecordingSleeper::default();
        let records = parse_records("9,https://de.wikipedia.org/wiki/Nichts\n");

        let stats = workspace
            .pipeline(&source, &sleeper)
            .run_fetch(&records)
            .expect("run should complete");

        assert_eq!(stats.failed, 1);
        assert_eq!(
            source.calls.borrow().as_slice(),
            &[("de".to_string(), "Nichts".to_string())]
        );
        let log = fs::read_to_string(workspace.errors()).expect("error log should exist");
        assert!(log.contains("error=Page does not exist (404)"));
    }

    #[test]
    fn test_unwritable_articles_dir_is_a_save_failure() {
        let workspace = Workspace::new("save_failure");
        let source = FakeSource::default().with_page("Hamlet", Ok("Prince of Denmark."));
        let sleeper = RecordingSleeper::default();
        let records = parse_records("100,https://en.wikipedia.org/wiki/Hamlet\n");
        let mut pipeline = workspace.pipeline(&source, &sleeper);
        let mut allocator = pipeline
            .prepare_allocator()
            .expect("articles dir should be prepared");
        fs::remove_dir_all(workspace.articles()).expect("articles dir should be removable");
        fs::write(workspace.articles(), "not a directory").expect("blocker should write");

        let outcome = pipeline.process_primary(
            &mut allocator,
            "100",
            "https://en.wikipedia.org/wiki/Hamlet",
        );
        assert_eq!(
            outcome,
            super::ItemOutcome::SaveFailed("Failed to save file".to_string())
        );
        assert!(pipeline.run_fetch(&records).is_err());
    }

    #[test]
    fn test_stop_flag_halts_between_items() {
        let workspace = Workspace::new("stop");
        let stop = StopFlag::new();
        let source = FakeSource {
            stop_after_call: Some(stop.clone()),
            ..FakeSource::default()
        }
        .with_page("Hamlet", Ok("Prince of Denmark."))
        .with_page("Macbeth", Ok("Thane of Cawdor."));
        let sleeper = RecordingSleeper::default();
        let records = parse_records(
            "100,https://en.wikipedia.org/wiki/Hamlet\n101,https://en.wikipedia.org/wiki/Macbeth\n",
        );

        let stats = workspace
            .pipeline(&source, &sleeper)
            .with_stop_flag(stop)
            .run_fetch(&records)
            .expect("run should complete");

        assert_eq!(stats.successful, 1);
        assert_eq!(source.calls.borrow().len(), 1);
        let progress = CheckpointStore::<FetchEntry>::load(workspace.progress());
        assert_eq!(progress.len(), 1);
    }

    #[test]
    fn test_stop_during_rate_limit_backoff_leaves_item_unrecorded() {
        let workspace = Workspace::new("stop_backoff");
        let stop = StopFlag::new();
        let transport = ScriptedTransport::new(vec![
            reply(429, ""),
            reply(429, ""),
            reply(429, ""),
            reply(429, ""),
        ]);
        let client = WikipediaClient::new(
            InterruptingTransport {
                inner: &transport,
                stop: stop.clone(),
            },
            ThreadSleeper::new(stop.clone()),
        );
        let sleeper = RecordingSleeper::default();
        let records = parse_records(
            "100,https://en.wikipedia.org/wiki/Hamlet\n101,https://en.wikipedia.org/wiki/Macbeth\n",
        );

        let stats = FetchPipeline::new(
            client,
            &sleeper,
            CheckpointStore::load(workspace.progress()),
            ErrorLog::new(workspace.errors()),
            workspace.articles(),
        )
        .with_stop_flag(stop)
        .run_fetch(&records)
        .expect("run should complete");

        assert_eq!(transport.request_count(), 1);
        assert_eq!((stats.total_urls, stats.successful, stats.failed), (0, 0, 0));
        assert!(sleeper.calls.borrow().is_empty());
        assert!(!workspace.errors().exists());
        let progress = CheckpointStore::<FetchEntry>::load(workspace.progress());
        assert_eq!(progress.len(), 0);
    }

    #[test]
    fn test_interrupted_retry_keeps_entry_failed_and_unlogged() {
        let workspace = Workspace::new("retry_interrupted");
        let key = "8|https://en.wikipedia.org/wiki/Gone";
        let mut seeded = CheckpointStore::<FetchEntry>::load(workspace.progress());
        seeded
            .record(key, FetchEntry::failed())
            .expect("seed should persist");
        let checkpoint_before =
            fs::read_to_string(workspace.progress()).expect("checkpoint should exist");

        let source = FakeSource::default().with_page("Gone", Err(FetchError::from(Interrupted)));
        let sleeper = RecordingSleeper::default();
        let results_path = workspace.root.join("retry_results.json");
        let report = workspace
            .pipeline(&source, &sleeper)
            .run_retry(&results_path)
            .expect("retry should complete");

        assert_eq!(report.total, 1);
        assert!(report.details.is_empty());
        assert!(!workspace.errors().exists());
        assert_eq!(
            fs::read_to_string(workspace.progress()).expect("checkpoint should exist"),
            checkpoint_before
        );
    }

    #[test]
    fn test_retry_pass_upgrades_recovered_entries_and_reports_the_rest() {
        let workspace = Workspace::new("retry");
        let mut seeded = CheckpointStore::<FetchEntry>::load(workspace.progress());
        seeded
            .record("7|https://zh-yue.wikipedia.org/wiki/Canton", FetchEntry::failed())
            .expect("seed should persist");
        seeded
            .record("8|https://en.wikipedia.org/wiki/Gone", FetchEntry::failed())
            .expect("seed should persist");
        seeded
            .record("9|https://en.wikipedia.org/wiki/Done", FetchEntry::success("9_en.txt"))
            .expect("seed should persist");
        fs::create_dir_all(workspace.articles()).expect("articles dir should be creatable");
        fs::write(workspace.articles().join("7_zh-yue.txt"), "older")
            .expect("fixture should write");

        let source = FakeSource::default().with_page("Canton", Ok("City in China."));
        let sleeper = RecordingSleeper::default();
        let results_path = workspace.root.join("retry_results.json");
        let report = workspace
            .pipeline(&source, &sleeper)
            .run_retry(&results_path)
            .expect("retry should complete");

        assert_eq!((report.total, report.successful, report.still_failed), (2, 1, 1));
        assert_eq!(source.calls.borrow()[0].0, "zh-yue");
        let recovered = &report.details[0];
        assert_eq!(recovered.status, RetryStatus::Success);
        assert_eq!(recovered.filename.as_deref(), Some("7_zh-yue_2.txt"));
        assert!(report.details[1].diagnostics.missing);

        let progress = CheckpointStore::<FetchEntry>::load(workspace.progress());
        assert!(progress.is_success("7|https://zh-yue.wikipedia.org/wiki/Canton"));
        assert_eq!(
            progress.failed_keys(),
            vec!["8|https://en.wikipedia.org/wiki/Gone".to_string()]
        );
        let saved: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(&results_path).expect("results should exist"),
        )
        .expect("results should be JSON");
        assert_eq!(saved["still_failed"], 1);
        assert_eq!(saved["details"][1]["error"], "Page does not exist (404)");
        assert_eq!(sleeper.seconds(), vec![2.0, 2.0]);
    }

    #[test]
    fn test_retry_with_nothing_failed_writes_empty_report() {
        let workspace = Workspace::new("retry_empty");
        let source = FakeSource::default();
        let sleeper = RecordingSleeper::default();
        let results_path = workspace.root.join("retry_results.json");

        let report = workspace
            .pipeline(&source, &sleeper)
            .run_retry(&results_path)
            .expect("retry should complete");

        assert_eq!(report.total, 0);
        assert!(results_path.exists());
    }
}
