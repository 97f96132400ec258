//! Plain-text run summaries.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{error, info};

use crate::judge::Confidence;

const GENERATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Counters of one fetch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub total_books: usize,
    pub total_urls: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failed_book_ids: Vec<String>,
}

impl FetchStats {
    pub fn record_failure(&mut self, book_id: &str) {
        self.failed += 1;
        self.failed_book_ids.push(book_id.to_string());
    }

    /// Share of attempted URLs that succeeded, in percent.
    pub fn success_rate(&self) -> f64 {
        let attempted = self.total_urls.saturating_sub(self.skipped).max(1);
        self.successful as f64 / attempted as f64 * 100.0
    }

    pub fn summary(&self, generated: DateTime<Local>) -> String {
        let mut text = format!(
            "Wikipedia Article Scraper - Summary Report\n\
             Generated: {}\n\
             \n\
             Total Books Processed: {}\n\
             Total URLs Processed: {}\n\
             Successful Downloads: {}\n\
             Failed Downloads: {}\n\
             Skipped (already done): {}\n\
             \n\
             Success Rate: {:.2}%\n\
             \n\
             Failed Book IDs:\n",
            generated.format(GENERATED_FORMAT),
            self.total_books,
            self.total_urls,
            self.successful,
            self.failed,
            self.skipped,
            self.success_rate(),
        );
        let failed: BTreeSet<&str> = self.failed_book_ids.iter().map(String::as_str).collect();
        if failed.is_empty() {
            text.push_str("  None\n");
        }
        for book_id in failed {
            let _ = writeln!(text, "  - {book_id}");
        }
        text
    }
}

/// Tally of verdicts per confidence level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfidenceCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl ConfidenceCounts {
    pub fn add(&mut self, confidence: Confidence) {
        match confidence {
            Confidence::High => self.high += 1,
            Confidence::Medium => self.medium += 1,
            Confidence::Low => self.low += 1,
        }
    }

    pub fn get(&self, confidence: Confidence) -> usize {
        match confidence {
            Confidence::High => self.high,
            Confidence::Medium => self.medium,
            Confidence::Low => self.low,
        }
    }
}

/// Counters of one validation pass. `total_processed` counts judged articles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub total_processed: usize,
    pub matches: usize,
    pub mismatches: usize,
    pub errors: usize,
    pub match_confidence: ConfidenceCounts,
    pub mismatch_confidence: ConfidenceCounts,
}

impl ValidationStats {
    pub fn record_verdict(&mut self, is_match: bool, confidence: Confidence) {
        self.total_processed += 1;
        if is_match {
            self.matches += 1;
            self.match_confidence.add(confidence);
        } else {
            self.mismatches += 1;
            self.mismatch_confidence.add(confidence);
        }
    }

    pub fn summary(&self, generated: DateTime<Local>, elapsed: Duration) -> String {
        let total = self.total_processed;
        let mut text = format!(
            "Wikipedia Article Validation - Summary Report\n\
             Generated: {}\n\
             \n\
             Total Articles Processed: {}\n\
             Validated Matches: {} ({})\n\
             Validation Mismatches: {} ({})\n\
             Errors/Skipped: {} ({})\n",
            generated.format(GENERATED_FORMAT),
            total,
            self.matches,
            percent(self.matches, total),
            self.mismatches,
            percent(self.mismatches, total),
            self.errors,
            percent(self.errors, total),
        );
        for (label, counts, of) in [
            ("Matches", &self.match_confidence, self.matches),
            ("Mismatches", &self.mismatch_confidence, self.mismatches),
        ] {
            let _ = writeln!(text, "\nConfidence Distribution ({label}):");
            for confidence in Confidence::ALL {
                let count = counts.get(confidence);
                let _ = writeln!(
                    text,
                    "  {}: {} ({} of {})",
                    confidence.as_str(),
                    count,
                    percent(count, of),
                    label.to_lowercase()
                );
            }
        }
        let _ = writeln!(text, "\nProcessing Time: {}", format_elapsed(elapsed));
        text
    }
}

/// `part / whole` as a one-decimal percentage; `0.0%` when `whole` is zero.
fn percent(part: usize, whole: usize) -> String {
    if whole == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", part as f64 * 100.0 / whole as f64)
}

fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    format!(
        "{}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60
    )
}

pub fn write_summary(path: &Path, summary: &str) {
    match std::fs::write(path, summary) {
        Ok(()) => info!("Summary saved to {}", path.display()),
        Err(err) => error!("Error saving summary to {}: {}", path.display(), err),
    }
}
