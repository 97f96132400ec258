//! Persistent run configuration model, defaults and loading.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::judge::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use crate::wiki_client::{DEFAULT_API_URL_TEMPLATE, DEFAULT_RETRY_DELAYS_SECS, DEFAULT_USER_AGENT};

pub const CONFIG_FILE_NAME: &str = "wikifetch.toml";

/// Root configuration read from `wikifetch.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Input and output locations of the fetch pipeline.
    pub paths: PathsConfig,
    #[serde(default)]
    /// Remote fetch behavior.
    pub fetch: FetchConfig,
    #[serde(default)]
    /// Validation pass inputs, outputs and judge settings.
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct PathsConfig {
    pub input_file: PathBuf,
    pub articles_dir: PathBuf,
    pub progress_file: PathBuf,
    pub error_log: PathBuf,
    pub summary_file: PathBuf,
    pub retry_results: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_file: PathBuf::from("all_book_wiki_links.txt"),
            articles_dir: PathBuf::from("articles"),
            progress_file: PathBuf::from("progress.json"),
            error_log: PathBuf::from("errors.log"),
            summary_file: PathBuf::from("summary.txt"),
            retry_results: PathBuf::from("retry_results.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Pause after every processed work item.
    pub request_delay_ms: u64,
    pub request_timeout_secs: u64,
    /// Backoff before each retry of a rate-limited request.
    pub retry_delays_secs: Vec<u64>,
    pub user_agent: String,
    /// Endpoint with a `{lang}` placeholder.
    pub api_url_template: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 2_000,
            request_timeout_secs: 30,
            retry_delays_secs: DEFAULT_RETRY_DELAYS_SECS.to_vec(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            api_url_template: DEFAULT_API_URL_TEMPLATE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub request_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub catalog_path: PathBuf,
    pub progress_file: PathBuf,
    pub matches_file: PathBuf,
    pub mismatches_file: PathBuf,
    pub error_log: PathBuf,
    pub summary_file: PathBuf,
    /// Characters of article text shown to the judge.
    pub excerpt_chars: usize,
    pub model: String,
    pub max_tokens: usize,
    pub judge_attempts: usize,
    pub judge_retry_delays_secs: Vec<u64>,
    /// Tab-separated result files rewritten by `backfill-urls`.
    pub legacy_results: Vec<PathBuf>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 2_500,
            request_timeout_secs: 60,
            catalog_path: PathBuf::from("pg_catalog.csv"),
            progress_file: PathBuf::from("validation_progress.json"),
            matches_file: PathBuf::from("validated_matches.csv"),
            mismatches_file: PathBuf::from("validation_mismatches.csv"),
            error_log: PathBuf::from("validation_errors.log"),
            summary_file: PathBuf::from("validation_summary.txt"),
            excerpt_chars: 2_000,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            judge_attempts: 3,
            judge_retry_delays_secs: vec![5, 15],
            legacy_results: vec![
                PathBuf::from("validated_matches.txt"),
                PathBuf::from("validation_mismatches.txt"),
            ],
        }
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

/// Reads the config file. A missing file yields defaults; an unreadable or
/// invalid one yields defaults with a warning.
pub fn load_config(path: &Path) -> Config {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!("No config file at {}. Using defaults", path.display());
            return Config::default();
        }
        Err(err) => {
            warn!(
                "Failed to read config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            return Config::default();
        }
    };
    match toml::from_str::<Config>(&text) {
        Ok(config) => sanitize_config(config),
        Err(err) => {
            warn!(
                "Failed to parse config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            Config::default()
        }
    }
}

/// Replaces values that would make a run misbehave with their defaults.
pub fn sanitize_config(config: Config) -> Config {
    let fetch_defaults = FetchConfig::default();
    let validation_defaults = ValidationConfig::default();
    let Config {
        paths,
        mut fetch,
        mut validation,
    } = config;

    if fetch.retry_delays_secs.is_empty() {
        fetch.retry_delays_secs = fetch_defaults.retry_delays_secs;
    }
    if fetch.user_agent.trim().is_empty() {
        fetch.user_agent = fetch_defaults.user_agent;
    }
    if !fetch.api_url_template.contains("{lang}") {
        warn!(
            "api_url_template has no {{lang}} placeholder. Using {}",
            fetch_defaults.api_url_template
        );
        fetch.api_url_template = fetch_defaults.api_url_template;
    }
    fetch.request_timeout_secs = fetch.request_timeout_secs.max(1);

    if validation.excerpt_chars == 0 {
        validation.excerpt_chars = validation_defaults.excerpt_chars;
    }
    if validation.model.trim().is_empty() {
        validation.model = validation_defaults.model;
    }
    validation.max_tokens = validation.max_tokens.clamp(16, 4_096);
    validation.judge_attempts = validation.judge_attempts.clamp(1, 10);
    validation.request_timeout_secs = validation.request_timeout_secs.max(1);

    Config {
        paths,
        fetch,
        validation,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::{load_config, sanitize_config, Config};

    fn unique_temp_path(name: &str) -> PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be valid")
            .as_nanos();
        std::env::temp_dir().join(format!("wikifetch_{name}_{nonce}.toml"))
    }

    #[test]
    fn test_missing_config_file_yields_defaults() {
        let config = load_config(&unique_temp_path("absent"));
        assert_eq!(config, Config::default());
        assert_eq!(config.fetch.request_delay_ms, 2_000);
        assert_eq!(config.validation.request_delay_ms, 2_500);
        assert_eq!(config.fetch.retry_delays_secs, vec![5, 15, 45]);
    }

    #[test]
    fn test_partial_config_keeps_defaults_for_unset_fields() {
        let path = unique_temp_path("partial");
        fs::write(
            &path,
            "[paths]\narticles_dir = \"out/articles\"\n\n[validation]\nexcerpt_chars = 500\n",
        )
        .expect("fixture should write");
        let config = load_config(&path);
        assert_eq!(config.paths.articles_dir, PathBuf::from("out/articles"));
        assert_eq!(config.paths.progress_file, PathBuf::from("progress.json"));
        assert_eq!(config.validation.excerpt_chars, 500);
        assert_eq!(config.validation.max_tokens, 500);
        fs::remove_file(path).expect("fixture should be removable");
    }

    #[test]
    fn test_invalid_config_falls_back_to_defaults() {
        let path = unique_temp_path("invalid");
        fs::write(&path, "[fetch\nrequest_delay_ms = ").expect("fixture should write");
        assert_eq!(load_config(&path), Config::default());
        fs::remove_file(path).expect("fixture should be removable");
    }

    #[test]
    fn test_sanitize_config_restores_unusable_values() {
        let mut config = Config::default();
        config.fetch.retry_delays_secs.clear();
        config.fetch.api_url_template = "https://example.org/api.php".to_string();
        config.validation.excerpt_chars = 0;
        config.validation.judge_attempts = 0;

        let sanitized = sanitize_config(config);
        assert_eq!(sanitized.fetch.retry_delays_secs, vec![5, 15, 45]);
        assert!(sanitized.fetch.api_url_template.contains("{lang}"));
        assert_eq!(sanitized.validation.excerpt_chars, 2_000);
        assert_eq!(sanitized.validation.judge_attempts, 1);
    }
}
