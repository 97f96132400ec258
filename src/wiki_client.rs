//! MediaWiki action API client for plain-text article extracts.
//!
//! Responses are classified into success, retryable (429/503) and terminal
//! outcomes. Retryable responses are retried on a fixed delay schedule; every
//! other failure is reported on the first attempt.

use std::time::Duration;

use log::warn;
use serde_json::Value;
use thiserror::Error;

use crate::diagnostics::FetchDiagnostics;
use crate::shutdown::{Interrupted, Sleeper};

pub const DEFAULT_API_URL_TEMPLATE: &str = "https://{lang}.wikipedia.org/w/api.php";
pub const DEFAULT_USER_AGENT: &str =
    "wikifetch/0.1.0 (book catalog article fetcher; contact: catalog maintainers)";
pub const DEFAULT_RETRY_DELAYS_SECS: [u64; 3] = [5, 15, 45];

const REDIRECT_MARKER: &str = "#REDIRECT";

/// Status and body of a completed HTTP exchange, whatever the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Request timeout after {0}s")]
    Timeout(u64),
    #[error("Connection error")]
    Connection,
    #[error("Request error: {0}")]
    Other(String),
}

/// Issues one GET request and reports the reply without judging its status.
pub trait HttpTransport {
    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpReply, TransportError>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for &T {
    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpReply, TransportError> {
        (**self).get(url, query)
    }
}

/// Terminal fetch failures. Display strings are what ends up in the error log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("{}", exhausted_message(.0))]
    RetriesExhausted(u16),
    #[error("HTTP error: {0}")]
    Status(u16),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Invalid JSON response")]
    InvalidJson,
    #[error("Empty API response")]
    EmptyResponse,
    #[error("Page does not exist (404)")]
    Missing,
    #[error("Invalid page title: {0}")]
    InvalidTitle(String),
    #[error("Empty article content")]
    EmptyContent,
    #[error("Disambiguation page (no article content)")]
    Disambiguation,
    #[error("Page exists but has zero content")]
    ZeroLength,
    #[error("Page is a redirect")]
    Redirect,
    #[error("Page has content but extract failed (likely special page type)")]
    ExtractFailed,
    #[error("No revisions found")]
    NoRevisions,
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

fn exhausted_message(status: &u16) -> String {
    match *status {
        429 => "Rate limited - max retries exceeded".to_string(),
        503 => "Service unavailable - max retries exceeded".to_string(),
        other => format!("HTTP {other} - max retries exceeded"),
    }
}

/// Result of a diagnostic fetch: the outcome plus everything observed on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosedFetch {
    pub result: Result<String, FetchError>,
    pub diagnostics: FetchDiagnostics,
}

/// Source of article plaintext keyed by language and page title.
pub trait ArticleSource {
    fn fetch(&self, lang: &str, title: &str) -> Result<String, FetchError>;

    /// Like `fetch`, but also explains empty extracts and reports diagnostics.
    fn fetch_with_diagnostics(&self, lang: &str, title: &str) -> DiagnosedFetch;
}

impl<A: ArticleSource + ?Sized> ArticleSource for &A {
    fn fetch(&self, lang: &str, title: &str) -> Result<String, FetchError> {
        (**self).fetch(lang, title)
    }

    fn fetch_with_diagnostics(&self, lang: &str, title: &str) -> DiagnosedFetch {
        (**self).fetch_with_diagnostics(lang, title)
    }
}

/// One attempt of a retried request.
#[derive(Debug)]
enum Attempt<T> {
    Success(T),
    Retryable(u16),
    Terminal(FetchError),
}

fn classify(outcome: Result<HttpReply, TransportError>) -> Attempt<Value> {
    let reply = match outcome {
        Ok(reply) => reply,
        Err(err) => return Attempt::Terminal(FetchError::Transport(err)),
    };
    match reply.status {
        429 | 503 => return Attempt::Retryable(reply.status),
        200..=299 => {}
        other => return Attempt::Terminal(FetchError::Status(other)),
    }
    match serde_json::from_str::<Value>(&reply.body) {
        Ok(parsed) => Attempt::Success(parsed),
        Err(_) => Attempt::Terminal(FetchError::InvalidJson),
    }
}

/// First page object of a `query.pages` response.
fn first_page(parsed: &Value) -> Option<&Value> {
    parsed["query"]["pages"]
        .as_object()
        .and_then(|pages| pages.values().next())
}

fn page_extract(page: &Value) -> &str {
    page["extract"].as_str().unwrap_or_default()
}

fn invalid_reason(page: &Value) -> Option<String> {
    page.get("invalid")?;
    Some(
        page["invalidreason"]
            .as_str()
            .unwrap_or("unknown")
            .to_string(),
    )
}

fn is_disambiguation(page: &Value) -> bool {
    page["pageprops"].get("disambiguation").is_some()
}

fn revision_content(revision: &Value) -> &str {
    let main = &revision["slots"]["main"];
    main["*"]
        .as_str()
        .or_else(|| main["content"].as_str())
        .unwrap_or_default()
}

pub struct WikipediaClient<T, S> {
    transport: T,
    sleeper: S,
    api_url_template: String,
    retry_delays: Vec<Duration>,
}

impl<T: HttpTransport, S: Sleeper> WikipediaClient<T, S> {
    pub fn new(transport: T, sleeper: S) -> Self {
        Self {
            transport,
            sleeper,
            api_url_template: DEFAULT_API_URL_TEMPLATE.to_string(),
            retry_delays: DEFAULT_RETRY_DELAYS_SECS
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
        }
    }

    pub fn with_api_url_template(mut self, template: impl Into<String>) -> Self {
        self.api_url_template = template.into();
        self
    }

    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    fn api_url(&self, lang: &str) -> String {
        self.api_url_template.replace("{lang}", lang)
    }

    /// Runs `query` against the language's API, retrying 429/503 replies once
    /// per configured delay.
    fn request_json(&self, lang: &str, query: &[(&str, &str)]) -> Result<Value, FetchError> {
        let url = self.api_url(lang);
        let mut retries = 0usize;
        loop {
            match classify(self.transport.get(&url, query)) {
                Attempt::Success(parsed) => return Ok(parsed),
                Attempt::Terminal(err) => return Err(err),
                Attempt::Retryable(status) => {
                    let Some(delay) = self.retry_delays.get(retries).copied() else {
                        return Err(FetchError::RetriesExhausted(status));
                    };
                    let label = if status == 429 {
                        "Rate limited"
                    } else {
                        "Service unavailable"
                    };
                    warn!(
                        "{}. Waiting {}s before retry {}/{}",
                        label,
                        delay.as_secs_f64(),
                        retries + 1,
                        self.retry_delays.len()
                    );
                    self.sleeper.sleep(delay)?;
                    retries += 1;
                }
            }
        }
    }

    /// Distinguishes zero-length pages, redirects and unextractable pages by
    /// looking at the raw latest revision.
    fn explain_empty_extract(
        &self,
        lang: &str,
        title: &str,
        diagnostics: &mut FetchDiagnostics,
    ) -> FetchError {
        let query = [
            ("action", "query"),
            ("format", "json"),
            ("prop", "revisions"),
            ("titles", title),
            ("rvprop", "size|content"),
            ("rvslots", "main"),
        ];
        let parsed = match self.request_json(lang, &query) {
            Ok(parsed) => parsed,
            Err(err) => return err,
        };
        let Some(revision) = first_page(&parsed)
            .and_then(|page| page["revisions"].as_array())
            .and_then(|revisions| revisions.first())
        else {
            return FetchError::NoRevisions;
        };
        let size = revision["size"].as_u64().unwrap_or(0);
        diagnostics.raw_size = Some(size);
        if size == 0 {
            return FetchError::ZeroLength;
        }
        if revision_content(revision).starts_with(REDIRECT_MARKER) {
            diagnostics.is_redirect = true;
            return FetchError::Redirect;
        }
        FetchError::ExtractFailed
    }
}

impl<T: HttpTransport, S: Sleeper> ArticleSource for WikipediaClient<T, S> {
    fn fetch(&self, lang: &str, title: &str) -> Result<String, FetchError> {
        let query = [
            ("action", "query"),
            ("format", "json"),
            ("prop", "extracts"),
            ("explaintext", "1"),
            ("redirects", "1"),
            ("titles", title),
        ];
        let parsed = self.request_json(lang, &query)?;
        let page = first_page(&parsed).ok_or(FetchError::EmptyResponse)?;
        if page.get("missing").is_some() {
            return Err(FetchError::Missing);
        }
        if let Some(reason) = invalid_reason(page) {
            return Err(FetchError::InvalidTitle(reason));
        }
        let content = page_extract(page);
        if content.is_empty() {
            return Err(FetchError::EmptyContent);
        }
        Ok(content.to_string())
    }

    fn fetch_with_diagnostics(&self, lang: &str, title: &str) -> DiagnosedFetch {
        let mut diagnostics = FetchDiagnostics::default();
        let result = self.diagnose(lang, title, &mut diagnostics);
        DiagnosedFetch {
            result,
            diagnostics,
        }
    }
}

impl<T: HttpTransport, S: Sleeper> WikipediaClient<T, S> {
    fn diagnose(
        &self,
        lang: &str,
        title: &str,
        diagnostics: &mut FetchDiagnostics,
    ) -> Result<String, FetchError> {
        let query = [
            ("action", "query"),
            ("format", "json"),
            ("prop", "extracts|info|pageprops"),
            ("explaintext", "1"),
            ("titles", title),
            ("inprop", "url"),
        ];
        let parsed = match self.request_json(lang, &query) {
            Ok(parsed) => parsed,
            Err(err) => {
                match &err {
                    FetchError::Transport(TransportError::Connection) => {
                        diagnostics.connection_error = true
                    }
                    FetchError::Transport(TransportError::Timeout(_)) => diagnostics.timeout = true,
                    FetchError::Transport(TransportError::Other(message)) => {
                        diagnostics.exception = Some(message.clone())
                    }
                    _ => {}
                }
                return Err(err);
            }
        };
        let Some(page) = first_page(&parsed) else {
            diagnostics.api_returned_no_pages = true;
            return Err(FetchError::EmptyResponse);
        };
        diagnostics.page_id = page["pageid"].as_i64();
        diagnostics.lang = Some(lang.to_string());
        diagnostics.page_title = Some(title.to_string());

        if page.get("missing").is_some() {
            diagnostics.missing = true;
            return Err(FetchError::Missing);
        }
        if let Some(reason) = invalid_reason(page) {
            diagnostics.invalid = Some(reason.clone());
            return Err(FetchError::InvalidTitle(reason));
        }

        let content = page_extract(page);
        diagnostics.extract_length = Some(content.chars().count());
        if !content.is_empty() {
            return Ok(content.to_string());
        }
        if is_disambiguation(page) {
            diagnostics.is_disambiguation = true;
            return Err(FetchError::Disambiguation);
        }
        Err(self.explain_empty_extract(lang, title, diagnostics))
    }
}

/// `ureq`-backed transport with a per-request timeout.
pub struct UreqTransport {
    http_client: ureq::Agent,
    user_agent: String,
    timeout_secs: u64,
}

impl UreqTransport {
    pub fn new(user_agent: impl Into<String>, timeout_secs: u64) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(timeout_secs))
            .build();
        Self {
            http_client,
            user_agent: user_agent.into(),
            timeout_secs,
        }
    }

    fn map_transport_error(&self, error: ureq::Transport) -> TransportError {
        let timed_out = std::error::Error::source(&error)
            .and_then(|source| source.downcast_ref::<std::io::Error>())
            .is_some_and(|io_error| {
                matches!(
                    io_error.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                )
            });
        if timed_out {
            return TransportError::Timeout(self.timeout_secs);
        }
        match error.kind() {
            ureq::ErrorKind::Dns | ureq::ErrorKind::ConnectionFailed | ureq::ErrorKind::Io => {
                TransportError::Connection
            }
            _ => TransportError::Other(error.to_string()),
        }
    }
}

impl HttpTransport for UreqTransport {
    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpReply, TransportError> {
        let mut request = self
            .http_client
            .get(url)
            .set("User-Agent", &self.user_agent)
            .set("Accept", "application/json");
        for (key, value) in query {
            request = request.query(key, value);
        }
        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Ok(HttpReply { status, body });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(self.map_transport_error(transport))
            }
        };
        let status = response.status();
        let body = response
            .into_string()
            .map_err(|err| TransportError::Other(format!("Failed to read response: {err}")))?;
        Ok(HttpReply { status, body })
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::{HttpReply, HttpTransport, TransportError};

    /// Replays scripted replies and records every request's query.
    #[derive(Default)]
    pub struct ScriptedTransport {
        replies: RefCell<VecDeque<Result<HttpReply, TransportError>>>,
        pub requests: RefCell<Vec<(String, Vec<(String, String)>)>>,
    }

    impl ScriptedTransport {
        pub fn new(replies: Vec<Result<HttpReply, TransportError>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                requests: RefCell::new(Vec::new()),
            }
        }

        pub fn request_count(&self) -> usize {
            self.requests.borrow().len()
        }
    }

    pub fn reply(status: u16, body: &str) -> Result<HttpReply, TransportError> {
        Ok(HttpReply {
            status,
            body: body.to_string(),
        })
    }

    impl HttpTransport for ScriptedTransport {
        fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpReply, TransportError> {
            self.requests.borrow_mut().push((
                url.to_string(),
                query
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect(),
            ));
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Other("no scripted reply".to_string())))
        }
    }
}
