//! Remote semantic-match judge: asks an LLM whether an article is about a work.

use std::sync::LazyLock;
use std::time::Duration;

use log::warn;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shutdown::{Interrupted, Sleeper};

pub const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
pub const DEFAULT_MAX_TOKENS: usize = 500;
pub const DEFAULT_JUDGE_ATTEMPTS: usize = 3;

const NO_REASONING: &str = "No reasoning provided";

static VERDICT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)VERDICT:\s*(YES|NO)").expect("verdict pattern should compile")
});
static CONFIDENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)CONFIDENCE:\s*(HIGH|MEDIUM|LOW)").expect("confidence pattern should compile")
});
static REASONING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)REASONING:\s*(.+)").expect("reasoning pattern should compile")
});

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("ANTHROPIC_API_KEY not found in environment")]
    MissingApiKey,
    #[error("Judge request failed: {0}")]
    Transport(String),
    #[error("Judge returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Judge response parse failed: {0}")]
    Malformed(String),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub const ALL: [Confidence; 3] = [Confidence::High, Confidence::Medium, Confidence::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }

    fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "HIGH" => Some(Self::High),
            "MEDIUM" => Some(Self::Medium),
            "LOW" => Some(Self::Low),
            _ => None,
        }
    }
}

/// What the judge decided about one article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeVerdict {
    pub is_match: bool,
    pub confidence: Confidence,
    pub reasoning: String,
}

/// Book metadata plus the article excerpt to compare it with.
#[derive(Debug, Clone, Copy)]
pub struct JudgeRequest<'a> {
    pub title: &'a str,
    pub authors: &'a str,
    pub excerpt: &'a str,
    pub excerpt_length: usize,
}

pub trait Judge {
    fn judge(&self, request: &JudgeRequest<'_>) -> Result<JudgeVerdict, JudgeError>;
}

impl<J: Judge + ?Sized> Judge for &J {
    fn judge(&self, request: &JudgeRequest<'_>) -> Result<JudgeVerdict, JudgeError> {
        (**self).judge(request)
    }
}

/// First `max_chars` characters of `text`.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

pub fn build_prompt(request: &JudgeRequest<'_>) -> String {
    format!(
        "Does this Wikipedia article match the work listed below?\n\
         \n\
         WORK:\n\
         - Title: {title}\n\
         - Author(s): {authors}\n\
         \n\
         WIKIPEDIA ARTICLE (first {excerpt_length} chars):\n\
         {excerpt}\n\
         \n\
         Is the Wikipedia article about this work? Ignore edition details (translations, volumes, annotations).\n\
         \n\
         Respond:\n\
         VERDICT: [YES/NO]\n\
         CONFIDENCE: [HIGH/MEDIUM/LOW]\n\
         REASONING: [one very short sentence]\n",
        title = request.title,
        authors = request.authors,
        excerpt_length = request.excerpt_length,
        excerpt = request.excerpt,
    )
}

/// Parses the templated reply. A missing verdict means NO, a missing
/// confidence means MEDIUM.
pub fn parse_verdict(response_text: &str) -> JudgeVerdict {
    let is_match = VERDICT
        .captures(response_text)
        .and_then(|captures| captures.get(1))
        .is_some_and(|token| token.as_str().eq_ignore_ascii_case("YES"));
    let confidence = CONFIDENCE
        .captures(response_text)
        .and_then(|captures| captures.get(1))
        .and_then(|token| Confidence::parse(token.as_str()))
        .unwrap_or(Confidence::Medium);
    let reasoning = REASONING
        .captures(response_text)
        .and_then(|captures| captures.get(1))
        .map(|text| text.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| NO_REASONING.to_string());
    JudgeVerdict {
        is_match,
        confidence,
        reasoning,
    }
}

/// Retries a failing judge, sleeping `delays[n]` after the n-th failure.
pub struct RetryingJudge<J, S> {
    inner: J,
    sleeper: S,
    attempts: usize,
    delays: Vec<Duration>,
}

impl<J: Judge, S: Sleeper> RetryingJudge<J, S> {
    pub fn new(inner: J, sleeper: S) -> Self {
        Self {
            inner,
            sleeper,
            attempts: DEFAULT_JUDGE_ATTEMPTS,
            delays: [5, 15].into_iter().map(Duration::from_secs).collect(),
        }
    }

    pub fn with_schedule(mut self, attempts: usize, delays: Vec<Duration>) -> Self {
        self.attempts = attempts.max(1);
        self.delays = delays;
        self
    }
}

impl<J: Judge, S: Sleeper> Judge for RetryingJudge<J, S> {
    fn judge(&self, request: &JudgeRequest<'_>) -> Result<JudgeVerdict, JudgeError> {
        let mut attempt = 0usize;
        loop {
            match self.inner.judge(request) {
                Ok(verdict) => return Ok(verdict),
                Err(err) if attempt + 1 >= self.attempts => return Err(err),
                Err(err) => {
                    let delay = self
                        .delays
                        .get(attempt)
                        .or(self.delays.last())
                        .copied()
                        .unwrap_or_default();
                    warn!(
                        "Judge attempt {} failed ({}), sleeping {}s",
                        attempt + 1,
                        err,
                        delay.as_secs_f64()
                    );
                    self.sleeper.sleep(delay)?;
                    attempt += 1;
                }
            }
        }
    }
}

/// Judge backed by the Anthropic Messages API.
pub struct AnthropicJudge {
    http_client: ureq::Agent,
    api_key: String,
    model: String,
    max_tokens: usize,
    endpoint: String,
}

impl AnthropicJudge {
    pub fn new(api_key: String, model: String, max_tokens: usize, timeout_secs: u64) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(timeout_secs))
            .build();
        Self {
            http_client,
            api_key,
            model,
            max_tokens,
            endpoint: ANTHROPIC_MESSAGES_URL.to_string(),
        }
    }

    /// Reads the API key from the environment.
    pub fn from_env(
        model: String,
        max_tokens: usize,
        timeout_secs: u64,
    ) -> Result<Self, JudgeError> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(JudgeError::MissingApiKey)?;
        Ok(Self::new(api_key, model, max_tokens, timeout_secs))
    }

    fn request_text(&self, prompt: &str) -> Result<String, JudgeError> {
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };
        let response = match self
            .http_client
            .post(&self.endpoint)
            .set("x-api-key", &self.api_key)
            .set("anthropic-version", ANTHROPIC_VERSION)
            .set("content-type", "application/json")
            .send_json(&body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let body = response
                    .into_string()
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                return Err(JudgeError::Status { status, body });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(JudgeError::Transport(transport.to_string()))
            }
        };
        let parsed: AnthropicResponse = response
            .into_json()
            .map_err(|err| JudgeError::Malformed(err.to_string()))?;
        let text = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicResponseBlock::Text { text } => Some(text),
                AnthropicResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            return Err(JudgeError::Malformed(
                "response missing text content".to_string(),
            ));
        }
        Ok(text)
    }
}

impl Judge for AnthropicJudge {
    fn judge(&self, request: &JudgeRequest<'_>) -> Result<JudgeVerdict, JudgeError> {
        let text = self.request_text(&build_prompt(request))?;
        Ok(parse_verdict(&text))
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::{parse_verdict, Judge, JudgeError, JudgeRequest, JudgeVerdict};

    /// Answers with canned response texts, recording every request title.
    #[derive(Default)]
    pub struct CannedJudge {
        responses: RefCell<VecDeque<Result<String, String>>>,
        pub seen: RefCell<Vec<(String, String, usize)>>,
    }

    impl CannedJudge {
        pub fn new(responses: Vec<Result<&str, &str>>) -> Self {
            Self {
                responses: RefCell::new(
                    responses
                        .into_iter()
                        .map(|response| response.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl Judge for CannedJudge {
        fn judge(&self, request: &JudgeRequest<'_>) -> Result<JudgeVerdict, JudgeError> {
            self.seen.borrow_mut().push((
                request.title.to_string(),
                request.authors.to_string(),
                request.excerpt.chars().count(),
            ));
            match self.responses.borrow_mut().pop_front() {
                Some(Ok(text)) => Ok(parse_verdict(&text)),
                Some(Err(message)) => Err(JudgeError::Transport(message)),
                None => Err(JudgeError::Transport("no canned response".to_string())),
            }
        }
    }
}
