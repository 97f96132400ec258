//! Wikipedia URL parsing: language subdomain and decoded page title.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Language tag used when the host subdomain does not look like a language code.
pub const UNKNOWN_LANGUAGE: &str = "unknown";

static HOST_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://([^./]+)\.wikipedia\.org").expect("subdomain pattern should compile")
});
static STRICT_LANGUAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2,3}$").expect("strict pattern should compile"));
static EXTENDED_LANGUAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z-]{2,7}$").expect("extended pattern should compile"));

/// Which subdomains count as a language tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LanguagePattern {
    /// Two or three lowercase letters (`en`, `fr`, `ang`).
    #[default]
    Strict,
    /// Lowercase letters and hyphens, up to seven characters (`zh-yue`).
    Extended,
}

impl LanguagePattern {
    fn matches(self, subdomain: &str) -> bool {
        match self {
            Self::Strict => STRICT_LANGUAGE.is_match(subdomain),
            Self::Extended => EXTENDED_LANGUAGE.is_match(subdomain),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Could not extract page title")]
pub struct TitleExtractionError;

/// Returns the language subdomain of `url`, or `"unknown"`.
pub fn extract_language(url: &str, pattern: LanguagePattern) -> String {
    HOST_SUBDOMAIN
        .captures(url)
        .and_then(|captures| captures.get(1))
        .map(|subdomain| subdomain.as_str())
        .filter(|subdomain| pattern.matches(subdomain))
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string())
}

/// Returns the percent-decoded page title following the first `/wiki/`.
pub fn extract_title(url: &str) -> Result<String, TitleExtractionError> {
    let trimmed = url.trim();
    let Some((_, raw_title)) = trimmed.split_once("/wiki/") else {
        return Err(TitleExtractionError);
    };
    if raw_title.is_empty() {
        return Err(TitleExtractionError);
    }
    let title = match urlencoding::decode(raw_title) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(raw_title.as_bytes()))
            .into_owned(),
    };
    Ok(title)
}
