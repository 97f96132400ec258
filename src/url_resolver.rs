//! Picks the article URL for a book in a desired language.
//!
//! When a book has several candidates and none carries the desired language the
//! first listed candidate is returned. That choice is lossy but deterministic,
//! and the ledgers key off it, so it is kept as-is.

use log::warn;

use crate::source_links::LinkIndex;

/// Returned for books that have no candidates at all.
pub const URL_NOT_FOUND: &str = "URL_NOT_FOUND";

pub fn resolve(index: &LinkIndex, book_id: &str, desired_lang: &str) -> String {
    let Some(candidates) = index.candidates(book_id) else {
        return URL_NOT_FOUND.to_string();
    };
    let Some(first) = candidates.first() else {
        return URL_NOT_FOUND.to_string();
    };
    if candidates.len() == 1 {
        return first.url.clone();
    }
    if let Some(matching) = candidates
        .iter()
        .find(|candidate| candidate.lang == desired_lang)
    {
        return matching.url.clone();
    }
    warn!(
        "No language match for book_id={}, lang={}. Using first URL.",
        book_id, desired_lang
    );
    first.url.clone()
}

#[cfg(test)]
mod tests {
    use super::{resolve, URL_NOT_FOUND};
    use crate::source_links::{parse_records, LinkIndex};

    fn index(text: &str) -> LinkIndex {
        LinkIndex::from_records(&parse_records(text))
    }

    #[test]
    fn test_resolve_unknown_book_returns_sentinel() {
        let index = index("1,https://en.wikipedia.org/wiki/A\n");
        assert_eq!(resolve(&index, "2", "en"), URL_NOT_FOUND);
    }

    #[test]
    fn test_resolve_single_candidate_ignores_language() {
        let index = index("1,https://fr.wikipedia.org/wiki/A\n");
        for lang in ["en", "fr", "de", "unknown"] {
            assert_eq!(resolve(&index, "1", lang), "https://fr.wikipedia.org/wiki/A");
        }
    }

    #[test]
    fn test_resolve_prefers_language_match() {
        let index = index(
            "1,https://en.wikipedia.org/wiki/A https://de.wikipedia.org/wiki/B https://de.wikipedia.org/wiki/C\n",
        );
        assert_eq!(resolve(&index, "1", "de"), "https://de.wikipedia.org/wiki/B");
        assert_eq!(resolve(&index, "1", "en"), "https://en.wikipedia.org/wiki/A");
    }

    #[test]
    fn test_resolve_without_match_falls_back_to_first_candidate() {
        let index = index("1,https://es.wikipedia.org/wiki/A https://it.wikipedia.org/wiki/B\n");
        assert_eq!(resolve(&index, "1", "ja"), "https://es.wikipedia.org/wiki/A");
    }
}
