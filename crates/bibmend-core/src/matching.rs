use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::fields::clean_title;
use crate::{Candidate, Entry, FetchError, MatchResult};

/// Normalize a title for comparison.
///
/// Steps (order matters):
/// 1. Clean markup and HTML entities
/// 2. Unicode NFKD normalization (decomposes accents)
/// 3. Strip to ASCII
/// 4. Replace every non-alphanumeric run with a single space
/// 5. Lowercase
///
/// Unlike the raw cleaning in [`clean_title`], the result keeps word
/// boundaries so callers can compare token sets.
pub fn normalize_title(title: &str) -> String {
    let cleaned = clean_title(title);
    let ascii: String = cleaned.nfkd().filter(|c| c.is_ascii()).collect();

    static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]+").unwrap());
    NON_ALNUM
        .replace_all(&ascii, " ")
        .trim()
        .to_ascii_lowercase()
}

/// Similarity between two titles, in `[0, 1]`.
///
/// Contract: symmetric, deterministic for fixed inputs, token-order
/// insensitive (both sides are normalized and token-sorted before the
/// underlying edit-distance ratio is computed). Empty input on either
/// side scores 0.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let sorted_tokens = |t: &str| {
        let norm = normalize_title(t);
        let mut tokens: Vec<&str> = norm.split_whitespace().collect();
        tokens.sort_unstable();
        tokens.join(" ")
    };

    let a = sorted_tokens(a);
    let b = sorted_tokens(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    rapidfuzz::fuzz::ratio(a.chars(), b.chars())
}

/// Whether the candidate's container passes the journal gate.
///
/// When the entry names a journal, a candidate whose container is missing
/// or dissimilar is rejected outright. Entries without a journal accept
/// any container.
fn journal_gate(entry_journal: Option<&str>, candidate: &Candidate, threshold: f64) -> bool {
    let Some(entry_journal) = entry_journal.filter(|j| !j.trim().is_empty()) else {
        return true;
    };
    match candidate.container.as_deref() {
        Some(container) => title_similarity(entry_journal, container) >= threshold,
        None => false,
    }
}

/// Select the best candidate for an entry.
///
/// `trusted` marks a direct identifier lookup: the single candidate is
/// accepted with score 1.0, bypassing the journal gate and the title
/// threshold. Otherwise each candidate is gated on container agreement,
/// scored on title similarity, and the best score wins if it reaches
/// `accept_threshold`. Ties keep the earliest candidate (the API's own
/// relevance ranking).
pub fn score_candidates(
    entry: &Entry,
    candidates: Vec<Candidate>,
    trusted: bool,
    accept_threshold: f64,
    journal_threshold: f64,
) -> MatchResult {
    if trusted {
        return match candidates.into_iter().next() {
            Some(candidate) => MatchResult::Matched {
                candidate,
                score: 1.0,
            },
            None => MatchResult::Error(FetchError::NotFound),
        };
    }

    let entry_title = entry.get("title").unwrap_or_default();
    let entry_journal = entry.get("journal");

    let mut best: Option<(Candidate, f64)> = None;
    for candidate in candidates {
        if !journal_gate(entry_journal, &candidate, journal_threshold) {
            tracing::debug!(
                entry = %entry.key,
                container = candidate.container.as_deref().unwrap_or("-"),
                "candidate rejected by journal gate"
            );
            continue;
        }

        let score = candidate
            .title
            .as_deref()
            .map(|t| title_similarity(entry_title, t))
            .unwrap_or(0.0);

        // Strictly greater: equal scores keep the earlier candidate
        if best.as_ref().is_none_or(|(_, s)| score > *s) {
            best = Some((candidate, score));
        }
    }

    match best {
        Some((candidate, score)) if score >= accept_threshold => {
            MatchResult::Matched { candidate, score }
        }
        _ => MatchResult::NoMatch,
    }
}
