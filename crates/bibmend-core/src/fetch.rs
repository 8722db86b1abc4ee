//! Candidate retrieval: strategy selection and paced API calls.

use crate::rate_limit::paced;
use crate::source::{MetadataSource, SearchQuery};
use crate::{Candidate, Config, Entry, FetchError};

/// Which search path produced the candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    Doi,
    Title,
    AuthorTitle,
}

impl std::fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchStrategy::Doi => write!(f, "doi lookup"),
            SearchStrategy::Title => write!(f, "title search"),
            SearchStrategy::AuthorTitle => write!(f, "author+title search"),
        }
    }
}

/// Result of running the strategy ladder for one entry.
#[derive(Debug, Clone)]
pub enum Fetched {
    /// At least one candidate. `trusted` marks a direct DOI hit that the
    /// scorer accepts without thresholding.
    Candidates {
        candidates: Vec<Candidate>,
        strategy: SearchStrategy,
        trusted: bool,
    },
    /// The entry has neither title nor authors; no network call was made.
    NoSearchableFields,
}

/// Rows requested on the narrower author+title fallback search.
const AUTHOR_TITLE_ROWS: usize = 3;

/// Strip URL scheme prefixes from a DOI field value.
pub fn clean_doi(doi: &str) -> &str {
    let doi = doi.trim();
    for prefix in [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi:",
    ] {
        if let Some(rest) = doi.strip_prefix(prefix) {
            return rest;
        }
    }
    doi
}

/// Family-name terms for the author search, from the first two authors.
///
/// BibTeX author values are `A and B and C`, each name either
/// `Family, Given` or `Given Family`.
fn author_query_terms(author_field: &str) -> Vec<String> {
    author_field
        .split(" and ")
        .take(2)
        .filter_map(|name| {
            let name = name.trim();
            if name.is_empty() || name == "others" {
                return None;
            }
            let family = match name.split_once(',') {
                Some((family, _)) => family.trim(),
                None => name.rsplit(' ').next().unwrap_or(name).trim(),
            };
            (!family.is_empty()).then(|| family.to_string())
        })
        .collect()
}

/// Fetch candidates for one entry, trying strategies in priority order and
/// stopping at the first that yields at least one candidate:
///
/// 1. DOI lookup (trusted hit; a 404 falls through — a bad DOI in the
///    source file is exactly what the tool exists to repair)
/// 2. Title search
/// 3. Author+title search
/// 4. Nothing searchable: no network call at all
///
/// All strategies exhausted with zero candidates is `Err(NotFound)`.
/// Every call goes through the shared pacer.
pub async fn fetch_candidates(
    entry: &Entry,
    source: &dyn MetadataSource,
    client: &reqwest::Client,
    config: &Config,
) -> Result<Fetched, FetchError> {
    let timeout = config.timeout();
    let mut searched = false;

    if let Some(doi) = entry.get("doi").filter(|d| !d.trim().is_empty()) {
        let doi = clean_doi(doi);
        tracing::debug!(entry = %entry.key, doi, "doi lookup");
        searched = true;

        let hit = paced(&config.pacer, timeout, || {
            source.lookup_doi(doi, client, timeout)
        })
        .await?;

        if let Some(candidate) = hit {
            return Ok(Fetched::Candidates {
                candidates: vec![candidate],
                strategy: SearchStrategy::Doi,
                trusted: true,
            });
        }
        tracing::debug!(entry = %entry.key, doi, "doi not registered, falling back to search");
    }

    if let Some(title) = entry.get("title").filter(|t| !t.trim().is_empty()) {
        tracing::debug!(entry = %entry.key, "title search");
        searched = true;

        let query = SearchQuery::title_only(title, config.max_candidates);
        let candidates = paced(&config.pacer, timeout, || {
            source.search(&query, client, timeout)
        })
        .await?;

        if !candidates.is_empty() {
            return Ok(Fetched::Candidates {
                candidates,
                strategy: SearchStrategy::Title,
                trusted: false,
            });
        }

        let authors = entry
            .get("author")
            .map(author_query_terms)
            .unwrap_or_default();
        if !authors.is_empty() {
            tracing::debug!(entry = %entry.key, "author+title search");
            let query = SearchQuery::with_authors(title, authors, AUTHOR_TITLE_ROWS);
            let candidates = paced(&config.pacer, timeout, || {
                source.search(&query, client, timeout)
            })
            .await?;

            if !candidates.is_empty() {
                return Ok(Fetched::Candidates {
                    candidates,
                    strategy: SearchStrategy::AuthorTitle,
                    trusted: false,
                });
            }
        }
    }

    if searched {
        Err(FetchError::NotFound)
    } else {
        Ok(Fetched::NoSearchableFields)
    }
}
