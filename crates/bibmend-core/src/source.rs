//! Metadata source trait and implementations.

pub mod crossref;
pub mod mock;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::{Candidate, FetchError};

/// A bibliographic search request against a metadata source.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub title: String,
    /// Author family names to constrain the search; empty for title-only.
    pub authors: Vec<String>,
    /// Maximum candidates to return.
    pub rows: usize,
}

impl SearchQuery {
    pub fn title_only(title: impl Into<String>, rows: usize) -> Self {
        Self {
            title: title.into(),
            authors: Vec::new(),
            rows,
        }
    }

    pub fn with_authors(title: impl Into<String>, authors: Vec<String>, rows: usize) -> Self {
        Self {
            title: title.into(),
            authors,
            rows,
        }
    }
}

/// A metadata service exposing identifier lookup and bibliographic search.
pub trait MetadataSource: Send + Sync {
    /// The canonical name of this source (e.g., "CrossRef").
    fn name(&self) -> &str;

    /// Look up a record by DOI. `Ok(None)` means the identifier resolved
    /// to nothing (the caller may fall back to searching).
    fn lookup_doi<'a>(
        &'a self,
        doi: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Candidate>, FetchError>> + Send + 'a>>;

    /// Run a bibliographic search, returning candidates in the source's
    /// relevance order.
    fn search<'a>(
        &'a self,
        query: &'a SearchQuery,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Candidate>, FetchError>> + Send + 'a>>;
}
