//! Mock metadata source for testing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{MetadataSource, SearchQuery};
use crate::{Candidate, FetchError};

type LookupResponse = Result<Option<Candidate>, FetchError>;
type SearchResponse = Result<Vec<Candidate>, FetchError>;

/// A hand-rolled mock implementing [`MetadataSource`] for tests.
///
/// Supports:
/// - A fixed response per operation, **or** a sequence of responses
///   (one per call, repeating the last when exhausted).
/// - Optional per-call latency.
/// - Call counting and query capture for assertions.
pub struct MockSource {
    name: &'static str,
    lookup_responses: Mutex<Vec<LookupResponse>>,
    lookup_fallback: LookupResponse,
    search_responses: Mutex<Vec<SearchResponse>>,
    search_fallback: SearchResponse,
    delay: Option<Duration>,
    lookup_calls: AtomicUsize,
    search_calls: AtomicUsize,
    seen_queries: Mutex<Vec<SearchQuery>>,
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSource {
    /// A mock that finds nothing.
    pub fn new() -> Self {
        Self {
            name: "MockSource",
            lookup_responses: Mutex::new(Vec::new()),
            lookup_fallback: Ok(None),
            search_responses: Mutex::new(Vec::new()),
            search_fallback: Ok(vec![]),
            delay: None,
            lookup_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
            seen_queries: Mutex::new(Vec::new()),
        }
    }

    /// Every DOI lookup returns this response.
    pub fn with_lookup(mut self, response: LookupResponse) -> Self {
        self.lookup_fallback = response;
        self
    }

    /// Every search returns this response.
    pub fn with_search(mut self, response: SearchResponse) -> Self {
        self.search_fallback = response;
        self
    }

    /// Searches return these responses in order, repeating the last.
    pub fn with_search_sequence(mut self, mut responses: Vec<SearchResponse>) -> Self {
        assert!(!responses.is_empty(), "sequence needs at least one response");
        self.search_fallback = responses.last().cloned().unwrap();
        responses.reverse();
        self.search_responses = Mutex::new(responses);
        self
    }

    /// Simulated latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.lookup_calls() + self.search_calls()
    }

    /// Queries captured from `search()` calls, in call order.
    pub fn seen_queries(&self) -> Vec<SearchQuery> {
        self.seen_queries.lock().unwrap().clone()
    }

    fn next_search_response(&self) -> SearchResponse {
        let mut seq = self.search_responses.lock().unwrap();
        seq.pop().unwrap_or_else(|| self.search_fallback.clone())
    }

    fn next_lookup_response(&self) -> LookupResponse {
        let mut seq = self.lookup_responses.lock().unwrap();
        seq.pop().unwrap_or_else(|| self.lookup_fallback.clone())
    }
}

impl MetadataSource for MockSource {
    fn name(&self) -> &str {
        self.name
    }

    fn lookup_doi<'a>(
        &'a self,
        _doi: &'a str,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = LookupResponse> + Send + 'a>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        let response = self.next_lookup_response();
        let delay = self.delay;

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            response
        })
    }

    fn search<'a>(
        &'a self,
        query: &'a SearchQuery,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = SearchResponse> + Send + 'a>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_queries.lock().unwrap().push(query.clone());
        let response = self.next_search_response();
        let delay = self.delay;

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            response
        })
    }
}
