use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod config_file;
pub mod fetch;
pub mod fields;
pub mod matching;
pub mod merge;
pub mod pipeline;
pub mod rate_limit;
pub mod source;

// Re-export for convenience
pub use fetch::SearchStrategy;
pub use fields::{DEFAULT_DENYLIST, FIELD_ORDER};
pub use rate_limit::RequestPacer;
pub use source::{MetadataSource, SearchQuery, crossref::CrossRef};

/// One bibliographic record from the input file.
///
/// Field names are held in canonical (lowercase) form and looked up
/// case-insensitively; insertion order is preserved. The citation key is
/// kept verbatim and never modified by any transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub entry_type: String,
    fields: Vec<(String, String)>,
}

impl Entry {
    pub fn new(key: impl Into<String>, entry_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            entry_type: fields::canonical(&entry_type.into()),
            fields: Vec::new(),
        }
    }

    /// Look up a field value by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = fields::canonical(name);
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set a field, replacing an existing value in place or appending.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let name = fields::canonical(name);
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Remove a field, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let name = fields::canonical(name);
        let idx = self.fields.iter().position(|(n, _)| *n == name)?;
        Some(self.fields.remove(idx).1)
    }

    /// Iterate `(name, value)` pairs in stored order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| !v.trim().is_empty())
    }
}

/// A publication record returned by the metadata API, normalized to the
/// entry field set. Lives only while one entry is being matched.
///
/// Authors are `Family, Given` in the API's order. `container` is the
/// journal or proceedings/book title depending on `entry_type`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    pub entry_type: String,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub container: Option<String>,
    pub year: Option<String>,
    pub month: Option<String>,
    pub volume: Option<String>,
    pub number: Option<String>,
    pub pages: Option<String>,
    pub doi: Option<String>,
    pub publisher: Option<String>,
    pub isbn: Option<String>,
    pub issn: Option<String>,
    pub url: Option<String>,
}

impl Candidate {
    /// Whether the container names a proceedings or book part rather
    /// than a journal. Decides which BibTeX field receives it on merge.
    pub fn container_is_booktitle(&self) -> bool {
        matches!(
            self.entry_type.as_str(),
            "inproceedings" | "inbook" | "incollection"
        )
    }

    /// The candidate's fields as `(bibtex field name, value)` pairs, the
    /// shape the merger consumes.
    pub fn bib_fields(&self) -> Vec<(String, String)> {
        let container_field = if self.container_is_booktitle() {
            "booktitle"
        } else {
            "journal"
        };
        let author = if self.authors.is_empty() {
            None
        } else {
            Some(self.authors.join(" and "))
        };

        let pairs: [(&str, Option<&str>); 13] = [
            ("title", self.title.as_deref()),
            ("author", author.as_deref()),
            (container_field, self.container.as_deref()),
            ("year", self.year.as_deref()),
            ("month", self.month.as_deref()),
            ("volume", self.volume.as_deref()),
            ("number", self.number.as_deref()),
            ("pages", self.pages.as_deref()),
            ("doi", self.doi.as_deref()),
            ("publisher", self.publisher.as_deref()),
            ("isbn", self.isbn.as_deref()),
            ("issn", self.issn.as_deref()),
            ("url", self.url.as_deref()),
        ];

        pairs
            .into_iter()
            .filter_map(|(name, value)| {
                let value = value.map(str::trim).filter(|v| !v.is_empty())?;
                Some((name.to_string(), value.to_string()))
            })
            .collect()
    }
}

/// Per-entry failure classification. None of these abort the run.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("rate limited (429)")]
    RateLimited { retry_after: Option<Duration> },
    #[error("no results")]
    NotFound,
    #[error("malformed response: {0}")]
    Parse(String),
}

/// Outcome of matching one entry against the candidate list.
#[derive(Debug, Clone)]
pub enum MatchResult {
    Matched { candidate: Candidate, score: f64 },
    NoMatch,
    Error(FetchError),
}

/// How an entry left the pipeline. Diagnostic detail stays here; it is
/// never written into the emitted fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Matched { score: f64, via: SearchStrategy },
    Unmatched,
    Errored { reason: String },
}

/// Final per-entry result: the entry to emit (merged on a match,
/// otherwise the original, byte-identical) and how it got there.
#[derive(Debug, Clone)]
pub struct EntryOutcome {
    pub entry: Entry,
    pub disposition: Disposition,
}

/// Summary counters for a complete run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub errored: usize,
}

/// The full result of a run: outcomes in input order plus counters.
#[derive(Debug, Clone)]
pub struct FixReport {
    pub outcomes: Vec<EntryOutcome>,
    pub stats: RunStats,
}

/// Progress events emitted while the pipeline runs.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Checking {
        index: usize,
        total: usize,
        key: String,
    },
    Result {
        index: usize,
        total: usize,
        outcome: Box<EntryOutcome>,
    },
}

/// Configuration consumed by the pipeline. Owned by the CLI layer,
/// passed in as a plain options struct.
#[derive(Clone)]
pub struct Config {
    /// Contact e-mail sent to the API (polite-pool routing only).
    pub mailto: Option<String>,
    pub num_workers: usize,
    /// Minimum spacing between outbound requests, in milliseconds.
    pub rate_limit_ms: u64,
    /// Title similarity required to accept a search match.
    pub accept_threshold: f64,
    /// Container similarity required to pass the journal gate.
    pub journal_threshold: f64,
    /// Candidates requested per title search.
    pub max_candidates: usize,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Fields stripped from merged entries.
    pub denylist: Vec<String>,
    pub pacer: Arc<RequestPacer>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("mailto", &self.mailto.as_ref().map(|_| "***"))
            .field("num_workers", &self.num_workers)
            .field("rate_limit_ms", &self.rate_limit_ms)
            .field("accept_threshold", &self.accept_threshold)
            .field("journal_threshold", &self.journal_threshold)
            .field("max_candidates", &self.max_candidates)
            .field("timeout_secs", &self.timeout_secs)
            .field("denylist", &self.denylist)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mailto: None,
            num_workers: 6,
            rate_limit_ms: 100,
            accept_threshold: 0.80,
            journal_threshold: 0.80,
            max_candidates: 5,
            timeout_secs: 10,
            denylist: DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect(),
            pacer: Arc::new(RequestPacer::from_millis(100)),
        }
    }
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Repair a list of entries against the CrossRef API.
///
/// Entries are fanned out across a bounded worker pool; results come back
/// in input order. Per-entry failures become pass-through outcomes and
/// never abort the run. Cancellation stops new work; entries not yet
/// processed pass through unchanged.
pub async fn fix_entries(
    entries: Vec<Entry>,
    config: Config,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> FixReport {
    let source = Arc::new(CrossRef::new(config.mailto.clone()));
    pipeline::fix_entries_with_source(entries, source, config, progress, cancel).await
}
