//! Worker pool that fans entries out, preserves input order, and
//! aggregates run statistics.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::fetch::{self, Fetched};
use crate::source::MetadataSource;
use crate::{
    Config, Disposition, Entry, EntryOutcome, FetchError, FixReport, MatchResult, ProgressEvent,
    RunStats, matching, merge,
};

/// An entry repair job submitted to the pool.
pub struct EntryJob {
    pub entry: Entry,
    pub index: usize,
    pub total: usize,
    pub result_tx: oneshot::Sender<EntryOutcome>,
    pub progress: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
}

/// A pool of worker tasks processing entry repair jobs.
///
/// Submit jobs via [`submit()`](FixPool::submit); each job's result
/// arrives on its oneshot channel. Entries are independent units of
/// work — the only shared state is the pacer inside [`Config`].
pub struct FixPool {
    job_tx: async_channel::Sender<EntryJob>,
    pool_handle: JoinHandle<()>,
}

impl FixPool {
    pub fn new(
        source: Arc<dyn MetadataSource>,
        config: Arc<Config>,
        cancel: CancellationToken,
    ) -> Self {
        let (job_tx, job_rx) = async_channel::unbounded::<EntryJob>();
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let num_workers = config.num_workers.max(1);
        let pool_handle = tokio::spawn(async move {
            let mut handles = Vec::with_capacity(num_workers);
            for _ in 0..num_workers {
                handles.push(tokio::spawn(worker_loop(
                    job_rx.clone(),
                    source.clone(),
                    config.clone(),
                    client.clone(),
                    cancel.clone(),
                )));
            }
            drop(job_rx);

            for h in handles {
                let _ = h.await;
            }
        });

        Self {
            job_tx,
            pool_handle,
        }
    }

    pub async fn submit(&self, job: EntryJob) {
        let _ = self.job_tx.send(job).await;
    }

    /// Close the queue and wait for all workers to drain.
    pub async fn shutdown(self) {
        self.job_tx.close();
        let _ = self.pool_handle.await;
    }
}

/// Worker loop: pull a job, run fetch → score → merge, send the outcome.
async fn worker_loop(
    job_rx: async_channel::Receiver<EntryJob>,
    source: Arc<dyn MetadataSource>,
    config: Arc<Config>,
    client: reqwest::Client,
    cancel: CancellationToken,
) {
    while let Ok(job) = job_rx.recv().await {
        let EntryJob {
            entry,
            index,
            total,
            result_tx,
            progress,
        } = job;

        // After cancellation, flush remaining jobs as pass-through so
        // completed work is retained and the output stays complete.
        if cancel.is_cancelled() {
            let _ = result_tx.send(EntryOutcome {
                entry,
                disposition: Disposition::Unmatched,
            });
            continue;
        }

        progress(ProgressEvent::Checking {
            index,
            total,
            key: entry.key.clone(),
        });

        let outcome = process_entry(&entry, source.as_ref(), &client, &config).await;

        progress(ProgressEvent::Result {
            index,
            total,
            outcome: Box::new(outcome.clone()),
        });
        let _ = result_tx.send(outcome);
    }
}

/// Run one entry through fetch → score → merge.
///
/// Every failure is absorbed here: the worst case is the original entry
/// passing through with an error disposition.
async fn process_entry(
    entry: &Entry,
    source: &dyn MetadataSource,
    client: &reqwest::Client,
    config: &Config,
) -> EntryOutcome {
    let pass_through = |disposition: Disposition| EntryOutcome {
        entry: entry.clone(),
        disposition,
    };

    let fetched = match fetch::fetch_candidates(entry, source, client, config).await {
        Ok(fetched) => fetched,
        Err(FetchError::NotFound) => return pass_through(Disposition::Unmatched),
        Err(err) => {
            tracing::warn!(entry = %entry.key, error = %err, "fetch failed");
            return pass_through(Disposition::Errored {
                reason: err.to_string(),
            });
        }
    };

    let (candidates, strategy, trusted) = match fetched {
        Fetched::NoSearchableFields => {
            tracing::debug!(entry = %entry.key, "nothing to search on");
            return pass_through(Disposition::Unmatched);
        }
        Fetched::Candidates {
            candidates,
            strategy,
            trusted,
        } => (candidates, strategy, trusted),
    };

    match matching::score_candidates(
        entry,
        candidates,
        trusted,
        config.accept_threshold,
        config.journal_threshold,
    ) {
        MatchResult::Matched { candidate, score } => EntryOutcome {
            entry: merge::merge(entry, &candidate, &config.denylist),
            disposition: Disposition::Matched {
                score,
                via: strategy,
            },
        },
        MatchResult::NoMatch => pass_through(Disposition::Unmatched),
        MatchResult::Error(err) => pass_through(Disposition::Errored {
            reason: err.to_string(),
        }),
    }
}

/// Run the full pipeline over `entries` with an injected source.
///
/// Output order equals input order regardless of completion order; every
/// input entry has exactly one outcome.
pub async fn fix_entries_with_source(
    entries: Vec<Entry>,
    source: Arc<dyn MetadataSource>,
    config: Config,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> FixReport {
    let total = entries.len();
    if total == 0 {
        return FixReport {
            outcomes: vec![],
            stats: RunStats::default(),
        };
    }

    let config = Arc::new(config);
    let progress = Arc::new(progress);
    let pool = FixPool::new(source, config.clone(), cancel.clone());

    let mut receivers = Vec::with_capacity(total);
    for (index, entry) in entries.iter().enumerate() {
        let (result_tx, result_rx) = oneshot::channel();
        pool.submit(EntryJob {
            entry: entry.clone(),
            index,
            total,
            result_tx,
            progress: progress.clone(),
        })
        .await;
        receivers.push((index, result_rx));
    }

    // Index-addressed collection: written once per index, read in order.
    let mut slots: Vec<Option<EntryOutcome>> = vec![None; total];
    for (index, rx) in receivers {
        if let Ok(outcome) = rx.await {
            slots[index] = Some(outcome);
        }
    }

    pool.shutdown().await;

    let outcomes: Vec<EntryOutcome> = slots
        .into_iter()
        .zip(entries)
        .map(|(slot, original)| {
            slot.unwrap_or(EntryOutcome {
                entry: original,
                disposition: Disposition::Unmatched,
            })
        })
        .collect();

    let mut stats = RunStats {
        total,
        ..RunStats::default()
    };
    for outcome in &outcomes {
        match outcome.disposition {
            Disposition::Matched { .. } => stats.matched += 1,
            Disposition::Unmatched => stats.unmatched += 1,
            Disposition::Errored { .. } => stats.errored += 1,
        }
    }

    tracing::info!(
        total = stats.total,
        matched = stats.matched,
        unmatched = stats.unmatched,
        errored = stats.errored,
        "run complete"
    );

    FixReport { outcomes, stats }
}
