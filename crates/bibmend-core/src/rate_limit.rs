//! Aggregate request pacing with an adaptive governor instance.
//!
//! Every outbound API call waits for the pacer's permit via
//! `until_ready()`, which guarantees the configured minimum spacing
//! across all workers. On 429 the governor is swapped to a slower rate;
//! the original rate is restored after a quiet period.

use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::FetchError;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Cooldown after which a slowed pacer returns to its base rate.
const DECAY_AFTER: Duration = Duration::from_secs(60);

/// Shared pacer for all API traffic.
///
/// When a 429 is received, the governor is atomically swapped to a slower
/// rate (factor doubles, capped at 16x). After [`DECAY_AFTER`] with no
/// 429s, the base rate is restored.
pub struct RequestPacer {
    limiter: ArcSwap<DirectLimiter>,
    base_period: Duration,
    current_factor: AtomicU32,
    last_429: Mutex<Option<Instant>>,
}

impl RequestPacer {
    /// Create a pacer with the given period between requests.
    pub fn new(period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let quota = Quota::with_period(period).expect("period is nonzero");
        Self {
            limiter: ArcSwap::from(Arc::new(DirectLimiter::direct(quota))),
            base_period: period,
            current_factor: AtomicU32::new(1),
            last_429: Mutex::new(None),
        }
    }

    /// Create a pacer spacing requests at least `ms` milliseconds apart.
    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Wait until the pacer allows a request.
    ///
    /// Blocks the calling future until a token is available, which spaces
    /// requests at the configured rate across all concurrent callers.
    pub async fn acquire(&self) {
        self.try_decay();
        let limiter = self.limiter.load();
        limiter.until_ready().await;
    }

    /// Called when a 429 is received. Doubles the slowdown factor and
    /// swaps the governor.
    pub fn on_rate_limited(&self) {
        if let Ok(mut last) = self.last_429.lock() {
            *last = Some(Instant::now());
        }

        let _ = self
            .current_factor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| {
                Some((f * 2).min(16))
            });

        let factor = self.current_factor.load(Ordering::SeqCst);
        if let Some(scaled) = self.base_period.checked_mul(factor)
            && let Some(quota) = Quota::with_period(scaled)
        {
            self.limiter.store(Arc::new(DirectLimiter::direct(quota)));
        }
    }

    /// Restore the base rate once the quiet period has elapsed.
    fn try_decay(&self) {
        let should_restore = self
            .last_429
            .lock()
            .ok()
            .and_then(|last| last.map(|t| t.elapsed() >= DECAY_AFTER))
            .unwrap_or(false);

        if should_restore && self.current_factor.load(Ordering::SeqCst) > 1 {
            self.current_factor.store(1, Ordering::SeqCst);
            let quota = Quota::with_period(self.base_period).expect("base period is nonzero");
            self.limiter.store(Arc::new(DirectLimiter::direct(quota)));
        }
    }

    /// Effective period between requests at the current slowdown factor.
    pub fn current_period(&self) -> Duration {
        let factor = self.current_factor.load(Ordering::SeqCst);
        self.base_period
            .checked_mul(factor)
            .unwrap_or(self.base_period)
    }

    #[cfg(test)]
    fn factor(&self) -> u32 {
        self.current_factor.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    fn backdate_last_429(&self, ago: Duration) {
        if let Ok(mut last) = self.last_429.lock() {
            *last = Some(Instant::now() - ago);
        }
    }
}

/// Parse a Retry-After header value (seconds or HTTP-date).
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    // HTTP-date form gets a conservative fixed wait
    if value.contains(',') || value.contains("GMT") {
        return Some(Duration::from_secs(5));
    }
    None
}

/// Run one paced API call with 429 handling.
///
/// 1. Acquires the pacer (waits for this request's turn)
/// 2. Runs `call()`
/// 3. On 429: slows the pacer, honors Retry-After (capped at `timeout`,
///    2s when absent), re-acquires, and retries exactly once
/// 4. Anything else is returned as-is
pub async fn paced<T, F, Fut>(
    pacer: &RequestPacer,
    timeout: Duration,
    call: F,
) -> Result<T, FetchError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    pacer.acquire().await;

    match call().await {
        Err(FetchError::RateLimited { retry_after }) => {
            pacer.on_rate_limited();

            let wait = retry_after.unwrap_or(Duration::from_secs(2)).min(timeout);
            tracing::info!(
                wait_secs = wait.as_secs_f64(),
                "429 rate limited, waiting then retrying"
            );
            tokio::time::sleep(wait).await;

            pacer.acquire().await;
            call().await
        }
        other => other,
    }
}
