//! Write pacing for the target account.
//!
//! Every create call goes through a [`WritePacer`], a token bucket refilled
//! at a fixed interval. A rate-limit response can push the next permit out
//! with [`WritePacer::defer`].

use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use helpdesk_client::ClientError;

/// Backoff applied when a rate-limit response carries no Retry-After
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Longest hold a single deferral can impose
pub const MAX_DEFER: Duration = Duration::from_secs(60 * 60);

/// Token bucket shared by all writes of a run
#[derive(Debug)]
pub struct WritePacer {
    interval: Duration,
    burst: u32,
    state: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    available: u32,
    last_refill: Instant,
    blocked_until: Option<Instant>,
}

impl WritePacer {
    /// One permit every `interval`, with up to `burst` permits banked
    pub fn new(interval: Duration, burst: u32) -> Self {
        let burst = burst.max(1);
        Self {
            interval,
            burst,
            state: Mutex::new(Bucket {
                available: burst,
                last_refill: Instant::now(),
                blocked_until: None,
            }),
        }
    }

    /// Pacer that never waits, except after [`defer`](Self::defer)
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO, 1)
    }

    /// Wait for a write permit
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.state.lock().await;
                let now = Instant::now();

                match bucket.blocked_until.filter(|until| *until > now) {
                    Some(until) => until - now,
                    None => {
                        bucket.blocked_until = None;
                        if self.interval.is_zero() {
                            return;
                        }
                        self.refill(&mut bucket, now);
                        if bucket.available > 0 {
                            bucket.available -= 1;
                            return;
                        }
                        self.interval
                            .saturating_sub(now.saturating_duration_since(bucket.last_refill))
                    }
                }
            };

            debug!(wait_ms = wait.as_millis() as u64, "Waiting for write permit");
            sleep(wait).await;
        }
    }

    /// Hold every permit back for at least `delay`, capped at [`MAX_DEFER`]
    pub async fn defer(&self, delay: Duration) {
        if delay > MAX_DEFER {
            warn!(
                requested_secs = delay.as_secs(),
                max_secs = MAX_DEFER.as_secs(),
                "Deferral capped"
            );
        }
        let delay = delay.min(MAX_DEFER);
        let mut bucket = self.state.lock().await;
        let until = Instant::now() + delay;
        let until = bucket.blocked_until.map_or(until, |existing| existing.max(until));
        bucket.blocked_until = Some(until);
        debug!(delay_ms = delay.as_millis() as u64, "Writes deferred");
    }

    /// Run one write under the pacer.
    ///
    /// A rate-limited attempt defers the bucket by the reported Retry-After
    /// and is retried up to `retries` times; any other result is returned.
    pub async fn write<T, F, Fut>(&self, retries: u32, mut call: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempt = 0;
        loop {
            self.acquire().await;
            match call().await {
                Err(ClientError::RateLimited { retry_after_secs }) if attempt < retries => {
                    attempt += 1;
                    let delay = retry_after_secs
                        .map(Duration::from_secs)
                        .unwrap_or(DEFAULT_RETRY_AFTER);
                    warn!(
                        attempt,
                        retries,
                        retry_after_secs = delay.as_secs(),
                        "Write rate limited, backing off"
                    );
                    self.defer(delay).await;
                }
                result => return result,
            }
        }
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let earned = elapsed.as_nanos() / self.interval.as_nanos();
        if earned == 0 {
            return;
        }

        let missing = self.burst - bucket.available;
        if earned >= missing as u128 {
            bucket.available = self.burst;
            bucket.last_refill = now;
        } else {
            let earned = earned as u32;
            bucket.available += earned;
            bucket.last_refill += self.interval * earned;
        }
    }
}

impl Default for WritePacer {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_permits_are_spaced_by_interval() {
        let pacer = WritePacer::new(Duration::from_secs(1), 1);
        let start = Instant::now();

        pacer.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(10));

        pacer.acquire().await;
        pacer.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_available_up_front() {
        let pacer = WritePacer::new(Duration::from_secs(1), 3);
        let start = Instant::now();

        for _ in 0..3 {
            pacer.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(10));

        pacer.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_defer_blocks_unlimited_pacer() {
        let pacer = WritePacer::unlimited();
        let start = Instant::now();

        pacer.acquire().await;
        pacer.defer(Duration::from_secs(5)).await;
        pacer.acquire().await;

        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_retries_rate_limited_call() {
        let pacer = WritePacer::unlimited();
        let start = Instant::now();
        let mut calls = 0;

        let result = pacer
            .write(1, || {
                calls += 1;
                let attempt = calls;
                async move {
                    if attempt == 1 {
                        Err(ClientError::RateLimited { retry_after_secs: Some(3) })
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_gives_up_after_retries() {
        let pacer = WritePacer::unlimited();
        let mut calls = 0;

        let result: Result<(), ClientError> = pacer
            .write(2, || {
                calls += 1;
                async { Err(ClientError::RateLimited { retry_after_secs: None }) }
            })
            .await;

        assert!(matches!(result, Err(ClientError::RateLimited { .. })));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_write_does_not_retry_other_errors() {
        let pacer = WritePacer::unlimited();
        let mut calls = 0;

        let result: Result<(), ClientError> = pacer
            .write(3, || {
                calls += 1;
                async { Err(ClientError::NotFound("ticket_fields".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(ClientError::NotFound(_))));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_retry_after_is_capped() {
        let pacer = WritePacer::unlimited();
        let start = Instant::now();

        pacer.defer(Duration::from_secs(u64::MAX)).await;
        pacer.acquire().await;

        assert!(start.elapsed() >= MAX_DEFER);
        assert!(start.elapsed() < MAX_DEFER + Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shorter_defer_does_not_shorten_block() {
        let pacer = WritePacer::unlimited();
        let start = Instant::now();

        pacer.defer(Duration::from_secs(10)).await;
        pacer.defer(Duration::from_secs(1)).await;
        pacer.acquire().await;

        assert!(start.elapsed() >= Duration::from_secs(10));
    }
}
