//! Rate gate guarding the remote workspace API
//!
//! A fixed-window limiter shared by every caller of one remote account, plus
//! exponential backoff for requests the remote answers with a retryable
//! error. Callers wait instead of failing until the attempt budget runs out.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::remote::RemoteError;

/// Limits and backoff parameters for a [`RateGate`]
#[derive(Debug, Clone, PartialEq)]
pub struct GateConfig {
    /// Requests admitted per window
    pub limit: u32,
    pub window: Duration,
    /// Waits (for `acquire`) or attempts (for `call`) before giving up
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub factor: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            limit: 3,
            window: Duration::from_secs(1),
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            factor: 2.0,
        }
    }
}

impl GateConfig {
    /// Minimal delays for tests
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            limit: 100,
            window: Duration::from_millis(10),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
            factor: 2.0,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("Rate gate exhausted after {attempts} waits (retry after {retry_after:?})")]
    Exhausted { attempts: u32, retry_after: Duration },
}

#[derive(Clone)]
pub struct RateGate {
    state: Arc<Mutex<RateWindow>>,
    config: GateConfig,
    metrics: Arc<GateMetrics>,
}

#[derive(Default)]
struct GateMetrics {
    allowed: AtomicU64,
    throttled: AtomicU64,
    backoffs: AtomicU64,
    exhausted: AtomicU64,
}

/// Cumulative gate counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GateStats {
    pub allowed: u64,
    pub throttled: u64,
    pub backoffs: u64,
    pub exhausted: u64,
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: Instant,
    count: u32,
}

impl RateGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(RateWindow {
                started_at: Instant::now(),
                count: 0,
            })),
            config,
            metrics: Arc::new(GateMetrics::default()),
        }
    }

    pub const fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Wait for a request slot.
    ///
    /// Returns immediately while the current window has capacity, otherwise
    /// sleeps until the window rolls over, at most `max_attempts` times.
    pub async fn acquire(&self) -> Result<(), GateError> {
        let mut waits = 0;
        loop {
            let retry_after = {
                let now = Instant::now();
                let mut window = self.state.lock().await;
                if now.duration_since(window.started_at) >= self.config.window {
                    window.started_at = now;
                    window.count = 0;
                }

                if window.count < self.config.limit {
                    window.count += 1;
                    self.metrics.allowed.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }

                self.config
                    .window
                    .saturating_sub(now.duration_since(window.started_at))
            };

            if waits >= self.config.max_attempts {
                self.metrics.exhausted.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    attempts = waits,
                    retry_after_ms = retry_after.as_millis(),
                    "Rate gate exhausted"
                );
                return Err(GateError::Exhausted {
                    attempts: waits,
                    retry_after,
                });
            }

            waits += 1;
            self.metrics.throttled.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                wait = waits,
                retry_after_ms = retry_after.as_millis(),
                "Rate gate window full, waiting"
            );
            sleep(retry_after).await;
        }
    }

    /// Run a remote operation behind the gate.
    ///
    /// Retryable failures are retried with exponential backoff, honouring a
    /// server-provided `retry_after`; after `max_attempts` the last error is
    /// returned. Non-retryable failures return at once.
    pub async fn call<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut delay = self.config.initial_backoff;
        let mut attempts = 0;

        loop {
            self.acquire().await?;
            match op().await {
                Ok(value) => {
                    if attempts > 0 {
                        tracing::info!(operation, retries = attempts, "Remote call recovered");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() => {
                    attempts += 1;
                    if attempts >= self.config.max_attempts {
                        tracing::warn!(operation, attempts, error = %err, "Remote call gave up");
                        return Err(err);
                    }

                    let wait = err.retry_after().unwrap_or(delay).min(self.config.max_backoff);
                    self.metrics.backoffs.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        operation,
                        attempt = attempts,
                        wait_ms = wait.as_millis(),
                        error = %err,
                        "Remote call failed, backing off"
                    );
                    sleep(wait).await;
                    delay = delay.mul_f64(self.config.factor).min(self.config.max_backoff);
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            allowed: self.metrics.allowed.load(Ordering::Relaxed),
            throttled: self.metrics.throttled.load(Ordering::Relaxed),
            backoffs: self.metrics.backoffs.load(Ordering::Relaxed),
            exhausted: self.metrics.exhausted.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicU32;

    fn gate(limit: u32, max_attempts: u32) -> RateGate {
        RateGate::new(GateConfig {
            limit,
            window: Duration::from_secs(1),
            max_attempts,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            factor: 2.0,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_next_window() {
        let gate = gate(2, 3);
        let started = Instant::now();

        gate.acquire().await.unwrap();
        gate.acquire().await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);

        gate.acquire().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(1));

        let stats = gate.stats();
        assert_eq!(stats.allowed, 3);
        assert_eq!(stats.throttled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_is_exhausted_without_capacity() {
        let gate = gate(0, 2);
        let err = gate.acquire().await.unwrap_err();
        assert!(matches!(err, GateError::Exhausted { attempts: 2, .. }));
        assert_eq!(gate.stats().exhausted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn call_retries_retryable_errors() {
        let gate = gate(10, 4);
        let calls = AtomicU32::new(0);

        let value = gate
            .call("fetch_page", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RemoteError::Unavailable("503".to_string()))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(gate.stats().backoffs, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn call_honours_retry_after() {
        let gate = gate(10, 3);
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        gate.call("write_properties", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RemoteError::RateLimited {
                    retry_after: Some(Duration::from_millis(700)),
                })
            } else {
                Ok(())
            }
        })
        .await
        .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn call_surfaces_error_after_max_attempts() {
        let gate = gate(10, 3);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = gate
            .call("fetch_page", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RemoteError::Unavailable("down".to_string()))
            })
            .await;

        assert!(matches!(result, Err(RemoteError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn call_does_not_retry_rejections() {
        let gate = gate(10, 3);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = gate
            .call("write_properties", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RemoteError::Rejected("bad property".to_string()))
            })
            .await;

        assert!(matches!(result, Err(RemoteError::Rejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(gate.stats().backoffs, 0);
    }
}
