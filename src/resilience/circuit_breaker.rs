//! Circuit breaker for external calls.
//!
//! # States
//! - Closed: normal operation, calls pass through under a timeout
//! - Open: dependency assumed down, calls fail fast (or hit the fallback)
//! - Half-Open: a single trial call decides whether to close or re-open
//!
//! # State Transitions
//! ```text
//! Closed → Open: >= 5 calls in the rolling window and failure rate >= threshold
//! Open → Half-Open: after reset timeout
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails
//! any → Closed: operator reset()
//! ```
//!
//! # Design Decisions
//! - One breaker per protected dependency, no shared state between instances
//! - Failure rate is computed over a bucketed rolling window
//! - Results of calls admitted in an earlier state are counted but never
//!   drive a transition
//! - A cancelled half-open trial frees the slot so the next call can try

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use futures_util::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::timeouts::{with_deadline, Deadline};

/// Minimum number of calls in the rolling window before the breaker may trip.
pub const MIN_CALLS_TO_TRIP: u64 = 5;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters owned by a single breaker.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CircuitBreakerStats {
    pub failures: u64,
    pub successes: u64,
    pub rejections: u64,
    pub timeouts: u64,
    pub state: CircuitState,
    pub last_failure_time: Option<SystemTime>,
}

/// Errors surfaced by [`CircuitBreaker::fire`].
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// Breaker is open (or a half-open trial is already running) and no fallback is set.
    #[error("circuit '{name}' is open")]
    Open { name: String },

    /// Wrapped call exceeded the configured timeout.
    #[error("circuit '{name}' call timed out after {timeout_ms}ms")]
    Timeout { name: String, timeout_ms: u64 },

    /// Wrapped call returned an error.
    #[error("{0}")]
    Failed(E),
}

impl<E> CircuitError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CircuitError::Timeout { .. })
    }
}

type Action<A, R, E> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<R, E>> + Send + Sync>;
type Fallback<A, R> = Arc<dyn Fn(&A) -> R + Send + Sync>;

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    successes: u64,
    failures: u64,
}

/// Time-bucketed success/failure counts.
#[derive(Debug)]
struct RollingWindow {
    bucket_width: Duration,
    bucket_count: usize,
    buckets: VecDeque<(Instant, Bucket)>,
}

impl RollingWindow {
    fn new(window: Duration, bucket_count: u32) -> Self {
        let bucket_count = bucket_count.max(1) as usize;
        let bucket_width = (window / bucket_count as u32).max(Duration::from_millis(1));
        Self {
            bucket_width,
            bucket_count,
            buckets: VecDeque::with_capacity(bucket_count),
        }
    }

    fn record(&mut self, now: Instant, success: bool) {
        self.evict(now);
        let fresh = match self.buckets.back() {
            Some((started, _)) => now.duration_since(*started) >= self.bucket_width,
            None => true,
        };
        if fresh {
            self.buckets.push_back((now, Bucket::default()));
            while self.buckets.len() > self.bucket_count {
                self.buckets.pop_front();
            }
        }
        if let Some((_, bucket)) = self.buckets.back_mut() {
            if success {
                bucket.successes += 1;
            } else {
                bucket.failures += 1;
            }
        }
    }

    fn evict(&mut self, now: Instant) {
        let span = self.bucket_width * self.bucket_count as u32;
        while let Some((started, _)) = self.buckets.front() {
            if now.duration_since(*started) >= span {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }

    /// (failures, total) over the live buckets.
    fn totals(&mut self, now: Instant) -> (u64, u64) {
        self.evict(now);
        self.buckets.iter().fold((0, 0), |(failures, total), (_, b)| {
            (failures + b.failures, total + b.failures + b.successes)
        })
    }

    fn clear(&mut self) {
        self.buckets.clear();
    }
}

struct Core {
    state: CircuitState,
    stats: CircuitBreakerStats,
    window: RollingWindow,
    reset_timer: Option<JoinHandle<()>>,
    trial_in_flight: bool,
    /// Bumped on every transition; ties call results to the state that admitted them.
    epoch: u64,
}

struct Inner<A, R, E> {
    config: CircuitBreakerConfig,
    action: Action<A, R, E>,
    fallback: Option<Fallback<A, R>>,
    core: Mutex<Core>,
}

/// A call let through the breaker.
///
/// A half-open trial that is dropped before its outcome is recorded (the
/// caller's future was cancelled) releases the trial slot for its epoch.
struct Admission<'a> {
    core: &'a Mutex<Core>,
    epoch: u64,
    trial: bool,
    settled: bool,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.trial || self.settled {
            return;
        }
        let mut core = self.core.lock().unwrap_or_else(PoisonError::into_inner);
        if core.state == CircuitState::HalfOpen && core.epoch == self.epoch {
            core.trial_in_flight = false;
            tracing::debug!("Half-open trial cancelled, slot released");
        }
    }
}

/// A fault-isolating wrapper around an async operation.
///
/// Cheap to clone; clones share state.
pub struct CircuitBreaker<A, R, E> {
    inner: Arc<Inner<A, R, E>>,
}

impl<A, R, E> Clone for CircuitBreaker<A, R, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, R, E> CircuitBreaker<A, R, E>
where
    A: Clone + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    /// Wrap `action` with no fallback.
    pub fn new<F, Fut>(config: CircuitBreakerConfig, action: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        Self::build(config, action, None)
    }

    /// Wrap `action`; `fallback` answers rejected, failed and timed-out calls.
    pub fn with_fallback<F, Fut, G>(config: CircuitBreakerConfig, action: F, fallback: G) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        G: Fn(&A) -> R + Send + Sync + 'static,
    {
        Self::build(config, action, Some(Arc::new(fallback)))
    }

    fn build<F, Fut>(config: CircuitBreakerConfig, action: F, fallback: Option<Fallback<A, R>>) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let window = RollingWindow::new(
            Duration::from_millis(config.rolling_window_ms),
            config.rolling_buckets,
        );
        let action: Action<A, R, E> =
            Arc::new(move |args| -> BoxFuture<'static, Result<R, E>> { Box::pin(action(args)) });
        metrics::record_breaker_state(&config.name, CircuitState::Closed);
        Self {
            inner: Arc::new(Inner {
                config,
                action,
                fallback,
                core: Mutex::new(Core {
                    state: CircuitState::Closed,
                    stats: CircuitBreakerStats::default(),
                    window,
                    reset_timer: None,
                    trial_in_flight: false,
                    epoch: 0,
                }),
            }),
        }
    }

    /// Invoke the wrapped operation through the breaker.
    pub async fn fire(&self, args: A) -> Result<R, CircuitError<E>> {
        let Some(mut admission) = self.admit() else {
            return self.reject(&args);
        };

        let timeout = Duration::from_millis(self.inner.config.timeout_ms);
        let fallback_args = self.inner.fallback.as_ref().map(|_| args.clone());
        let call = (self.inner.action)(args);

        match with_deadline(timeout, call).await {
            Deadline::Completed(Ok(value)) => {
                self.on_success(&mut admission);
                Ok(value)
            }
            Deadline::Completed(Err(err)) => {
                self.on_failure(&mut admission, false);
                self.fall_back(fallback_args, CircuitError::Failed(err))
            }
            Deadline::Elapsed => {
                self.on_failure(&mut admission, true);
                self.fall_back(
                    fallback_args,
                    CircuitError::Timeout {
                        name: self.inner.config.name.clone(),
                        timeout_ms: self.inner.config.timeout_ms,
                    },
                )
            }
        }
    }

    /// Force the breaker closed, regardless of its current state.
    pub fn reset(&self) {
        let mut core = self.core();
        tracing::info!(breaker = %self.inner.config.name, from = %core.state, "Circuit manually reset");
        self.close(&mut core);
    }

    pub fn state(&self) -> CircuitState {
        self.core().state
    }

    /// Snapshot of the current counters.
    pub fn stats(&self) -> CircuitBreakerStats {
        let core = self.core();
        let mut stats = core.stats.clone();
        stats.state = core.state;
        stats
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.inner.config
    }

    fn core(&self) -> MutexGuard<'_, Core> {
        self.inner.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self) -> Option<Admission<'_>> {
        let mut core = self.core();
        let trial = match core.state {
            CircuitState::Closed => false,
            CircuitState::HalfOpen if !core.trial_in_flight => {
                core.trial_in_flight = true;
                tracing::debug!(breaker = %self.inner.config.name, "Admitting half-open trial call");
                true
            }
            _ => {
                core.stats.rejections += 1;
                return None;
            }
        };
        Some(Admission {
            core: &self.inner.core,
            epoch: core.epoch,
            trial,
            settled: false,
        })
    }

    fn reject(&self, args: &A) -> Result<R, CircuitError<E>> {
        let name = &self.inner.config.name;
        metrics::record_breaker_rejection(name);
        tracing::debug!(breaker = %name, "Call rejected by open circuit");
        match &self.inner.fallback {
            Some(fallback) => Ok(fallback(args)),
            None => Err(CircuitError::Open { name: name.clone() }),
        }
    }

    fn fall_back(&self, args: Option<A>, err: CircuitError<E>) -> Result<R, CircuitError<E>> {
        match (&self.inner.fallback, args) {
            (Some(fallback), Some(args)) => Ok(fallback(&args)),
            _ => Err(err),
        }
    }

    fn on_success(&self, admission: &mut Admission<'_>) {
        admission.settled = true;
        metrics::record_breaker_call(&self.inner.config.name, "success");
        let mut core = self.core();
        core.stats.successes += 1;
        if core.epoch != admission.epoch {
            return;
        }
        match core.state {
            CircuitState::HalfOpen => {
                tracing::info!(breaker = %self.inner.config.name, "Trial call succeeded, closing circuit");
                self.close(&mut core);
            }
            CircuitState::Closed => core.window.record(Instant::now(), true),
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, admission: &mut Admission<'_>, timed_out: bool) {
        admission.settled = true;
        let outcome = if timed_out { "timeout" } else { "failure" };
        metrics::record_breaker_call(&self.inner.config.name, outcome);

        let mut core = self.core();
        core.stats.failures += 1;
        if timed_out {
            core.stats.timeouts += 1;
        }
        core.stats.last_failure_time = Some(SystemTime::now());
        if core.epoch != admission.epoch {
            return;
        }

        match core.state {
            CircuitState::HalfOpen => {
                tracing::warn!(breaker = %self.inner.config.name, "Trial call failed, re-opening circuit");
                core.stats = CircuitBreakerStats::default();
                self.trip(&mut core);
            }
            CircuitState::Closed => {
                let now = Instant::now();
                core.window.record(now, false);
                let (failures, total) = core.window.totals(now);
                if total >= MIN_CALLS_TO_TRIP {
                    let rate = failures as f64 / total as f64 * 100.0;
                    if rate >= self.inner.config.error_threshold_percentage {
                        tracing::warn!(
                            breaker = %self.inner.config.name,
                            failures,
                            total,
                            failure_rate = rate,
                            "Failure threshold reached, opening circuit"
                        );
                        self.trip(&mut core);
                    }
                }
            }
            CircuitState::Open => {}
        }
    }

    fn trip(&self, core: &mut Core) {
        core.state = CircuitState::Open;
        core.epoch += 1;
        core.trial_in_flight = false;
        core.window.clear();
        if let Some(timer) = core.reset_timer.take() {
            timer.abort();
        }

        let weak = Arc::downgrade(&self.inner);
        let epoch = core.epoch;
        let delay = Duration::from_millis(self.inner.config.reset_timeout_ms);
        core.reset_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                CircuitBreaker { inner }.half_open(epoch);
            }
        }));
        metrics::record_breaker_state(&self.inner.config.name, CircuitState::Open);
    }

    fn half_open(&self, epoch: u64) {
        let mut core = self.core();
        if core.state != CircuitState::Open || core.epoch != epoch {
            return;
        }
        core.state = CircuitState::HalfOpen;
        core.epoch += 1;
        core.stats = CircuitBreakerStats::default();
        core.window.clear();
        core.reset_timer = None;
        tracing::info!(breaker = %self.inner.config.name, "Reset timeout elapsed, circuit half-open");
        metrics::record_breaker_state(&self.inner.config.name, CircuitState::HalfOpen);
    }

    fn close(&self, core: &mut Core) {
        core.state = CircuitState::Closed;
        core.epoch += 1;
        core.stats = CircuitBreakerStats::default();
        core.window.clear();
        core.trial_in_flight = false;
        if let Some(timer) = core.reset_timer.take() {
            timer.abort();
        }
        metrics::record_breaker_state(&self.inner.config.name, CircuitState::Closed);
    }
}

impl<A, R, E> fmt::Debug for CircuitBreaker<A, R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.inner.core.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("CircuitBreaker")
            .field("name", &self.inner.config.name)
            .field("state", &core.state)
            .field("stats", &core.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_config(threshold: f64, reset_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            name: "test".to_string(),
            timeout_ms: 100,
            error_threshold_percentage: threshold,
            reset_timeout_ms: reset_ms,
            rolling_window_ms: 10_000,
            rolling_buckets: 10,
        }
    }

    /// Breaker whose action succeeds when called with `true`.
    fn switch_breaker(config: CircuitBreakerConfig) -> CircuitBreaker<bool, &'static str, String> {
        CircuitBreaker::new(config, |ok: bool| async move {
            if ok {
                Ok("ok")
            } else {
                Err("boom".to_string())
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold_after_six_calls() {
        let breaker = switch_breaker(test_config(50.0, 1000));

        for _ in 0..3 {
            assert!(breaker.fire(true).await.is_ok());
        }
        assert!(breaker.fire(false).await.is_err());
        assert!(breaker.fire(false).await.is_err());
        // 2 failures out of 5 calls: 40%, still closed
        assert_eq!(breaker.state(), CircuitState::Closed);

        let err = breaker.fire(false).await.unwrap_err();
        assert!(matches!(err, CircuitError::Failed(ref msg) if msg == "boom"));
        assert_eq!(breaker.state(), CircuitState::Open);

        let stats = breaker.stats();
        assert_eq!(stats.failures, 3);
        assert_eq!(stats.successes, 3);
        assert!(stats.last_failure_time.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_opens_before_five_calls() {
        let breaker = switch_breaker(test_config(50.0, 1000));
        for _ in 0..4 {
            let _ = breaker.fire(false).await;
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        let _ = breaker.fire(false).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_without_calling() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let breaker: CircuitBreaker<(), (), String> = CircuitBreaker::new(test_config(50.0, 1000), move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("down".to_string())
            }
        });

        for _ in 0..5 {
            let _ = breaker.fire(()).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = breaker.fire(()).await.unwrap_err();
        assert!(err.is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(breaker.stats().rejections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes() {
        let breaker = switch_breaker(test_config(50.0, 1000));
        for _ in 0..3 {
            let _ = breaker.fire(true).await;
        }
        for _ in 0..3 {
            let _ = breaker.fire(false).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.stats().failures, 0);

        assert_eq!(breaker.fire(true).await.unwrap(), "ok");
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats(), CircuitBreakerStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let breaker = switch_breaker(test_config(50.0, 500));
        for _ in 0..5 {
            let _ = breaker.fire(false).await;
        }
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let _ = breaker.fire(false).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        let stats = breaker.stats();
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.successes, 0);

        // Timer is re-armed.
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_trial() {
        let breaker: CircuitBreaker<u64, (), String> = CircuitBreaker::new(test_config(50.0, 100), |delay_ms: u64| async move {
            if delay_ms == 0 {
                return Err("fail".to_string());
            }
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok(())
        });
        for _ in 0..5 {
            let _ = breaker.fire(0).await;
        }
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let trial = {
            let breaker = breaker.clone();
            tokio::spawn(async move { breaker.fire(50).await })
        };
        tokio::task::yield_now().await;

        let err = breaker.fire(50).await.unwrap_err();
        assert!(err.is_open());

        assert!(trial.await.unwrap().is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_trial_releases_half_open_slot() {
        let mut config = test_config(50.0, 100);
        config.timeout_ms = 5_000;
        let breaker: CircuitBreaker<u64, (), String> = CircuitBreaker::new(config, |delay_ms: u64| async move {
            if delay_ms == 0 {
                return Err("fail".to_string());
            }
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok(())
        });
        for _ in 0..5 {
            let _ = breaker.fire(0).await;
        }
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // Caller gives up on the trial before it finishes.
        let abandoned = tokio::time::timeout(Duration::from_millis(10), breaker.fire(1_000)).await;
        assert!(abandoned.is_err());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(breaker.fire(1).await.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let breaker: CircuitBreaker<(), (), String> = CircuitBreaker::new(test_config(50.0, 1000), |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        });

        let err = breaker.fire(()).await.unwrap_err();
        assert!(err.is_timeout());
        let stats = breaker.stats();
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.timeouts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_used_when_open_and_on_failure() {
        let breaker: CircuitBreaker<u32, u32, String> = CircuitBreaker::with_fallback(
            test_config(50.0, 1000),
            |_| async { Err("down".to_string()) },
            |n: &u32| n * 10,
        );

        assert_eq!(breaker.fire(1).await.unwrap(), 10);
        for n in 0..4 {
            let _ = breaker.fire(n).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.fire(7).await.unwrap(), 70);
        assert_eq!(breaker.stats().rejections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_forces_closed() {
        let breaker = switch_breaker(test_config(50.0, 60_000));
        for _ in 0..5 {
            let _ = breaker.fire(false).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().failures, 0);
        assert!(breaker.fire(true).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rolling_window_forgets_old_failures() {
        let mut config = test_config(50.0, 1000);
        config.rolling_window_ms = 1000;
        config.rolling_buckets = 10;
        let breaker = switch_breaker(config);

        for _ in 0..4 {
            let _ = breaker.fire(false).await;
        }
        tokio::time::sleep(Duration::from_millis(1500)).await;

        // Old failures have rolled out: one fresh failure among five fresh calls.
        for _ in 0..4 {
            let _ = breaker.fire(true).await;
        }
        let _ = breaker.fire(false).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_error_display() {
        let err: CircuitError<String> = CircuitError::Timeout {
            name: "handshake".into(),
            timeout_ms: 250,
        };
        assert_eq!(err.to_string(), "circuit 'handshake' call timed out after 250ms");

        let err: CircuitError<String> = CircuitError::Open { name: "rest".into() };
        assert_eq!(err.to_string(), "circuit 'rest' is open");
    }
}
