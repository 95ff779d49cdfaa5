//! Queue Runtime (§2 component 11, §5, §9): named work queues with bounded
//! concurrency, a per-queue rate limit, exponential-backoff retries, and
//! bounded retention of completed/failed job records.
//!
//! Grounded on two teacher patterns, de-axum-ified and generalized:
//! - concurrency bound + worker-pool draining a channel: `signals::enrichment::DomeEnrichmentService`
//!   (`Semaphore` + `spawn_workers`);
//! - rate limit: `middleware::rate_limit::RateLimitLayer`'s fixed-window
//!   counter, generalized from per-IP to per-queue-name and driven by the
//!   injected `Clock` instead of `std::time::Instant` so it is deterministic
//!   under `FakeClock`.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{info_span, warn, Instrument};

use crate::backoff::{Backoff, BackoffParams};
use crate::clock::Clock;

pub type JobFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

#[derive(Debug, Clone, Copy)]
pub struct QueueParams {
    pub concurrency: usize,
    pub rate_per_sec: u32,
    pub max_attempts: u32,
    pub keep_on_complete: usize,
    pub keep_on_fail: usize,
}

impl Default for QueueParams {
    fn default() -> Self {
        Self {
            concurrency: 20,
            rate_per_sec: 50,
            max_attempts: 3,
            keep_on_complete: 100,
            keep_on_fail: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub job_id: String,
    pub attempts: u32,
    pub finished_at_ms: i64,
}

/// Fixed-window rate limiter keyed by nothing but this queue's own clock
/// reads (one counter per `Queue` instance, not per caller identity).
struct RateWindow {
    window_start_ms: i64,
    count: u32,
}

struct RateLimiter {
    clock: Arc<dyn Clock>,
    window_ms: i64,
    limit: u32,
    state: Mutex<RateWindow>,
}

impl RateLimiter {
    fn new(clock: Arc<dyn Clock>, limit: u32) -> Self {
        let now = clock.now_ms();
        Self {
            clock,
            window_ms: 1000,
            limit,
            state: Mutex::new(RateWindow {
                window_start_ms: now,
                count: 0,
            }),
        }
    }

    /// Blocks (async sleep) until a slot is free, then consumes it.
    async fn acquire(&self) {
        loop {
            let wait = {
                let now = self.clock.now_ms();
                let mut guard = self.state.lock();
                if now - guard.window_start_ms >= self.window_ms {
                    guard.window_start_ms = now;
                    guard.count = 0;
                }
                if guard.count < self.limit {
                    guard.count += 1;
                    None
                } else {
                    Some(guard.window_start_ms + self.window_ms - now)
                }
            };
            match wait {
                None => return,
                Some(ms) => tokio::time::sleep(std::time::Duration::from_millis(ms.max(1) as u64)).await,
            }
        }
    }
}

/// One named queue (§6 lists `normalize, features, score, strategy, paper,
/// execute, risk, audit, alerts`).
pub struct Queue {
    name: String,
    concurrency: Arc<Semaphore>,
    rate: RateLimiter,
    params: QueueParams,
    in_flight: Mutex<HashSet<String>>,
    completed: Mutex<VecDeque<JobRecord>>,
    failed: Mutex<VecDeque<JobRecord>>,
    clock: Arc<dyn Clock>,
}

impl Queue {
    pub fn new(name: impl Into<String>, clock: Arc<dyn Clock>, params: QueueParams) -> Self {
        Self {
            name: name.into(),
            concurrency: Arc::new(Semaphore::new(params.concurrency)),
            rate: RateLimiter::new(clock.clone(), params.rate_per_sec),
            params,
            in_flight: Mutex::new(HashSet::new()),
            completed: Mutex::new(VecDeque::new()),
            failed: Mutex::new(VecDeque::new()),
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn completed_count(&self) -> usize {
        self.completed.lock().len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.lock().len()
    }

    /// Runs `job_id` to completion with retries, deduping against any job
    /// of the same id already in flight within this queue (§5: "Job
    /// identity must deduplicate within one tick"). `make_attempt` is
    /// called once per attempt since a job future is not reusable across
    /// retries.
    pub async fn run<F>(self: &Arc<Self>, job_id: String, make_attempt: F)
    where
        F: Fn() -> JobFuture + Send + Sync + 'static,
    {
        {
            let mut guard = self.in_flight.lock();
            if guard.contains(&job_id) {
                return;
            }
            guard.insert(job_id.clone());
        }

        let _permit = match self.concurrency.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                self.in_flight.lock().remove(&job_id);
                return;
            }
        };

        let mut backoff = Backoff::new(BackoffParams {
            base: std::time::Duration::from_secs(1),
            max_delay: std::time::Duration::from_secs(30),
            max_attempts: self.params.max_attempts,
        });

        let span = info_span!("job", queue = %self.name, job_id = %job_id);
        let result = async {
            loop {
                self.rate.acquire().await;
                match make_attempt().await {
                    Ok(()) => return Ok(()),
                    Err(err) => {
                        warn!(job_id = %job_id, attempt = backoff.attempt() + 1, error = %err, "job attempt failed");
                        match backoff.next_delay() {
                            Some(delay) => tokio::time::sleep(delay).await,
                            None => return Err(err),
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await;

        self.in_flight.lock().remove(&job_id);

        let record = JobRecord {
            job_id,
            attempts: backoff.attempt() + 1,
            finished_at_ms: self.clock.now_ms(),
        };
        match result {
            Ok(()) => {
                let mut guard = self.completed.lock();
                guard.push_back(record);
                while guard.len() > self.params.keep_on_complete {
                    guard.pop_front();
                }
            }
            Err(_) => {
                let mut guard = self.failed.lock();
                guard.push_back(record);
                while guard.len() > self.params.keep_on_fail {
                    guard.pop_front();
                }
            }
        }
    }
}

/// The fixed set of logical queues this system schedules work onto (§6).
pub const QUEUE_NAMES: &[&str] = &[
    "normalize", "features", "score", "strategy", "paper", "execute", "risk", "audit", "alerts",
];

pub struct QueueRegistry {
    queues: std::collections::HashMap<String, Arc<Queue>>,
}

impl QueueRegistry {
    pub fn new(clock: Arc<dyn Clock>, params: QueueParams) -> Self {
        let queues = QUEUE_NAMES
            .iter()
            .map(|name| ((*name).to_string(), Arc::new(Queue::new(*name, clock.clone(), params))))
            .collect();
        Self { queues }
    }

    pub fn get(&self, name: &str) -> Arc<Queue> {
        self.queues
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("unknown queue: {name}"))
    }
}

/// Builds the spec's job id convention: `{kind}-{tokenId}-{nowMs}` (§5).
pub fn job_id(kind: &str, token_id: &str, now_ms: i64) -> String {
    format!("{kind}-{token_id}-{now_ms}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_on_first_attempt_records_completion() {
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(0));
        let q = Arc::new(Queue::new("features", clock, QueueParams::default()));
        q.run("job-1".to_string(), || Box::pin(async { Ok(()) })).await;
        assert_eq!(q.completed_count(), 1);
        assert_eq!(q.failed_count(), 0);
    }

    #[tokio::test]
    async fn retries_then_fails_after_max_attempts() {
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(0));
        let params = QueueParams {
            concurrency: 1,
            rate_per_sec: 1000,
            max_attempts: 3,
            keep_on_complete: 10,
            keep_on_fail: 10,
        };
        let q = Arc::new(Queue::new("features", clock, params));
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        q.run("job-2".to_string(), move || {
            calls2.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(anyhow::anyhow!("boom")) })
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(q.failed_count(), 1);
    }

    #[tokio::test]
    async fn dedupes_same_job_id_in_flight() {
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(0));
        let q = Arc::new(Queue::new("features", clock, QueueParams::default()));
        let calls = Arc::new(AtomicU32::new(0));

        let q1 = q.clone();
        let calls1 = calls.clone();
        let h1 = tokio::spawn(async move {
            q1.run("dup".to_string(), move || {
                let c = calls1.clone();
                Box::pin(async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    Ok(())
                })
            })
            .await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        q.run("dup".to_string(), || Box::pin(async { Ok(()) })).await;
        h1.await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn job_id_matches_spec_convention() {
        assert_eq!(job_id("orderbook", "tok1", 1000), "orderbook-tok1-1000");
    }
}
