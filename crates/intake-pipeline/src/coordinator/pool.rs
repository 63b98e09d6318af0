//! Fixed-size worker pools draining one queue each.
//!
//! Every worker runs the same loop:
//!
//! ```text
//! next job ─► [rate limit] ─► handler.handle ─┬─ Ok ──────────────► complete
//!                                             ├─ Err, retryable ──► retry_later(backoff)
//!                                             └─ Err, exhausted ──► on_exhausted ─► dead_letter
//! ```

use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use intake_contracts::{
    error::{IntakeError, IntakeResult},
    jobs::Stage,
};
use intake_core::RetryPolicy;

use crate::config::PoolSettings;
use crate::coordinator::queue::JobQueue;

/// The work one stage does for one job.
#[async_trait]
pub trait StageHandler: Send + Sync + 'static {
    type Job: Clone + Debug + Send + Sync + 'static;

    fn stage(&self) -> Stage;

    /// Process one delivery. Must be safe to run again for the same job.
    async fn handle(&self, job: &Self::Job) -> IntakeResult<()>;

    /// Called once when a job will not be attempted again. Records the
    /// failure on the owning entity; never fails itself.
    fn on_exhausted(&self, job: &Self::Job, error: &IntakeError);
}

// ── Rate limiting ─────────────────────────────────────────────────────────────

/// Admits at most `max_jobs` starts in any sliding `window`.
pub struct RateLimiter {
    max_jobs: usize,
    window: Duration,
    starts: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_jobs: usize, window: Duration) -> Self {
        Self {
            max_jobs: max_jobs.max(1),
            window,
            starts: Mutex::new(VecDeque::new()),
        }
    }

    /// Claim a slot now, or `Err` with how long until the oldest expires.
    fn try_acquire(&self) -> Result<(), Duration> {
        let mut starts = self.starts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        while starts.front().is_some_and(|&start| now.duration_since(start) >= self.window) {
            starts.pop_front();
        }
        if starts.len() < self.max_jobs {
            starts.push_back(now);
            return Ok(());
        }
        match starts.front() {
            Some(&oldest) => Err(self.window.saturating_sub(now.duration_since(oldest))),
            None => Ok(()),
        }
    }

    /// Wait until a slot is free and take it.
    pub async fn acquire(&self) {
        while let Err(wait) = self.try_acquire() {
            debug!(wait_ms = wait.as_millis() as u64, "rate limit reached; waiting");
            tokio::time::sleep(wait).await;
        }
    }
}

// ── Pool ──────────────────────────────────────────────────────────────────────

pub struct WorkerPool {
    stage: Stage,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `settings.concurrency` workers on the current runtime.
    pub fn spawn<H: StageHandler>(
        handler: Arc<H>,
        queue: Arc<JobQueue<H::Job>>,
        settings: PoolSettings,
        limiter: Option<Arc<RateLimiter>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let stage = handler.stage();
        let workers = (0..settings.concurrency.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    handler.clone(),
                    queue.clone(),
                    settings.retry,
                    limiter.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();
        debug!(stage = %stage, concurrency = settings.concurrency, "worker pool started");
        Self { stage, workers }
    }

    /// Wait for every worker to stop. Workers stop once shutdown is signalled.
    pub async fn join(self) {
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(stage = %self.stage, error = %e, "worker task ended abnormally");
            }
        }
    }
}

async fn run_worker<H: StageHandler>(
    worker: usize,
    handler: Arc<H>,
    queue: Arc<JobQueue<H::Job>>,
    retry: RetryPolicy,
    limiter: Option<Arc<RateLimiter>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let stage = handler.stage();

    while let Some(envelope) = queue.next(&mut shutdown).await {
        if let Some(limiter) = &limiter {
            tokio::select! {
                _ = limiter.acquire() => {}
                _ = shutdown.changed() => {
                    queue.requeue(envelope);
                    break;
                }
            }
        }

        debug!(stage = %stage, worker, attempt = envelope.attempt, job = ?envelope.job, "job started");

        match handler.handle(&envelope.job).await {
            Ok(()) => queue.complete(),
            Err(err) if retry.should_retry(envelope.attempt, &err) => {
                let delay = retry.delay_after(envelope.attempt);
                warn!(
                    stage = %stage,
                    attempt = envelope.attempt,
                    max_attempts = retry.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "job failed; retrying"
                );
                queue.retry_later(envelope, delay);
            }
            Err(err) => {
                match &err {
                    IntakeError::InvariantViolation { .. } => {
                        error!(stage = %stage, job = ?envelope.job, error = %err, "invariant violated")
                    }
                    _ => warn!(
                        stage = %stage,
                        attempt = envelope.attempt,
                        job = ?envelope.job,
                        error = %err,
                        "job failed permanently"
                    ),
                }
                handler.on_exhausted(&envelope.job, &err);
                queue.dead_letter(envelope, &err);
            }
        }
    }

    debug!(stage = %stage, worker, "worker stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use intake_contracts::jobs::JobPriority;

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Fails the first `failures` deliveries with `error`, then succeeds.
    struct Flaky {
        failures: u32,
        error: IntakeError,
        calls: AtomicU32,
        exhausted: Mutex<Vec<String>>,
    }

    impl Flaky {
        fn new(failures: u32, error: IntakeError) -> Arc<Self> {
            Arc::new(Self {
                failures,
                error,
                calls: AtomicU32::new(0),
                exhausted: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl StageHandler for Flaky {
        type Job = u32;

        fn stage(&self) -> Stage {
            Stage::Ocr
        }

        async fn handle(&self, _job: &u32) -> IntakeResult<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(self.error.clone())
            } else {
                Ok(())
            }
        }

        fn on_exhausted(&self, _job: &u32, error: &IntakeError) {
            self.exhausted.lock().unwrap().push(error.to_string());
        }
    }

    fn transient() -> IntakeError {
        IntakeError::Provider {
            provider: "ocr".to_string(),
            reason: "throttled".to_string(),
        }
    }

    fn settings(concurrency: usize, max_attempts: u32) -> PoolSettings {
        PoolSettings {
            concurrency,
            retry: RetryPolicy::new(max_attempts, Duration::from_millis(1)),
        }
    }

    async fn run(handler: Arc<Flaky>, max_attempts: u32) -> Arc<JobQueue<u32>> {
        let queue = Arc::new(JobQueue::new("test"));
        let (tx, rx) = watch::channel(false);
        let pool = WorkerPool::spawn(handler, queue.clone(), settings(2, max_attempts), None, rx);

        queue.push(7, JobPriority::Normal);
        queue.wait_idle().await;
        tx.send(true).unwrap();
        pool.join().await;
        queue
    }

    // ── Retry and dead letters ────────────────────────────────────────────────

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let handler = Flaky::new(2, transient());
        let queue = run(handler.clone(), 3).await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert!(queue.dead_letters().is_empty());
        assert!(handler.exhausted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn exhausted_jobs_are_dead_lettered() {
        let handler = Flaky::new(u32::MAX, transient());
        let queue = run(handler.clone(), 3).await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 3);
        assert_eq!(handler.exhausted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let handler = Flaky::new(
            u32::MAX,
            IntakeError::ReferralNotFound {
                referral_id: "gone".to_string(),
            },
        );
        let queue = run(handler.clone(), 3).await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.dead_letters()[0].attempts, 1);
    }

    // ── Rate limiter ──────────────────────────────────────────────────────────

    #[test]
    fn limiter_admits_up_to_max_in_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        let wait = limiter.try_acquire().unwrap_err();
        assert!(wait <= Duration::from_secs(60));
        assert!(wait > Duration::from_secs(59));
    }

    #[tokio::test]
    async fn limiter_frees_slots_after_window() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        let started = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
