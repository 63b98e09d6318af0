//! In-process job queue with priorities, delayed retries and a dead-letter
//! list.
//!
//! A job counts as *outstanding* from `push` until the worker that took it
//! calls `complete` or `dead_letter`. Retries keep the job outstanding, so
//! `wait_idle` only returns once nothing is queued, delayed or in flight.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::debug;

use intake_contracts::{error::IntakeError, jobs::JobPriority};

/// A queued job with its delivery bookkeeping.
#[derive(Debug, Clone)]
pub struct Envelope<J> {
    pub job: J,
    pub priority: JobPriority,
    /// 1-based delivery attempt.
    pub attempt: u32,
    ready_at: Instant,
    sequence: u64,
}

/// A job that exhausted its attempts or failed fatally.
#[derive(Debug, Clone)]
pub struct DeadLetter<J> {
    pub job: J,
    pub attempts: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

struct QueueState<J> {
    pending: Vec<Envelope<J>>,
    dead: Vec<DeadLetter<J>>,
    next_sequence: u64,
}

enum Take<J> {
    Ready(Envelope<J>),
    /// Nothing ready; the earliest delayed job becomes ready at this instant.
    WaitUntil(Instant),
    Empty,
}

pub struct JobQueue<J> {
    name: &'static str,
    state: Mutex<QueueState<J>>,
    available: Notify,
    idle: Notify,
    outstanding: AtomicUsize,
}

impl<J: Clone> JobQueue<J> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(QueueState {
                pending: Vec::new(),
                dead: Vec::new(),
                next_sequence: 0,
            }),
            available: Notify::new(),
            idle: Notify::new(),
            outstanding: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    // Poisoning only happens if a holder panicked mid-update; every update
    // here is a single push or remove, so the state is still consistent.
    fn lock(&self) -> MutexGuard<'_, QueueState<J>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue a new job for immediate delivery.
    pub fn push(&self, job: J, priority: JobPriority) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.lock();
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.pending.push(Envelope {
                job,
                priority,
                attempt: 1,
                ready_at: Instant::now(),
                sequence,
            });
        }
        debug!(queue = self.name, ?priority, "job enqueued");
        self.available.notify_one();
    }

    /// Put a failed job back for another attempt after `delay`.
    pub fn retry_later(&self, envelope: Envelope<J>, delay: Duration) {
        {
            let mut state = self.lock();
            state.pending.push(Envelope {
                attempt: envelope.attempt + 1,
                ready_at: Instant::now() + delay,
                ..envelope
            });
        }
        self.available.notify_one();
    }

    /// Return a job untouched, e.g. when shutdown interrupted its delivery.
    pub fn requeue(&self, envelope: Envelope<J>) {
        self.lock().pending.push(envelope);
        self.available.notify_one();
    }

    /// Mark a delivered job as finished.
    pub fn complete(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Record a job as permanently failed and finish it.
    pub fn dead_letter(&self, envelope: Envelope<J>, error: &IntakeError) {
        self.lock().dead.push(DeadLetter {
            job: envelope.job,
            attempts: envelope.attempt,
            error: error.to_string(),
            failed_at: Utc::now(),
        });
        self.complete();
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter<J>> {
        self.lock().dead.clone()
    }

    /// Jobs pushed and not yet completed or dead-lettered.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Highest priority first, then first pushed, among jobs that are ready.
    fn take_ready(&self) -> Take<J> {
        let mut state = self.lock();
        let now = Instant::now();

        let best = state
            .pending
            .iter()
            .enumerate()
            .filter(|(_, e)| e.ready_at <= now)
            .max_by(|(_, a), (_, b)| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.sequence.cmp(&a.sequence))
            })
            .map(|(idx, _)| idx);

        if let Some(idx) = best {
            return Take::Ready(state.pending.swap_remove(idx));
        }
        match state.pending.iter().map(|e| e.ready_at).min() {
            Some(at) => Take::WaitUntil(at),
            None => Take::Empty,
        }
    }

    /// Wait for the next ready job. Returns `None` once `shutdown` flips to
    /// `true` or its sender is dropped.
    pub async fn next(&self, shutdown: &mut watch::Receiver<bool>) -> Option<Envelope<J>> {
        loop {
            if *shutdown.borrow() {
                return None;
            }
            match self.take_ready() {
                Take::Ready(envelope) => return Some(envelope),
                Take::WaitUntil(at) => {
                    tokio::select! {
                        _ = self.available.notified() => {}
                        _ = tokio::time::sleep_until(at) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                return None;
                            }
                        }
                    }
                }
                Take::Empty => {
                    tokio::select! {
                        _ = self.available.notified() => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                return None;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Resolve once no job is outstanding.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.outstanding() == 0 {
                return;
            }
            idle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn queue() -> JobQueue<&'static str> {
        JobQueue::new("test")
    }

    fn no_shutdown() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    fn fatal() -> IntakeError {
        IntakeError::DocumentNotFound {
            document_id: "missing".to_string(),
        }
    }

    // ── Ordering ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn fifo_within_priority_high_first() {
        let queue = queue();
        let (_tx, mut rx) = no_shutdown();
        queue.push("a", JobPriority::Normal);
        queue.push("b", JobPriority::Normal);
        queue.push("urgent", JobPriority::High);

        let order: Vec<&str> = [
            queue.next(&mut rx).await.unwrap().job,
            queue.next(&mut rx).await.unwrap().job,
            queue.next(&mut rx).await.unwrap().job,
        ]
        .to_vec();
        assert_eq!(order, vec!["urgent", "a", "b"]);
    }

    #[tokio::test]
    async fn retry_is_delayed_and_counts_attempts() {
        let queue = queue();
        let (_tx, mut rx) = no_shutdown();
        queue.push("job", JobPriority::Normal);

        let first = queue.next(&mut rx).await.unwrap();
        assert_eq!(first.attempt, 1);
        let started = Instant::now();
        queue.retry_later(first, Duration::from_millis(20));

        let second = queue.next(&mut rx).await.unwrap();
        assert_eq!(second.attempt, 2);
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(queue.outstanding(), 1, "a retried job stays outstanding");
    }

    // ── Completion ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn dead_letters_keep_last_error() {
        let queue = queue();
        let (_tx, mut rx) = no_shutdown();
        queue.push("job", JobPriority::Normal);

        let envelope = queue.next(&mut rx).await.unwrap();
        queue.dead_letter(envelope, &fatal());

        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].job, "job");
        assert!(dead[0].error.contains("not found"));
        assert_eq!(queue.outstanding(), 0);
    }

    #[tokio::test]
    async fn wait_idle_resolves_after_completion() {
        let queue = Arc::new(queue());
        let (_tx, mut rx) = no_shutdown();
        queue.push("job", JobPriority::Normal);

        let worker = {
            let queue = queue.clone();
            tokio::spawn(async move {
                let _envelope = queue.next(&mut rx).await;
                tokio::time::sleep(Duration::from_millis(10)).await;
                queue.complete();
            })
        };

        queue.wait_idle().await;
        assert_eq!(queue.outstanding(), 0);
        worker.await.unwrap();
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn shutdown_releases_waiting_consumer() {
        let queue = Arc::new(queue());
        let (tx, mut rx) = watch::channel(false);

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next(&mut rx).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();

        assert!(consumer.await.unwrap().is_none());
    }
}
