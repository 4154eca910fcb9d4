//! Submission queue and worker pool
//!
//! Bounds concurrent sandboxed executions behind a fixed pool of workers.
//! Interactive `run` jobs are drained with priority over `submit` jobs, both
//! queues are bounded, and admission waits are capped so a caller never hangs
//! on an overloaded judge. A job whose caller disconnects, or that is
//! superseded by a newer run from the same user, is aborted even while
//! executing; the worker drops the job future, which kills its sandbox
//! process. The scheduler is an explicitly constructed object whose lifetime
//! is tied to the service process; dropping it closes the queues and stops
//! the workers.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::JudgeConfig;
use crate::store::TestCase;
use crate::verdict::JudgeOutcome;

/// Judging mode, matching the two submission endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Interactive run against visible cases; never persisted
    Run,
    /// Scored submission against all cases
    Submit,
}

/// One judging job: a submission plus the cases it will be judged against
#[derive(Debug, Clone)]
pub struct JudgeJob {
    pub problem_id: i64,
    pub user_id: Option<String>,
    pub language: String,
    pub code: String,
    pub mode: Mode,
    /// Test cases in stored order
    pub cases: Vec<TestCase>,
    /// Base per-case time limit in milliseconds
    pub time_limit_ms: u32,
    /// Base per-case memory limit in MB
    pub memory_limit_mb: u32,
}

/// Seam between the scheduler and the judging pipeline
#[async_trait]
pub trait JobProcessor: Send + Sync + 'static {
    async fn process(&self, job: &JudgeJob) -> JudgeOutcome;
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Queue depth or admission wait exceeded; the judge is overloaded
    #[error("Judging queue is full, try again shortly")]
    QueueTimeout,
    /// The job ran past the total deadline
    #[error("Judging deadline exceeded")]
    DeadlineExceeded,
    /// Per-user concurrency cap hit
    #[error("Another submission from this user is already being judged")]
    UserBusy,
    /// Superseded by a newer run request, or the scheduler shut down
    #[error("Judging was aborted")]
    Aborted,
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub workers: usize,
    pub queue_depth: usize,
    pub queue_wait: Duration,
    pub job_deadline: Duration,
}

impl SchedulerOptions {
    pub fn from_config(config: &JudgeConfig) -> Self {
        Self {
            workers: config.workers,
            queue_depth: config.queue_depth,
            queue_wait: Duration::from_millis(config.queue_wait_ms),
            job_deadline: Duration::from_millis(config.job_deadline_ms),
        }
    }
}

struct Queued {
    job: JudgeJob,
    reply: oneshot::Sender<JudgeOutcome>,
    ticket: Option<RunTicket>,
}

/// Which run generation a queued run job belongs to. A newer generation for
/// the same user supersedes this job, whether it is still queued or already
/// executing.
struct RunTicket {
    key: String,
    generation: u64,
    latest: watch::Receiver<u64>,
}

#[derive(Default)]
struct Shared {
    /// Users with a submit job currently admitted (cap of 1 in flight)
    in_flight: Mutex<HashSet<String>>,
    /// Latest run-job generation per user; the entry is removed once the
    /// latest run finishes, so the map only holds users with runs in flight
    run_generations: Mutex<HashMap<String, watch::Sender<u64>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fixed-size worker pool with bounded, mode-separated queues
pub struct Scheduler {
    run_tx: async_channel::Sender<Queued>,
    submit_tx: async_channel::Sender<Queued>,
    shared: Arc<Shared>,
    queue_wait: Duration,
    job_deadline: Duration,
    // Held so worker tasks stay attached to the scheduler's lifetime
    _workers: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(processor: Arc<dyn JobProcessor>, options: SchedulerOptions) -> Self {
        let (run_tx, run_rx) = async_channel::bounded(options.queue_depth.max(1));
        let (submit_tx, submit_rx) = async_channel::bounded(options.queue_depth.max(1));
        let shared = Arc::new(Shared::default());

        let worker_count = options.workers.max(1);
        let workers = (0..worker_count)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    run_rx.clone(),
                    submit_rx.clone(),
                    Arc::clone(&processor),
                    Arc::clone(&shared),
                ))
            })
            .collect();

        info!("Judge scheduler started with {} workers", worker_count);

        Self {
            run_tx,
            submit_tx,
            shared,
            queue_wait: options.queue_wait,
            job_deadline: options.job_deadline,
            _workers: workers,
        }
    }

    /// Enqueue a job and wait for its outcome.
    ///
    /// Blocks (asynchronously) until a worker finishes the job, the admission
    /// wait expires, or the total deadline fires. Every path resolves within
    /// a bounded time.
    pub async fn submit(&self, job: JudgeJob) -> Result<JudgeOutcome, SchedulerError> {
        let mode = job.mode;
        let user_key = job.user_id.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let ticket = match mode {
            Mode::Submit => {
                if let Some(key) = &user_key {
                    let mut in_flight = lock(&self.shared.in_flight);
                    if !in_flight.insert(key.clone()) {
                        return Err(SchedulerError::UserBusy);
                    }
                }
                None
            }
            Mode::Run => user_key.as_ref().map(|key| {
                // A new run supersedes any earlier run from the same user,
                // queued or executing
                let mut generations = lock(&self.shared.run_generations);
                let tx = generations
                    .entry(key.clone())
                    .or_insert_with(|| watch::channel(0).0);
                let next = *tx.borrow() + 1;
                tx.send_replace(next);
                RunTicket {
                    key: key.clone(),
                    generation: next,
                    latest: tx.subscribe(),
                }
            }),
        };

        let queued = Queued {
            job,
            reply: reply_tx,
            ticket,
        };

        let tx = match mode {
            Mode::Run => &self.run_tx,
            Mode::Submit => &self.submit_tx,
        };

        let admitted = matches!(
            tokio::time::timeout(self.queue_wait, tx.send(queued)).await,
            Ok(Ok(()))
        );
        if !admitted {
            // Never admitted, so the submit slot must be released here
            if mode == Mode::Submit {
                if let Some(key) = &user_key {
                    lock(&self.shared.in_flight).remove(key);
                }
            }
            warn!("Judging queue saturated, rejecting job");
            return Err(SchedulerError::QueueTimeout);
        }

        match tokio::time::timeout(self.job_deadline, reply_rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(SchedulerError::Aborted),
            Err(_) => Err(SchedulerError::DeadlineExceeded),
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    run_rx: async_channel::Receiver<Queued>,
    submit_rx: async_channel::Receiver<Queued>,
    processor: Arc<dyn JobProcessor>,
    shared: Arc<Shared>,
) {
    loop {
        // Interactive run jobs win when both queues have work
        let queued = match run_rx.try_recv() {
            Ok(queued) => Some(queued),
            Err(async_channel::TryRecvError::Empty) => {
                tokio::select! {
                    biased;
                    r = run_rx.recv() => r.ok(),
                    s = submit_rx.recv() => s.ok(),
                }
            }
            Err(async_channel::TryRecvError::Closed) => None,
        };

        let Some(queued) = queued else {
            break;
        };

        let Queued {
            job,
            mut reply,
            mut ticket,
        } = queued;
        let mode = job.mode;
        let user_key = job.user_id.clone();

        let superseded = ticket
            .as_ref()
            .map(|t| *t.latest.borrow() != t.generation)
            .unwrap_or(false);

        let outcome = if superseded || reply.is_closed() {
            // Caller disconnected or sent a newer run before the job started;
            // discard it without burning a sandbox
            debug!(
                "Worker {}: discarding stale job for problem {}",
                worker_id, job.problem_id
            );
            None
        } else {
            debug!(
                "Worker {}: judging problem {} ({} cases)",
                worker_id,
                job.problem_id,
                job.cases.len()
            );
            // Cancellation propagates into the running job: dropping the
            // process future kills the sandbox process of the current case
            tokio::select! {
                outcome = processor.process(&job) => Some(outcome),
                _ = reply.closed() => None,
                _ = superseded_wait(&mut ticket) => None,
            }
        };

        // Release scheduling state before replying, so a caller observing
        // the outcome can submit again immediately
        if let Some(t) = &ticket {
            let mut generations = lock(&shared.run_generations);
            let is_latest = generations
                .get(&t.key)
                .map(|tx| *tx.borrow() == t.generation)
                .unwrap_or(false);
            if is_latest {
                generations.remove(&t.key);
            }
        }
        if mode == Mode::Submit {
            if let Some(key) = &user_key {
                lock(&shared.in_flight).remove(key);
            }
        }

        match outcome {
            // A dropped receiver means the caller gave up; the outcome is discarded
            Some(outcome) => {
                let _ = reply.send(outcome);
            }
            None => debug!(
                "Worker {}: job for problem {} superseded or abandoned",
                worker_id, job.problem_id
            ),
        }
    }

    debug!("Worker {} stopped", worker_id);
}

/// Resolves once a newer run generation for the same user appears. Never
/// resolves for jobs without a ticket, or after the user's generation entry
/// has been evicted (at which point nothing can supersede the job).
async fn superseded_wait(ticket: &mut Option<RunTicket>) {
    match ticket {
        Some(t) => {
            let generation = t.generation;
            if t.latest.wait_for(|latest| *latest != generation).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::JudgeOutcome;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::task::JoinSet;

    struct StubProcessor {
        delay: Duration,
        processed: AtomicUsize,
    }

    impl StubProcessor {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                processed: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl JobProcessor for StubProcessor {
        async fn process(&self, _job: &JudgeJob) -> JudgeOutcome {
            tokio::time::sleep(self.delay).await;
            self.processed.fetch_add(1, Ordering::SeqCst);
            JudgeOutcome::Judged { cases: vec![] }
        }
    }

    fn job(mode: Mode, user_id: Option<&str>) -> JudgeJob {
        JudgeJob {
            problem_id: 1,
            user_id: user_id.map(Into::into),
            language: "python".into(),
            code: "print(1)".into(),
            mode,
            cases: vec![],
            time_limit_ms: 1000,
            memory_limit_mb: 256,
        }
    }

    fn options(workers: usize, depth: usize) -> SchedulerOptions {
        SchedulerOptions {
            workers,
            queue_depth: depth,
            queue_wait: Duration::from_millis(200),
            job_deadline: Duration::from_secs(10),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fifty_concurrent_jobs_all_resolve() {
        let processor = StubProcessor::new(Duration::from_millis(5));
        let scheduler = Arc::new(Scheduler::new(processor.clone(), options(10, 64)));

        let mut set = JoinSet::new();
        for i in 0..50 {
            let scheduler = Arc::clone(&scheduler);
            set.spawn(async move {
                scheduler
                    .submit(job(Mode::Run, Some(&format!("user-{}", i))))
                    .await
            });
        }

        let mut resolved = 0;
        while let Some(result) = set.join_next().await {
            assert!(matches!(
                result.unwrap(),
                Ok(JudgeOutcome::Judged { .. })
            ));
            resolved += 1;
        }
        assert_eq!(resolved, 50);
        assert_eq!(processor.processed.load(Ordering::SeqCst), 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_submit_cap_one_in_flight_per_user() {
        let processor = StubProcessor::new(Duration::from_millis(300));
        let scheduler = Arc::new(Scheduler::new(processor, options(2, 8)));

        let first = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.submit(job(Mode::Submit, Some("alice"))).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = scheduler.submit(job(Mode::Submit, Some("alice"))).await;
        assert!(matches!(second, Err(SchedulerError::UserBusy)));

        // A different user is unaffected
        let other = scheduler.submit(job(Mode::Submit, Some("bob"))).await;
        assert!(other.is_ok());

        assert!(first.await.unwrap().is_ok());

        // The slot frees once the first job completes
        let again = scheduler.submit(job(Mode::Submit, Some("alice"))).await;
        assert!(again.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_saturated_queue_times_out() {
        let processor = StubProcessor::new(Duration::from_secs(5));
        let options = SchedulerOptions {
            workers: 1,
            queue_depth: 1,
            queue_wait: Duration::from_millis(50),
            job_deadline: Duration::from_secs(30),
        };
        let scheduler = Arc::new(Scheduler::new(processor, options));

        // Occupy the single worker and fill the queue
        for _ in 0..2 {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.submit(job(Mode::Submit, None)).await });
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        let overflow = scheduler.submit(job(Mode::Submit, None)).await;
        assert!(matches!(overflow, Err(SchedulerError::QueueTimeout)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_newer_run_supersedes_queued_run() {
        let processor = StubProcessor::new(Duration::from_millis(200));
        let scheduler = Arc::new(Scheduler::new(processor.clone(), options(1, 8)));

        // Occupy the single worker so run jobs queue up
        let blocker = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.submit(job(Mode::Submit, None)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stale = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.submit(job(Mode::Run, Some("alice"))).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let fresh = scheduler.submit(job(Mode::Run, Some("alice"))).await;
        assert!(fresh.is_ok());

        let stale = stale.await.unwrap();
        assert!(matches!(stale, Err(SchedulerError::Aborted)));

        assert!(blocker.await.unwrap().is_ok());
        // Blocker + fresh run executed; the superseded run never did
        assert_eq!(processor.processed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deadline_bounds_job_lifetime() {
        let processor = StubProcessor::new(Duration::from_secs(5));
        let options = SchedulerOptions {
            workers: 1,
            queue_depth: 8,
            queue_wait: Duration::from_millis(100),
            job_deadline: Duration::from_millis(100),
        };
        let scheduler = Scheduler::new(processor, options);

        let result = scheduler.submit(job(Mode::Submit, None)).await;
        assert!(matches!(result, Err(SchedulerError::DeadlineExceeded)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_expired_deadline_aborts_running_job() {
        let processor = StubProcessor::new(Duration::from_millis(500));
        let options = SchedulerOptions {
            workers: 1,
            queue_depth: 8,
            queue_wait: Duration::from_millis(100),
            job_deadline: Duration::from_millis(100),
        };
        let scheduler = Scheduler::new(processor.clone(), options);

        let result = scheduler.submit(job(Mode::Submit, None)).await;
        assert!(matches!(result, Err(SchedulerError::DeadlineExceeded)));

        // The abandoned job must be cancelled, not left running to completion
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(processor.processed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_newer_run_aborts_in_flight_run() {
        let processor = StubProcessor::new(Duration::from_millis(300));
        let scheduler = Arc::new(Scheduler::new(processor.clone(), options(1, 8)));

        let stale = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.submit(job(Mode::Run, Some("alice"))).await })
        };
        // Let the stale run start executing on the single worker
        tokio::time::sleep(Duration::from_millis(50)).await;

        let fresh = scheduler.submit(job(Mode::Run, Some("alice"))).await;
        assert!(fresh.is_ok());

        let stale = stale.await.unwrap();
        assert!(matches!(stale, Err(SchedulerError::Aborted)));
        // Only the fresh run ran to completion; the stale one was aborted mid-job
        assert_eq!(processor.processed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_generation_entry_evicted_after_completion() {
        let processor = StubProcessor::new(Duration::from_millis(10));
        let scheduler = Scheduler::new(processor, options(1, 8));

        assert!(scheduler.submit(job(Mode::Run, Some("alice"))).await.is_ok());
        assert!(lock(&scheduler.shared.run_generations).is_empty());
    }
}
