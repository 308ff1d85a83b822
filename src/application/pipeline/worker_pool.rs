use crate::domain::errors::PipelineError;
use crate::infrastructure::observability::Metrics;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

type BoxedRun = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Sizing and timing of a [`WorkerPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_workers: usize,
    pub queue_capacity: usize,
    pub task_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            queue_capacity: 64,
            task_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Point-in-time pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PoolStats {
    pub max_workers: usize,
    pub queue_capacity: usize,
    pub active: usize,
    pub queued: usize,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    /// active / max_workers
    pub utilization: f64,
}

/// What `shutdown` could not finish within the grace period
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    pub clean: bool,
    /// Labels of tasks that were queued or running when the grace period ran out
    pub unfinished: Vec<String>,
}

/// Result side of a submitted task
#[derive(Debug)]
pub struct TaskHandle<T> {
    label: String,
    rx: oneshot::Receiver<Result<T, PipelineError>>,
}

impl<T> TaskHandle<T> {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Waits for the task. A task dropped without finishing (panic, shutdown
    /// abort) reports `TaskAborted`.
    pub async fn join(self) -> Result<T, PipelineError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::TaskAborted { label: self.label }),
        }
    }
}

struct Job {
    id: u64,
    label: String,
    run: BoxedRun,
}

#[derive(Default)]
struct PoolState {
    active: AtomicUsize,
    queued: AtomicUsize,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    /// Queued or running tasks by id
    outstanding: Mutex<BTreeMap<u64, String>>,
    running: Mutex<HashMap<u64, AbortHandle>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Removes a task's bookkeeping if its submission never reaches the queue
struct Enqueued<'a> {
    state: &'a PoolState,
    id: u64,
    armed: bool,
}

impl Drop for Enqueued<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(&self.state.outstanding).remove(&self.id);
            // Saturating: a forced shutdown may already have zeroed the count
            let _ = self
                .state
                .queued
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        }
    }
}

/// Fixed set of workers draining a bounded task queue.
///
/// A full queue makes [`WorkerPool::submit`] wait (backpressure) and
/// [`WorkerPool::try_submit`] fail with `QueueFull`. Every task runs under
/// the configured timeout in its own tokio task, so a panic only fails
/// that task.
pub struct WorkerPool {
    config: PoolConfig,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    state: Arc<PoolState>,
    next_id: AtomicU64,
    metrics: Option<Metrics>,
}

impl WorkerPool {
    /// Spawns the workers; must be called inside a tokio runtime.
    pub fn new(config: PoolConfig) -> Self {
        Self::build(config, None)
    }

    pub fn with_metrics(config: PoolConfig, metrics: Metrics) -> Self {
        Self::build(config, Some(metrics))
    }

    fn build(mut config: PoolConfig, metrics: Option<Metrics>) -> Self {
        config.max_workers = config.max_workers.max(1);
        config.queue_capacity = config.queue_capacity.max(1);

        let (tx, rx) = mpsc::channel::<Job>(config.queue_capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let state = Arc::new(PoolState::default());

        let workers = (0..config.max_workers)
            .map(|n| {
                tokio::spawn(worker_loop(
                    n,
                    rx.clone(),
                    state.clone(),
                    metrics.clone(),
                ))
            })
            .collect();

        info!(
            "WorkerPool: Started {} workers (queue capacity {}, task timeout {:?})",
            config.max_workers, config.queue_capacity, config.task_timeout
        );

        Self {
            config,
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            state,
            next_id: AtomicU64::new(1),
            metrics,
        }
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Queues a task, waiting while the queue is full.
    pub async fn submit<F, T>(
        &self,
        label: impl Into<String>,
        task: F,
    ) -> Result<TaskHandle<T>, PipelineError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.sender()?;
        let (job, handle) = self.package(label.into(), task);
        let mut enqueued = self.register(&job);

        let permit = sender.reserve().await.map_err(|_| PipelineError::ShutDown)?;
        {
            // Shutdown may have started while waiting for capacity
            let open = lock(&self.sender);
            if open.is_none() {
                return Err(PipelineError::ShutDown);
            }
            permit.send(job);
        }
        enqueued.armed = false;
        self.after_enqueue();
        Ok(handle)
    }

    /// Queues a task or fails immediately with `QueueFull`.
    pub fn try_submit<F, T>(
        &self,
        label: impl Into<String>,
        task: F,
    ) -> Result<TaskHandle<T>, PipelineError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (job, handle) = self.package(label.into(), task);
        {
            let open = lock(&self.sender);
            let sender = open.as_ref().ok_or(PipelineError::ShutDown)?;
            let mut enqueued = self.register(&job);
            sender.try_send(job).map_err(|e| match e {
                TrySendError::Full(_) => PipelineError::QueueFull {
                    capacity: self.config.queue_capacity,
                },
                TrySendError::Closed(_) => PipelineError::ShutDown,
            })?;
            enqueued.armed = false;
        }
        self.after_enqueue();
        Ok(handle)
    }

    fn sender(&self) -> Result<mpsc::Sender<Job>, PipelineError> {
        lock(&self.sender).clone().ok_or(PipelineError::ShutDown)
    }

    fn register(&self, job: &Job) -> Enqueued<'_> {
        lock(&self.state.outstanding).insert(job.id, job.label.clone());
        self.state.queued.fetch_add(1, Ordering::SeqCst);
        Enqueued {
            state: &self.state,
            id: job.id,
            armed: true,
        }
    }

    fn after_enqueue(&self) {
        self.state.submitted.fetch_add(1, Ordering::SeqCst);
        if let Some(metrics) = &self.metrics {
            metrics
                .pool_queue_depth
                .set(self.state.queued.load(Ordering::SeqCst) as f64);
        }
    }

    fn package<F, T>(&self, label: String, task: F) -> (Job, TaskHandle<T>)
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        let timeout = self.config.task_timeout;
        let state = self.state.clone();
        let metrics = self.metrics.clone();
        let task_label = label.clone();

        let run: BoxedRun = Box::pin(async move {
            let outcome = match tokio::time::timeout(timeout, task).await {
                Ok(value) => {
                    state.completed.fetch_add(1, Ordering::SeqCst);
                    if let Some(metrics) = &metrics {
                        metrics.inc_pool_task("completed");
                    }
                    Ok(value)
                }
                Err(_) => {
                    warn!("WorkerPool: Task '{}' timed out after {:?}", task_label, timeout);
                    state.timed_out.fetch_add(1, Ordering::SeqCst);
                    if let Some(metrics) = &metrics {
                        metrics.inc_pool_task("timed_out");
                    }
                    Err(PipelineError::TaskTimeout {
                        label: task_label,
                        timeout_ms: timeout.as_millis() as u64,
                    })
                }
            };
            // Receiver may have been dropped by a caller that stopped waiting
            let _ = tx.send(outcome);
        });

        let job = Job {
            id,
            label: label.clone(),
            run,
        };
        (job, TaskHandle { label, rx })
    }

    pub fn stats(&self) -> PoolStats {
        let active = self.state.active.load(Ordering::SeqCst);
        PoolStats {
            max_workers: self.config.max_workers,
            queue_capacity: self.config.queue_capacity,
            active,
            queued: self.state.queued.load(Ordering::SeqCst),
            submitted: self.state.submitted.load(Ordering::SeqCst),
            completed: self.state.completed.load(Ordering::SeqCst),
            failed: self.state.failed.load(Ordering::SeqCst),
            timed_out: self.state.timed_out.load(Ordering::SeqCst),
            utilization: active as f64 / self.config.max_workers as f64,
        }
    }

    pub fn is_shut_down(&self) -> bool {
        lock(&self.sender).is_none()
    }

    /// Stops intake and drains within the configured grace period.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.shutdown_within(self.config.shutdown_grace).await
    }

    /// Stops intake, lets queued and running tasks finish for up to `grace`,
    /// then aborts whatever is left and names it in the report.
    pub async fn shutdown_within(&self, grace: Duration) -> ShutdownReport {
        drop(lock(&self.sender).take());
        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *lock(&self.workers));
        let worker_aborts: Vec<AbortHandle> = workers.iter().map(|w| w.abort_handle()).collect();

        info!(
            "WorkerPool: Shutting down ({} outstanding, grace {:?})",
            lock(&self.state.outstanding).len(),
            grace
        );

        if tokio::time::timeout(grace, futures::future::join_all(workers))
            .await
            .is_ok()
        {
            info!("WorkerPool: Drained cleanly");
            return ShutdownReport {
                clean: true,
                unfinished: Vec::new(),
            };
        }

        let unfinished: Vec<String> = lock(&self.state.outstanding).values().cloned().collect();
        for abort in lock(&self.state.running).values() {
            abort.abort();
        }
        for abort in worker_aborts {
            abort.abort();
        }
        // Aborted workers never reach their own bookkeeping
        lock(&self.state.outstanding).clear();
        lock(&self.state.running).clear();
        self.state.active.store(0, Ordering::SeqCst);
        self.state.queued.store(0, Ordering::SeqCst);
        if let Some(metrics) = &self.metrics {
            metrics.pool_active_workers.set(0.0);
            metrics.pool_queue_depth.set(0.0);
            for _ in &unfinished {
                metrics.inc_pool_task("aborted");
            }
        }
        warn!(
            "WorkerPool: Grace period elapsed, aborted {} tasks: {:?}",
            unfinished.len(),
            unfinished
        );
        ShutdownReport {
            clean: unfinished.is_empty(),
            unfinished,
        }
    }
}

async fn worker_loop(
    worker: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    state: Arc<PoolState>,
    metrics: Option<Metrics>,
) {
    loop {
        let next = rx.lock().await.recv().await;
        let Some(job) = next else {
            debug!("WorkerPool: Worker {} exiting, queue closed", worker);
            break;
        };

        state.queued.fetch_sub(1, Ordering::SeqCst);
        let active = state.active.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(metrics) = &metrics {
            metrics.pool_active_workers.set(active as f64);
            metrics
                .pool_queue_depth
                .set(state.queued.load(Ordering::SeqCst) as f64);
        }

        let handle = tokio::spawn(job.run);
        lock(&state.running).insert(job.id, handle.abort_handle());

        if let Err(e) = handle.await {
            if e.is_panic() {
                error!("WorkerPool: Task '{}' panicked", job.label);
                state.failed.fetch_add(1, Ordering::SeqCst);
                if let Some(metrics) = &metrics {
                    metrics.inc_pool_task("failed");
                }
            } else {
                debug!("WorkerPool: Task '{}' aborted", job.label);
            }
        }

        lock(&state.running).remove(&job.id);
        lock(&state.outstanding).remove(&job.id);
        let active = state.active.fetch_sub(1, Ordering::SeqCst) - 1;
        if let Some(metrics) = &metrics {
            metrics.pool_active_workers.set(active as f64);
        }
    }
}
