//! Worker pool (spec §4.6 C6): a fixed set of cooperative workers claiming
//! tasks from the store and running them through the [`PipelineOrchestrator`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use fortune_shared::ErrorCategory;
use fortune_store::TaskStore;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::pipeline::PipelineOrchestrator;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub worker_count: usize,
    pub total_timeout: Duration,
    pub stuck_after: Duration,
    pub backstop_poll: Duration,
    pub monitor_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 3,
            total_timeout: Duration::from_secs(120),
            stuck_after: Duration::from_secs(180),
            backstop_poll: Duration::from_secs(30),
            monitor_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default)]
struct WorkerStatus {
    current_task: Option<Uuid>,
    claimed_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct PoolMetrics {
    completed_total: AtomicU64,
    failed_total: AtomicU64,
    errored_total: AtomicU64,
    duration_ms_sum: AtomicU64,
    duration_count: AtomicU64,
}

/// Point-in-time snapshot of pool health (spec §4.6 "Metrics exposed").
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerPoolMetrics {
    pub worker_count: usize,
    pub busy: usize,
    pub idle: usize,
    pub completed_total: u64,
    pub failed_total: u64,
    pub errored_total: u64,
    pub success_rate: f64,
    pub avg_processing_time_ms: f64,
}

struct Shared {
    store: Arc<TaskStore>,
    orchestrator: Arc<PipelineOrchestrator>,
    config: WorkerPoolConfig,
    notify: Arc<Notify>,
    shutting_down: AtomicBool,
    statuses: DashMap<usize, WorkerStatus>,
    metrics: PoolMetrics,
}

/// Bounded pool of cooperative workers (spec §4.6 C6).
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(store: Arc<TaskStore>, orchestrator: Arc<PipelineOrchestrator>, config: WorkerPoolConfig) -> Self {
        let shared = Arc::new(Shared {
            store,
            orchestrator,
            config,
            notify: Arc::new(Notify::new()),
            shutting_down: AtomicBool::new(false),
            statuses: DashMap::new(),
            metrics: PoolMetrics::default(),
        });
        Self { shared, handles: Vec::new() }
    }

    /// Signal that a fresh task was just persisted, waking one idle worker
    /// (spec §4.6 queue signal 1).
    pub fn notify_submission(&self) {
        self.shared.notify.notify_one();
    }

    /// Spawn the worker loops and the stuck-worker monitor.
    pub fn start(&mut self) {
        for id in 0..self.shared.config.worker_count {
            self.shared.statuses.insert(id, WorkerStatus::default());
            let shared = self.shared.clone();
            self.handles.push(tokio::spawn(worker_loop(id, shared)));
        }
        let shared = self.shared.clone();
        self.handles.push(tokio::spawn(stuck_monitor(shared)));
    }

    pub fn metrics(&self) -> WorkerPoolMetrics {
        let statuses = &self.shared.statuses;
        let busy = statuses.iter().filter(|s| s.current_task.is_some()).count();
        let completed = self.shared.metrics.completed_total.load(Ordering::Relaxed);
        let failed = self.shared.metrics.failed_total.load(Ordering::Relaxed);
        let errored = self.shared.metrics.errored_total.load(Ordering::Relaxed);
        let duration_sum = self.shared.metrics.duration_ms_sum.load(Ordering::Relaxed);
        let duration_count = self.shared.metrics.duration_count.load(Ordering::Relaxed);
        let total_terminal = completed + failed;
        WorkerPoolMetrics {
            worker_count: statuses.len(),
            busy,
            idle: statuses.len().saturating_sub(busy),
            completed_total: completed,
            failed_total: failed,
            errored_total: errored,
            success_rate: if total_terminal == 0 { 1.0 } else { completed as f64 / total_terminal as f64 },
            avg_processing_time_ms: if duration_count == 0 { 0.0 } else { duration_sum as f64 / duration_count as f64 },
        }
    }

    /// Stop claiming new work, abort in-flight pipelines, and requeue any
    /// task that had not yet reached a terminal state (spec §4.6).
    pub async fn shutdown(self) {
        self.shared.shutting_down.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
        for handle in &self.handles {
            handle.abort();
        }
        for handle in self.handles {
            let _ = handle.await;
        }
        for entry in self.shared.statuses.iter() {
            if let Some(task_id) = entry.current_task {
                if let Err(err) = self.shared.store.requeue(task_id).await {
                    tracing::warn!(%task_id, error = %err, "failed to requeue in-flight task on shutdown");
                }
            }
        }
    }
}

async fn worker_loop(id: usize, shared: Arc<Shared>) {
    let worker_id = format!("worker-{id}");
    loop {
        if shared.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        tokio::select! {
            _ = shared.notify.notified() => {}
            _ = tokio::time::sleep(shared.config.backstop_poll) => {}
        }
        if shared.shutting_down.load(Ordering::SeqCst) {
            return;
        }

        loop {
            match shared.store.claim_next(&worker_id).await {
                Ok(Some(task)) => {
                    let task_id = task.id;
                    if let Some(mut status) = shared.statuses.get_mut(&id) {
                        status.current_task = Some(task_id);
                        status.claimed_at = Some(Instant::now());
                    }
                    run_claimed_task(&shared, task).await;
                    if let Some(mut status) = shared.statuses.get_mut(&id) {
                        status.current_task = None;
                        status.claimed_at = None;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "claim_next failed");
                    break;
                }
            }
            if shared.shutting_down.load(Ordering::SeqCst) {
                return;
            }
        }
    }
}

async fn run_claimed_task(shared: &Arc<Shared>, task: fortune_shared::Task) {
    let task_id = task.id;
    let started = Instant::now();
    let outcome = tokio::time::timeout(shared.config.total_timeout, shared.orchestrator.run(task)).await;
    match outcome {
        Ok(Ok(())) => {
            shared.metrics.completed_total.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Err(err)) => {
            tracing::info!(%task_id, error = %err, "pipeline finished with error");
            shared.metrics.failed_total.fetch_add(1, Ordering::Relaxed);
        }
        Err(_elapsed) => {
            tracing::warn!(%task_id, "task exceeded whole-task wall-clock timeout");
            if let Err(store_err) = shared
                .store
                .fail(task_id, ErrorCategory::Timeout, "task exceeded wall-clock timeout")
                .await
            {
                tracing::warn!(%task_id, error = %store_err, "failed to mark timed-out task as failed");
            }
            shared.metrics.failed_total.fetch_add(1, Ordering::Relaxed);
            shared.metrics.errored_total.fetch_add(1, Ordering::Relaxed);
        }
    }
    shared.metrics.duration_ms_sum.fetch_add(started.elapsed().as_millis() as u64, Ordering::Relaxed);
    shared.metrics.duration_count.fetch_add(1, Ordering::Relaxed);
}

/// Periodically logs workers whose claimed task has been running longer
/// than 1.5x the configured timeout (spec §4.6 "possibly stuck").
async fn stuck_monitor(shared: Arc<Shared>) {
    loop {
        tokio::time::sleep(shared.config.monitor_interval).await;
        if shared.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        for entry in shared.statuses.iter() {
            if let (Some(task_id), Some(claimed_at)) = (entry.current_task, entry.claimed_at) {
                if claimed_at.elapsed() > shared.config.stuck_after {
                    tracing::warn!(worker = *entry.key(), %task_id, elapsed_s = claimed_at.elapsed().as_secs(), "worker possibly stuck");
                }
            }
        }
    }
}
