//! tasks.rs — Asynchronous path: queued submission, worker pool, polled
//! status.
//!
//! Submission enqueues a job description and returns a task id immediately;
//! a pool of workers dequeues and runs one full orchestration per job.
//! Status is observed by polling the task record, never via callback. A
//! record's status only advances; the store rejects regressions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::insight::{Insight, InsightRequest};
use crate::orchestrator::InsightOrchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Submitted,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    /// Position in the one-way lifecycle; transitions must increase.
    fn rank(&self) -> u8 {
        match self {
            TaskStatus::Submitted => 0,
            TaskStatus::Running => 1,
            TaskStatus::Succeeded => 2,
            TaskStatus::Failed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

/// Observable state of one submitted job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: Uuid,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insight: Option<Insight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn submitted(task_id: Uuid) -> Self {
        Self {
            task_id,
            status: TaskStatus::Submitted,
            insight: None,
            error: None,
            submitted_at: Utc::now(),
        }
    }
}

/// Task-status collaborator. Create/read/transition must be atomic with
/// respect to concurrent workers and pollers.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, record: TaskRecord) -> anyhow::Result<()>;
    async fn get(&self, task_id: Uuid) -> anyhow::Result<Option<TaskRecord>>;
    /// Advance the record's status, attaching the result or error. A
    /// transition that does not move forward is rejected.
    async fn transition(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        insight: Option<Insight>,
        error: Option<String>,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    inner: Mutex<HashMap<Uuid, TaskRecord>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, record: TaskRecord) -> anyhow::Result<()> {
        let mut map = self.inner.lock().expect("task store mutex poisoned");
        if map.contains_key(&record.task_id) {
            bail!("task {} already exists", record.task_id);
        }
        map.insert(record.task_id, record);
        Ok(())
    }

    async fn get(&self, task_id: Uuid) -> anyhow::Result<Option<TaskRecord>> {
        let map = self.inner.lock().expect("task store mutex poisoned");
        Ok(map.get(&task_id).cloned())
    }

    async fn transition(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        insight: Option<Insight>,
        error: Option<String>,
    ) -> anyhow::Result<()> {
        let mut map = self.inner.lock().expect("task store mutex poisoned");
        let record = map
            .get_mut(&task_id)
            .ok_or_else(|| anyhow!("unknown task {task_id}"))?;
        if status.rank() <= record.status.rank() {
            bail!(
                "regressive task transition {:?} -> {:?} rejected",
                record.status,
                status
            );
        }
        record.status = status;
        record.insight = insight;
        record.error = error;
        Ok(())
    }
}

struct QueuedJob {
    task_id: Uuid,
    request: InsightRequest,
}

/// Producer side plus worker pool. Dropping the adapter closes the queue;
/// workers drain what was already submitted and exit.
pub struct TaskQueueAdapter {
    tx: mpsc::Sender<QueuedJob>,
    store: Arc<dyn TaskStore>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskQueueAdapter {
    /// Spawn `worker_count` workers consuming from a bounded queue.
    pub fn spawn(
        orchestrator: Arc<InsightOrchestrator>,
        store: Arc<dyn TaskStore>,
        worker_count: usize,
        queue_depth: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<QueuedJob>(queue_depth.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = (0..worker_count.max(1))
            .map(|worker_id| {
                let rx = rx.clone();
                let orchestrator = orchestrator.clone();
                let store = store.clone();
                tokio::spawn(worker_loop(worker_id, rx, orchestrator, store))
            })
            .collect();

        Self { tx, store, workers }
    }

    /// Enqueue one orchestration and return its task id immediately; the
    /// generation call happens on a worker, never here.
    pub async fn submit(&self, request: InsightRequest) -> anyhow::Result<Uuid> {
        let task_id = Uuid::new_v4();
        self.store.create(TaskRecord::submitted(task_id)).await?;
        self.tx
            .send(QueuedJob { task_id, request })
            .await
            .map_err(|_| anyhow!("task queue closed"))?;
        counter!("insight_tasks_submitted_total").increment(1);
        debug!(%task_id, "task submitted");
        Ok(task_id)
    }

    /// Poll the current record for a task id.
    pub async fn status(&self, task_id: Uuid) -> anyhow::Result<Option<TaskRecord>> {
        self.store.get(task_id).await
    }

    /// Close the queue and wait for workers to drain in-flight jobs.
    pub async fn shutdown(self) {
        drop(self.tx);
        for handle in self.workers {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedJob>>>,
    orchestrator: Arc<InsightOrchestrator>,
    store: Arc<dyn TaskStore>,
) {
    info!(worker_id, "insight worker started");
    loop {
        // Hold the receiver lock only for the dequeue; processing runs
        // outside it so workers stay concurrent.
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else {
            info!(worker_id, "insight worker stopping, queue closed");
            break;
        };

        if let Err(e) = store
            .transition(job.task_id, TaskStatus::Running, None, None)
            .await
        {
            // Already advanced or gone; skip rather than double-run.
            warn!(worker_id, task_id = %job.task_id, error = %e, "could not mark task running");
            continue;
        }

        match orchestrator.process(&job.request).await {
            Ok(insight) => {
                counter!("insight_tasks_succeeded_total").increment(1);
                if let Err(e) = store
                    .transition(job.task_id, TaskStatus::Succeeded, Some(insight), None)
                    .await
                {
                    error!(worker_id, task_id = %job.task_id, error = %e, "could not record task success");
                }
            }
            Err(e) => {
                // The gateway already did all the retrying this job gets; a
                // failed orchestration is recorded, not requeued.
                counter!("insight_tasks_failed_total").increment(1);
                warn!(worker_id, task_id = %job.task_id, error = %e, "task orchestration failed");
                if let Err(te) = store
                    .transition(job.task_id, TaskStatus::Failed, None, Some(e.to_string()))
                    .await
                {
                    error!(worker_id, task_id = %job.task_id, error = %te, "could not record task failure");
                }
            }
        }
    }
}
