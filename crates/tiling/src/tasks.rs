use chrono::{DateTime, Utc};
use opentelemetry::{KeyValue, global, metrics::Counter};
use serde::Serialize;
use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};
use tokio::{sync::mpsc, task::JoinHandle};

pub const DEFAULT_HISTORY_LEN: usize = 256;

pub type Job = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

enum Message {
    Run { id: u64, name: String, job: Job },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum TaskStatus {
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub id: u64,
    pub name: String,
    #[serde(flatten)]
    pub status: TaskStatus,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

/// Post-response work, run one job at a time in submission order.
///
/// Jobs are never retried. Each outcome is logged, counted, and kept in a bounded history.
#[derive(Clone)]
pub struct TaskQueue {
    sender: mpsc::UnboundedSender<Message>,
    history: Arc<Mutex<VecDeque<TaskRecord>>>,
    next_id: Arc<AtomicU64>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl TaskQueue {
    /// Spawn the worker on the current tokio runtime.
    pub fn start(history_len: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let history = Arc::new(Mutex::new(VecDeque::with_capacity(history_len)));
        let counter = global::meter("tiling")
            .u64_counter("background_tasks_total")
            .with_description("Background tasks finished, by outcome")
            .build();

        let worker = tokio::spawn(run_worker(receiver, history.clone(), history_len, counter));

        Self {
            sender,
            history,
            next_id: Arc::new(AtomicU64::new(1)),
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    /// Queue `job`. Returns its id, or `None` once the queue has shut down.
    pub fn submit<F>(&self, name: impl Into<String>, job: F) -> Option<u64>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = name.into();
        match self.sender.send(Message::Run {
            id,
            name,
            job: Box::new(job),
        }) {
            Ok(()) => Some(id),
            Err(mpsc::error::SendError(message)) => {
                if let Message::Run { name, .. } = message {
                    tracing::warn!(task = %name, "Task queue closed, job dropped");
                }
                None
            }
        }
    }

    /// Finished tasks, oldest first.
    pub fn outcomes(&self) -> Vec<TaskRecord> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Run everything already queued, then stop the worker.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(Message::Shutdown);
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Task worker terminated abnormally");
            }
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<Message>,
    history: Arc<Mutex<VecDeque<TaskRecord>>>,
    history_len: usize,
    counter: Counter<u64>,
) {
    while let Some(message) = receiver.recv().await {
        let (id, name, job) = match message {
            Message::Run { id, name, job } => (id, name, job),
            Message::Shutdown => {
                // Later submits are refused; anything already in the channel still runs
                receiver.close();
                continue;
            }
        };

        let started = Instant::now();
        let status = match tokio::task::spawn_blocking(job).await {
            Ok(Ok(())) => TaskStatus::Succeeded,
            Ok(Err(e)) => TaskStatus::Failed(format!("{e:#}")),
            Err(e) => TaskStatus::Failed(format!("task panicked: {e}")),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match &status {
            TaskStatus::Succeeded => {
                tracing::debug!(task_id = id, task = %name, duration_ms, "Background task succeeded");
                counter.add(1, &[KeyValue::new("status", "succeeded")]);
            }
            TaskStatus::Failed(reason) => {
                tracing::error!(task_id = id, task = %name, reason = %reason, "Background task failed");
                counter.add(1, &[KeyValue::new("status", "failed")]);
            }
        }

        push_bounded(
            &history,
            history_len,
            TaskRecord {
                id,
                name,
                status,
                duration_ms,
                finished_at: Utc::now(),
            },
        );
    }

    tracing::info!("Task worker stopped");
}

fn push_bounded(history: &Mutex<VecDeque<TaskRecord>>, capacity: usize, record: TaskRecord) {
    if capacity == 0 {
        return;
    }
    let mut history = history.lock().unwrap_or_else(PoisonError::into_inner);
    if history.len() == capacity {
        history.pop_front();
    }
    history.push_back(record);
}
