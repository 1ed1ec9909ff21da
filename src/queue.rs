use crate::EmbedError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Task lifecycle: `Pending -> Running -> {Succeeded, Failed}`, with a
/// failed attempt going back to `Pending` while retry budget remains.
/// `Cancelled` is terminal from either non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }
}

/// Coarse progress milestones. Extraction is not naturally subdividable
/// into equal-cost steps, so no percentages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Queued,
    Fetching,
    Parsing,
    PreservingAssets,
    Done,
}

/// Progress event emitted by the orchestrator for subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct TaskEvent {
    pub task_id: Uuid,
    pub stage: ProgressStage,
    pub attempt: u32,
    pub detail: Option<String>,
}

/// A background unit of extraction work. Owned exclusively by the worker
/// currently executing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionTask {
    pub id: Uuid,
    pub url: String,
    /// Stamped into preserved-asset filenames.
    pub owner_id: String,
    pub force_refresh: bool,
    pub state: TaskState,
    /// Attempts started so far; incremented when a worker claims the task.
    pub attempt_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    /// `url_hash` of the cached result once successful.
    pub result_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExtractionTask {
    pub fn new(url: &str, owner_id: &str, force_refresh: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            url: url.to_string(),
            owner_id: owner_id.to_string(),
            force_refresh,
            state: TaskState::Pending,
            attempt_count: 0,
            max_retries: 3,
            last_error: None,
            result_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// What status polling returns. Unknown ids are a distinct error
/// ([`EmbedError::TaskNotFound`]), never silently `Pending`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
    pub id: Uuid,
    pub state: TaskState,
    pub attempt_count: u32,
    pub result_ref: Option<String>,
    pub last_error: Option<String>,
}

impl From<&ExtractionTask> for TaskStatus {
    fn from(task: &ExtractionTask) -> Self {
        Self {
            id: task.id,
            state: task.state,
            attempt_count: task.attempt_count,
            result_ref: task.result_ref.clone(),
            last_error: task.last_error.clone(),
        }
    }
}

/// Queue/result-store collaborator. Must guarantee at-most-one active
/// claim per task id.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: ExtractionTask) -> Result<Uuid, EmbedError>;

    /// Claim the next runnable task, flipping it to `Running` and counting
    /// the attempt. `None` when nothing is due.
    async fn claim_next(&self) -> Result<Option<ExtractionTask>, EmbedError>;

    /// Return a failed task to `Pending` for a later retry.
    async fn requeue(
        &self,
        id: Uuid,
        not_before: DateTime<Utc>,
        error: &str,
    ) -> Result<(), EmbedError>;

    /// Record the terminal (or intermediate) outcome of an attempt.
    async fn report(
        &self,
        id: Uuid,
        state: TaskState,
        result_ref: Option<String>,
        error: Option<String>,
    ) -> Result<(), EmbedError>;

    async fn get_status(&self, id: Uuid) -> Result<TaskStatus, EmbedError>;

    /// Cancel a task that has not started. Returns `true` if the task was
    /// `Pending` and is now `Cancelled`; `false` if it already left
    /// `Pending` (the caller then deals with the running worker).
    async fn cancel_pending(&self, id: Uuid) -> Result<bool, EmbedError>;
}

#[derive(Default)]
struct QueueInner {
    tasks: HashMap<Uuid, ExtractionTask>,
    ready: VecDeque<Uuid>,
    /// Retries waiting out their backoff: `(not_before, id)`.
    scheduled: Vec<(DateTime<Utc>, Uuid)>,
}

/// In-memory queue. A single lock spans the ready-queue pop and the state
/// flip to `Running`, which is what makes claims exclusive.
#[derive(Default)]
pub struct MemoryTaskQueue {
    inner: Mutex<QueueInner>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, task: ExtractionTask) -> Result<Uuid, EmbedError> {
        let id = task.id;
        let mut inner = self.inner.lock().await;
        inner.tasks.insert(id, task);
        inner.ready.push_back(id);
        Ok(id)
    }

    async fn claim_next(&self) -> Result<Option<ExtractionTask>, EmbedError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        // Promote retries whose backoff has elapsed.
        let due: Vec<Uuid> = {
            let (due, waiting): (Vec<_>, Vec<_>) = inner
                .scheduled
                .drain(..)
                .partition(|(not_before, _)| *not_before <= now);
            inner.scheduled = waiting;
            due.into_iter().map(|(_, id)| id).collect()
        };
        inner.ready.extend(due);

        while let Some(id) = inner.ready.pop_front() {
            let Some(task) = inner.tasks.get_mut(&id) else {
                continue;
            };
            // Cancelled-while-pending tasks are skipped, not run.
            if task.state != TaskState::Pending {
                continue;
            }
            task.state = TaskState::Running;
            task.attempt_count += 1;
            task.updated_at = Utc::now();
            return Ok(Some(task.clone()));
        }

        Ok(None)
    }

    async fn requeue(
        &self,
        id: Uuid,
        not_before: DateTime<Utc>,
        error: &str,
    ) -> Result<(), EmbedError> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or_else(|| EmbedError::TaskNotFound(id.to_string()))?;
        task.state = TaskState::Pending;
        task.last_error = Some(error.to_string());
        task.updated_at = Utc::now();
        inner.scheduled.push((not_before, id));
        Ok(())
    }

    async fn report(
        &self,
        id: Uuid,
        state: TaskState,
        result_ref: Option<String>,
        error: Option<String>,
    ) -> Result<(), EmbedError> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or_else(|| EmbedError::TaskNotFound(id.to_string()))?;
        task.state = state;
        if result_ref.is_some() {
            task.result_ref = result_ref;
        }
        if error.is_some() {
            task.last_error = error;
        }
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn get_status(&self, id: Uuid) -> Result<TaskStatus, EmbedError> {
        let inner = self.inner.lock().await;
        inner
            .tasks
            .get(&id)
            .map(TaskStatus::from)
            .ok_or_else(|| EmbedError::TaskNotFound(id.to_string()))
    }

    async fn cancel_pending(&self, id: Uuid) -> Result<bool, EmbedError> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or_else(|| EmbedError::TaskNotFound(id.to_string()))?;
        if task.state == TaskState::Pending {
            task.state = TaskState::Cancelled;
            task.updated_at = Utc::now();
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_then_status_is_pending() {
        let queue = MemoryTaskQueue::new();
        let task = ExtractionTask::new("https://example.com/a", "owner", false);
        let id = queue.enqueue(task).await.unwrap();

        let status = queue.get_status(id).await.unwrap();
        assert_eq!(status.state, TaskState::Pending);
        assert_eq!(status.attempt_count, 0);
    }

    #[tokio::test]
    async fn unknown_id_is_a_distinct_error() {
        let queue = MemoryTaskQueue::new();
        let err = queue.get_status(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, EmbedError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn claim_flips_to_running_and_counts_the_attempt() {
        let queue = MemoryTaskQueue::new();
        let id = queue
            .enqueue(ExtractionTask::new("https://example.com/a", "o", false))
            .await
            .unwrap();

        let claimed = queue.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.state, TaskState::Running);
        assert_eq!(claimed.attempt_count, 1);

        // At-most-one active claim.
        assert!(queue.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancelled_pending_task_never_runs() {
        let queue = MemoryTaskQueue::new();
        let id = queue
            .enqueue(ExtractionTask::new("https://example.com/a", "o", false))
            .await
            .unwrap();

        assert!(queue.cancel_pending(id).await.unwrap());
        let status = queue.get_status(id).await.unwrap();
        assert_eq!(status.state, TaskState::Cancelled);
        assert_eq!(status.attempt_count, 0);

        assert!(queue.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancel_of_running_task_is_left_to_the_worker() {
        let queue = MemoryTaskQueue::new();
        let id = queue
            .enqueue(ExtractionTask::new("https://example.com/a", "o", false))
            .await
            .unwrap();
        queue.claim_next().await.unwrap().unwrap();

        assert!(!queue.cancel_pending(id).await.unwrap());
        assert_eq!(queue.get_status(id).await.unwrap().state, TaskState::Running);
    }

    #[tokio::test]
    async fn requeue_respects_backoff_schedule() {
        let queue = MemoryTaskQueue::new();
        let id = queue
            .enqueue(ExtractionTask::new("https://example.com/a", "o", false))
            .await
            .unwrap();
        queue.claim_next().await.unwrap().unwrap();

        queue
            .requeue(id, Utc::now() + chrono::Duration::seconds(60), "boom")
            .await
            .unwrap();

        // Backoff not yet elapsed.
        assert!(queue.claim_next().await.unwrap().is_none());

        queue
            .requeue(id, Utc::now() - chrono::Duration::seconds(1), "boom")
            .await
            .unwrap();
        let claimed = queue.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.attempt_count, 2);
        assert_eq!(claimed.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn exhausted_retries_end_in_terminal_failed() {
        let queue = MemoryTaskQueue::new();
        let task = ExtractionTask::new("https://example.com/a", "o", false);
        let max_retries = task.max_retries;
        let id = queue.enqueue(task).await.unwrap();

        // Drive the state machine the way a worker would.
        for attempt in 1..=max_retries {
            let claimed = queue.claim_next().await.unwrap().unwrap();
            assert_eq!(claimed.attempt_count, attempt);

            if claimed.attempt_count < max_retries {
                queue
                    .requeue(id, Utc::now() - chrono::Duration::seconds(1), "still failing")
                    .await
                    .unwrap();
            } else {
                queue
                    .report(id, TaskState::Failed, None, Some("still failing".into()))
                    .await
                    .unwrap();
            }
        }

        let status = queue.get_status(id).await.unwrap();
        assert_eq!(status.state, TaskState::Failed);
        assert!(status.state.is_terminal());
        assert_eq!(status.attempt_count, max_retries);

        // Terminal means terminal: nothing left to claim.
        assert!(queue.claim_next().await.unwrap().is_none());
    }
}
