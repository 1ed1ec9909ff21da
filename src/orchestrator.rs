use crate::queue::{ExtractionTask, ProgressStage, TaskEvent, TaskQueue, TaskState, TaskStatus};
use crate::service::{EmbedService, EnrichContext};
use crate::EmbedError;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Concurrent worker slots.
    pub workers: usize,
    pub max_retries: u32,
    /// Exponential backoff: `min(cap, base * 2^attempt)`.
    pub retry_base: Duration,
    pub retry_cap: Duration,
    /// Exceeding the soft limit logs a warning; the task keeps running.
    pub soft_time_limit: Duration,
    /// Exceeding the hard limit kills the attempt and fails the task.
    pub hard_time_limit: Duration,
    /// Idle delay between queue polls.
    pub poll_interval: Duration,
    pub event_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            max_retries: 3,
            retry_base: Duration::from_secs(60),
            retry_cap: Duration::from_secs(300),
            soft_time_limit: Duration::from_secs(25 * 60),
            hard_time_limit: Duration::from_secs(30 * 60),
            poll_interval: Duration::from_millis(250),
            event_capacity: 256,
        }
    }
}

/// `min(cap, base * 2^attempt)` with overflow clamped to the cap.
pub fn backoff_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).map_or(cap, |delay| delay.min(cap))
}

struct RunningHandles {
    cancel: CancellationToken,
    terminate: CancellationToken,
}

struct Inner {
    queue: Arc<dyn TaskQueue>,
    service: Arc<EmbedService>,
    config: OrchestratorConfig,
    events: broadcast::Sender<TaskEvent>,
    running: RwLock<HashMap<Uuid, RunningHandles>>,
    shutdown: CancellationToken,
}

/// Runs extraction tasks off the request path: a pool of workers pulls
/// from the queue collaborator, executes the shared enrichment sequence
/// with retry/backoff, and reports coarse progress milestones.
pub struct TaskOrchestrator {
    inner: Arc<Inner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskOrchestrator {
    pub fn new(queue: Arc<dyn TaskQueue>, service: Arc<EmbedService>) -> Self {
        Self::with_config(queue, service, OrchestratorConfig::default())
    }

    pub fn with_config(
        queue: Arc<dyn TaskQueue>,
        service: Arc<EmbedService>,
        config: OrchestratorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                queue,
                service,
                config,
                events,
                running: RwLock::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Subscribe to progress events. Slow subscribers may observe lag;
    /// events are advisory, the queue holds authoritative state.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    /// Spawn the worker pool.
    pub async fn start(&self) {
        let mut workers = self.workers.lock().await;
        if !workers.is_empty() {
            return;
        }
        for slot in 0..self.inner.config.workers {
            let inner = Arc::clone(&self.inner);
            workers.push(tokio::spawn(async move {
                inner.worker_loop(slot).await;
            }));
        }
        info!(workers = self.inner.config.workers, "task orchestrator started");
    }

    /// Stop claiming new work and wait for in-flight tasks to finish.
    pub async fn stop(&self) {
        self.inner.shutdown.cancel();
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
        info!("task orchestrator stopped");
    }

    /// Enqueue a background extraction and report it as queued.
    pub async fn enqueue(
        &self,
        url: &str,
        owner_id: &str,
        force_refresh: bool,
    ) -> Result<Uuid, EmbedError> {
        let task = ExtractionTask::new(url, owner_id, force_refresh)
            .with_max_retries(self.inner.config.max_retries);
        let id = self.inner.queue.enqueue(task).await?;
        self.inner.emit(id, ProgressStage::Queued, 0, None);
        debug!(task_id = %id, url = %url, "task enqueued");
        Ok(id)
    }

    pub async fn status(&self, id: Uuid) -> Result<TaskStatus, EmbedError> {
        self.inner.queue.get_status(id).await
    }

    /// Cancel a task. Pending tasks go straight to `Cancelled`; running
    /// tasks are cancelled cooperatively at the next checkpoint, or killed
    /// outright when `terminate` is set.
    pub async fn cancel(&self, id: Uuid, terminate: bool) -> Result<(), EmbedError> {
        if self.inner.queue.cancel_pending(id).await? {
            debug!(task_id = %id, "pending task cancelled");
            return Ok(());
        }

        let running = self.inner.running.read().await;
        if let Some(handles) = running.get(&id) {
            if terminate {
                warn!(task_id = %id, "terminating running task");
                handles.terminate.cancel();
            } else {
                debug!(task_id = %id, "requesting cooperative cancellation");
                handles.cancel.cancel();
            }
        }
        // Already-terminal tasks are a no-op; unknown ids errored above.
        Ok(())
    }
}

impl Inner {
    fn emit(&self, task_id: Uuid, stage: ProgressStage, attempt: u32, detail: Option<String>) {
        let _ = self.events.send(TaskEvent {
            task_id,
            stage,
            attempt,
            detail,
        });
    }

    async fn worker_loop(self: Arc<Self>, slot: usize) {
        debug!(slot, "worker started");
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            match self.queue.claim_next().await {
                Ok(Some(task)) => self.process(task).await,
                Ok(None) => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(e) => {
                    error!(slot, error = %e, "queue claim failed");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
        debug!(slot, "worker stopped");
    }

    async fn process(&self, task: ExtractionTask) {
        let id = task.id;
        let attempt = task.attempt_count;
        let cancel = CancellationToken::new();
        let terminate = CancellationToken::new();

        self.running.write().await.insert(
            id,
            RunningHandles {
                cancel: cancel.clone(),
                terminate: terminate.clone(),
            },
        );

        let outcome = tokio::select! {
            _ = terminate.cancelled() => Err(EmbedError::TaskCancelled),
            outcome = tokio::time::timeout(
                self.config.hard_time_limit,
                self.run_attempt(&task, &cancel),
            ) => match outcome {
                Ok(result) => result,
                Err(_) => Err(EmbedError::TimeoutError(format!(
                    "hard time limit of {:?} exceeded",
                    self.config.hard_time_limit
                ))),
            },
        };

        self.running.write().await.remove(&id);

        match outcome {
            Ok(result_ref) => {
                if let Err(e) = self
                    .queue
                    .report(id, TaskState::Succeeded, Some(result_ref), None)
                    .await
                {
                    error!(task_id = %id, error = %e, "failed to report success");
                }
                // The Done milestone was already emitted by the enrichment
                // sequence itself.
                info!(task_id = %id, attempt, "task succeeded");
            }
            Err(EmbedError::TaskCancelled) => {
                if let Err(e) = self
                    .queue
                    .report(id, TaskState::Cancelled, None, Some("cancelled".into()))
                    .await
                {
                    error!(task_id = %id, error = %e, "failed to report cancellation");
                }
                info!(task_id = %id, attempt, "task cancelled");
            }
            Err(e) if e.is_retryable() && attempt < task.max_retries => {
                let delay = backoff_delay(
                    self.config.retry_base,
                    self.config.retry_cap,
                    attempt.saturating_sub(1),
                );
                let not_before = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::seconds(60));
                warn!(
                    task_id = %id,
                    attempt,
                    delay_secs = delay.as_secs(),
                    error = %e,
                    "attempt failed, scheduling retry"
                );
                if let Err(requeue_err) = self.queue.requeue(id, not_before, &e.to_string()).await {
                    error!(task_id = %id, error = %requeue_err, "failed to requeue");
                }
            }
            Err(e) => {
                warn!(task_id = %id, attempt, error = %e, "task failed terminally");
                if let Err(report_err) = self
                    .queue
                    .report(id, TaskState::Failed, None, Some(e.to_string()))
                    .await
                {
                    error!(task_id = %id, error = %report_err, "failed to report failure");
                }
            }
        }
    }

    /// One attempt: the shared enrichment sequence under the soft-limit
    /// watchdog, with progress milestones wired to the event channel.
    async fn run_attempt(
        &self,
        task: &ExtractionTask,
        cancel: &CancellationToken,
    ) -> Result<String, EmbedError> {
        let id = task.id;
        let attempt = task.attempt_count;
        let progress = |stage: ProgressStage| {
            self.emit(id, stage, attempt, None);
        };

        let work = self.service.enrich(
            &task.url,
            EnrichContext {
                owner_id: &task.owner_id,
                force_refresh: task.force_refresh,
                options: Default::default(),
                skip_assets: false,
                cancel: Some(cancel),
                progress: Some(&progress),
            },
        );
        tokio::pin!(work);

        let soft = tokio::time::sleep(self.config.soft_time_limit);
        tokio::pin!(soft);

        let entry = tokio::select! {
            result = &mut work => result?,
            _ = &mut soft => {
                warn!(task_id = %id, limit = ?self.config.soft_time_limit, "soft time limit exceeded");
                (&mut work).await?
            }
        };

        Ok(entry.url_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_secs(60);
        let cap = Duration::from_secs(300);

        assert_eq!(backoff_delay(base, cap, 0), Duration::from_secs(60));
        assert_eq!(backoff_delay(base, cap, 1), Duration::from_secs(120));
        assert_eq!(backoff_delay(base, cap, 2), Duration::from_secs(240));
        // Ceiling from here on.
        assert_eq!(backoff_delay(base, cap, 3), cap);
        assert_eq!(backoff_delay(base, cap, 30), cap);
        // Absurd attempt counts must not overflow.
        assert_eq!(backoff_delay(base, cap, u32::MAX), cap);
    }
}
