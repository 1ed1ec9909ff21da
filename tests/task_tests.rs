use std::sync::Arc;
use std::time::Duration;
use url_embed::{
    EmbedError, EmbedService, MemoryTaskQueue, OrchestratorConfig, ProgressStage, TaskOrchestrator,
    TaskState, TaskStatus,
};
use uuid::Uuid;

fn orchestrator() -> TaskOrchestrator {
    let queue = Arc::new(MemoryTaskQueue::new());
    let service = Arc::new(EmbedService::new());
    TaskOrchestrator::with_config(
        queue,
        service,
        OrchestratorConfig {
            workers: 2,
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        },
    )
}

async fn wait_for_terminal(orchestrator: &TaskOrchestrator, id: Uuid) -> TaskStatus {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let status = orchestrator.status(id).await.unwrap();
        if status.state.is_terminal() {
            return status;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task did not reach a terminal state: {status:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn unsupported_url_fails_terminally_without_retries() {
    let orchestrator = orchestrator();
    orchestrator.start().await;

    // No provider and no custom platform: non-retryable, no network touched.
    let id = orchestrator
        .enqueue("https://blog.example.com/post", "owner-1", false)
        .await
        .unwrap();

    let status = wait_for_terminal(&orchestrator, id).await;
    assert_eq!(status.state, TaskState::Failed);
    assert_eq!(status.attempt_count, 1, "non-retryable errors skip retries");
    assert!(status.last_error.unwrap().contains("not supported"));

    orchestrator.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelling_a_pending_task_skips_running_entirely() {
    let orchestrator = orchestrator();
    // Workers not started: the task stays pending.

    let id = orchestrator
        .enqueue("https://www.youtube.com/watch?v=x", "owner-1", false)
        .await
        .unwrap();
    orchestrator.cancel(id, false).await.unwrap();

    let status = orchestrator.status(id).await.unwrap();
    assert_eq!(status.state, TaskState::Cancelled);
    assert_eq!(status.attempt_count, 0, "never entered Running");

    // Starting the workers afterwards must not resurrect it.
    orchestrator.start().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let status = orchestrator.status(id).await.unwrap();
    assert_eq!(status.state, TaskState::Cancelled);

    orchestrator.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn status_of_unknown_task_is_a_distinct_error() {
    let orchestrator = orchestrator();

    let err = orchestrator.status(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, EmbedError::TaskNotFound(_)));

    let err = orchestrator.cancel(Uuid::new_v4(), false).await.unwrap_err();
    assert!(matches!(err, EmbedError::TaskNotFound(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn enqueue_emits_a_queued_milestone() {
    let orchestrator = orchestrator();
    let mut events = orchestrator.subscribe();

    let id = orchestrator
        .enqueue("https://www.youtube.com/watch?v=x", "owner-1", false)
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("event within a second")
        .unwrap();
    assert_eq!(event.task_id, id);
    assert_eq!(event.stage, ProgressStage::Queued);
    assert_eq!(event.attempt, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_after_terminal_state_is_a_noop() {
    let orchestrator = orchestrator();
    orchestrator.start().await;

    let id = orchestrator
        .enqueue("https://blog.example.com/post", "owner-1", false)
        .await
        .unwrap();
    let status = wait_for_terminal(&orchestrator, id).await;
    assert_eq!(status.state, TaskState::Failed);

    orchestrator.cancel(id, false).await.unwrap();
    assert_eq!(
        orchestrator.status(id).await.unwrap().state,
        TaskState::Failed,
        "terminal states are never rewritten by cancel"
    );

    orchestrator.stop().await;
}
