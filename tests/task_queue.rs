// tests/task_queue.rs
// Async path: immediate submission, worker execution, monotonic status.

use std::sync::Arc;
use std::time::Duration;

use pythia_insights::tasks::MemoryTaskStore;
use pythia_insights::{
    build_gateway, InputData, InputType, InsightOrchestrator, InsightRequest, MemoryCounterStore,
    MemoryInsightStore, RateLimiter, Settings, TaskQueueAdapter, TaskStatus,
};

fn rank(status: TaskStatus) -> u8 {
    match status {
        TaskStatus::Submitted => 0,
        TaskStatus::Running => 1,
        TaskStatus::Succeeded | TaskStatus::Failed => 2,
    }
}

fn mock_orchestrator() -> Arc<InsightOrchestrator> {
    let mut settings = Settings::default();
    settings.llm_provider = "mock".to_string();
    let gateway = build_gateway(&settings).expect("gateway builds");
    let limiter = RateLimiter::new(
        Arc::new(MemoryCounterStore::new()),
        1000,
        Duration::from_secs(60),
    );
    Arc::new(InsightOrchestrator::new(
        gateway,
        limiter,
        settings.thresholds(),
        Arc::new(MemoryInsightStore::new()),
    ))
}

#[tokio::test]
async fn submit_returns_immediately_and_task_succeeds() {
    let queue = TaskQueueAdapter::spawn(mock_orchestrator(), Arc::new(MemoryTaskStore::new()), 2, 16);

    let request = InsightRequest::metrics("u1", "acme", "signups", vec![10_200.0, 15_000.0]);
    let task_id = queue.submit(request).await.expect("submit enqueues");

    // The record exists from the moment submit returns.
    let first = queue.status(task_id).await.unwrap().expect("record exists");
    let mut last_rank = rank(first.status);

    // Poll to completion; observed statuses must never move backwards.
    let record = loop {
        let record = queue.status(task_id).await.unwrap().expect("record exists");
        let r = rank(record.status);
        assert!(r >= last_rank, "status regressed: {:?}", record.status);
        last_rank = r;
        if record.status.is_terminal() {
            break record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    assert_eq!(record.status, TaskStatus::Succeeded);
    let insight = record.insight.expect("succeeded task carries its insight");
    assert_eq!(insight.tenant_id, "acme");
    assert!(record.error.is_none());

    queue.shutdown().await;
}

#[tokio::test]
async fn failed_orchestration_is_recorded_not_requeued() {
    let store = Arc::new(MemoryTaskStore::new());
    let queue = TaskQueueAdapter::spawn(mock_orchestrator(), store.clone(), 1, 16);

    // Payload/type mismatch fails in feature extraction.
    let request = InsightRequest {
        user_id: "u1".into(),
        tenant_id: "acme".into(),
        input_type: InputType::Metrics,
        data: InputData::Text {
            content: "nope".into(),
        },
        context: None,
    };
    let task_id = queue.submit(request).await.unwrap();

    let record = loop {
        let record = queue.status(task_id).await.unwrap().unwrap();
        if record.status.is_terminal() {
            break record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    assert_eq!(record.status, TaskStatus::Failed);
    let error = record.error.expect("failed task carries its error");
    assert!(error.contains("feature_extraction"), "error was: {error}");
    assert!(record.insight.is_none());

    queue.shutdown().await;
}

#[tokio::test]
async fn workers_drain_many_jobs_concurrently() {
    let queue = TaskQueueAdapter::spawn(mock_orchestrator(), Arc::new(MemoryTaskStore::new()), 4, 64);

    let mut ids = Vec::new();
    for i in 0..20 {
        let request = InsightRequest::metrics(
            format!("u{i}"),
            "acme",
            "throughput",
            vec![100.0, 100.0 + i as f64],
        );
        ids.push(queue.submit(request).await.unwrap());
    }

    for task_id in ids {
        let record = loop {
            let record = queue.status(task_id).await.unwrap().unwrap();
            if record.status.is_terminal() {
                break record;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        assert_eq!(record.status, TaskStatus::Succeeded);
    }

    queue.shutdown().await;
}

#[tokio::test]
async fn unknown_task_id_reads_as_none() {
    let queue = TaskQueueAdapter::spawn(mock_orchestrator(), Arc::new(MemoryTaskStore::new()), 1, 4);
    let missing = queue.status(uuid::Uuid::new_v4()).await.unwrap();
    assert!(missing.is_none());
    queue.shutdown().await;
}
