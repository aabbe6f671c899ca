//! Demo that runs one synchronous orchestration and one queued task against
//! the mock backend, printing the resulting insight JSON.

use std::sync::Arc;
use std::time::Duration;

use pythia_insights::tasks::MemoryTaskStore;
use pythia_insights::{
    build_gateway, InsightOrchestrator, InsightRequest, MemoryCounterStore, MemoryInsightStore,
    RateLimiter, Settings, TaskQueueAdapter,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let mut settings = Settings::from_env();
    settings.llm_provider = "mock".to_string();

    let gateway = build_gateway(&settings)?;
    let limiter = RateLimiter::new(
        Arc::new(MemoryCounterStore::new()),
        settings.rate_limit_requests,
        settings.rate_limit_window(),
    );
    let insights = Arc::new(MemoryInsightStore::new());
    let orchestrator = Arc::new(InsightOrchestrator::new(
        gateway,
        limiter,
        settings.thresholds(),
        insights,
    ));

    // Synchronous path.
    let request = InsightRequest::metrics(
        "demo-user",
        "demo-tenant",
        "weekly_active_users",
        vec![9_800.0, 10_050.0, 10_200.0, 15_000.0],
    );
    let insight = orchestrator.process(&request).await?;
    println!("{}", serde_json::to_string_pretty(&insight)?);

    // Asynchronous path: submit, then poll until terminal.
    let queue = TaskQueueAdapter::spawn(
        orchestrator,
        Arc::new(MemoryTaskStore::new()),
        settings.worker_count,
        settings.task_queue_depth,
    );
    let task_id = queue.submit(request).await?;
    println!("submitted task {task_id}");

    loop {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let record = queue.status(task_id).await?.expect("record exists");
        if record.status.is_terminal() {
            println!("task finished: {}", serde_json::to_string_pretty(&record)?);
            break;
        }
    }

    queue.shutdown().await;
    println!("insight-demo done");
    Ok(())
}
