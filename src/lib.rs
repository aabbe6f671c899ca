// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod classify;
pub mod config;
pub mod features;
pub mod insight;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod ratelimit;
pub mod store;
pub mod tasks;

// ---- Re-exports for stable public API ----
pub use crate::classify::{classify, SeverityThresholds};
pub use crate::config::{build_gateway, build_generation_client, Settings};
pub use crate::features::{FeatureError, FeatureExtractor};
pub use crate::insight::{
    AnomalyAssessment, FeatureSet, GenerationResult, InputData, InputType, Insight,
    InsightRequest, Prompt, SeverityLevel,
};
pub use crate::llm::{
    DynGenerationClient, GenerationClient, GenerationConfig, GenerationError,
    GenerationExhausted, RetryPolicy, RetryingGateway,
};
pub use crate::orchestrator::{InsightError, InsightOrchestrator, PipelineStage};
pub use crate::prompt::PromptBuilder;
pub use crate::ratelimit::{Admission, CounterStore, MemoryCounterStore, RateLimiter};
pub use crate::store::{InsightStore, MemoryInsightStore};
pub use crate::tasks::{MemoryTaskStore, TaskQueueAdapter, TaskRecord, TaskStatus, TaskStore};
