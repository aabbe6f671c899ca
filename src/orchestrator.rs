//! orchestrator.rs — The synchronous insight pipeline.
//!
//! Gate → extract → classify → prompt → generate → assemble. Pure stages are
//! composed here with the two network-bound boundaries (counter store,
//! generation gateway); any stage failure is wrapped with its stage tag so
//! callers can report uniformly without losing the cause.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classify::{classify, SeverityThresholds};
use crate::features::{FeatureError, FeatureExtractor};
use crate::insight::{InputSummary, Insight, InsightRequest};
use crate::llm::{GenerationExhausted, RetryingGateway};
use crate::prompt::PromptBuilder;
use crate::ratelimit::{Admission, RateLimiter};
use crate::store::InsightStore;

/// Pipeline stages, used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Admission,
    FeatureExtraction,
    Classification,
    PromptAssembly,
    Generation,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineStage::Admission => "admission",
            PipelineStage::FeatureExtraction => "feature_extraction",
            PipelineStage::Classification => "classification",
            PipelineStage::PromptAssembly => "prompt_assembly",
            PipelineStage::Generation => "generation",
        };
        f.write_str(s)
    }
}

/// Cause of a stage failure, kept typed so callers can still match on kind.
#[derive(Debug, Error)]
pub enum StageFailure {
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Generation(#[from] GenerationExhausted),
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

/// Terminal pipeline failures. Rate-limit denial and generation exhaustion
/// stay distinct: "try again later" is not "backend unavailable".
#[derive(Debug, Error)]
pub enum InsightError {
    #[error("rate limit exceeded; retry after {}s", retry_after.as_secs())]
    RateLimitExceeded { retry_after: Duration },
    #[error("pipeline stage {stage} failed: {source}")]
    Stage {
        stage: PipelineStage,
        #[source]
        source: StageFailure,
    },
}

impl InsightError {
    fn stage(stage: PipelineStage, source: impl Into<StageFailure>) -> Self {
        InsightError::Stage {
            stage,
            source: source.into(),
        }
    }
}

pub struct InsightOrchestrator {
    extractor: FeatureExtractor,
    prompt_builder: PromptBuilder,
    gateway: RetryingGateway,
    limiter: RateLimiter,
    thresholds: SeverityThresholds,
    insights: Arc<dyn InsightStore>,
}

impl InsightOrchestrator {
    pub fn new(
        gateway: RetryingGateway,
        limiter: RateLimiter,
        thresholds: SeverityThresholds,
        insights: Arc<dyn InsightStore>,
    ) -> Self {
        Self {
            extractor: FeatureExtractor::new(),
            prompt_builder: PromptBuilder::new(),
            gateway,
            limiter,
            thresholds,
            insights,
        }
    }

    /// Run the full pipeline for one request.
    pub async fn process(&self, request: &InsightRequest) -> Result<Insight, InsightError> {
        let started = Instant::now();

        // (a) Gate first; a denied tenant never pays for extraction.
        let admission = self
            .limiter
            .admit(&request.tenant_id)
            .await
            .map_err(|e| InsightError::stage(PipelineStage::Admission, e))?;
        if let Admission::Denied { retry_after } = admission {
            info!(
                tenant = %request.tenant_id,
                retry_after_secs = retry_after.as_secs(),
                "request denied by rate limiter"
            );
            return Err(InsightError::RateLimitExceeded { retry_after });
        }

        // (b) Extract.
        let features = self
            .extractor
            .extract(request)
            .map_err(|e| InsightError::stage(PipelineStage::FeatureExtraction, e))?;
        debug!(
            change_percent = features.change_percent,
            severity_hint = %features.severity_hint,
            "features extracted"
        );

        // (c) Classify; per-request threshold overrides win.
        let thresholds = request
            .context
            .as_ref()
            .and_then(|c| c.thresholds)
            .unwrap_or(self.thresholds);
        let assessment = classify(&features, &thresholds);

        // (d) Prompt.
        let subject = request.subject();
        let prompt =
            self.prompt_builder
                .build(&subject, &features, &assessment, request.input_type);

        // (e) Generate.
        let generation = self
            .gateway
            .generate(&prompt)
            .await
            .map_err(|e| InsightError::stage(PipelineStage::Generation, e))?;

        // (f) Assemble. Immutable from here on.
        let processing_time_ms = started.elapsed().as_millis() as u64;
        let insight = Insight {
            insight_id: Uuid::new_v4(),
            user_id: request.user_id.clone(),
            tenant_id: request.tenant_id.clone(),
            created_at: Utc::now(),
            input_summary: InputSummary {
                subject,
                data_points: request.data_points(),
            },
            features,
            assessment,
            generation,
            processing_time_ms,
        };

        counter!("insights_generated_total").increment(1);
        histogram!("insight_processing_ms").record(processing_time_ms as f64);
        info!(
            insight_id = %insight.insight_id,
            tenant = %insight.tenant_id,
            severity = %insight.assessment.severity,
            provider = %insight.generation.provider_used,
            fallback = insight.generation.fallback_used,
            elapsed_ms = processing_time_ms,
            "insight generated"
        );

        // Persistence is post-hoc: a storage failure never degrades the
        // response already in hand.
        if let Err(e) = self.insights.persist(&insight).await {
            warn!(insight_id = %insight.insight_id, error = %e, "insight persistence failed");
        }

        Ok(insight)
    }
}
