//! insight.rs — Core data model for the insight pipeline.
//!
//! Request, features, severity, assessment, generation output, and the final
//! `Insight` artifact. The chain FeatureSet → AnomalyAssessment → Prompt →
//! GenerationResult is one-way: every struct here is assembled once and
//! never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classify::SeverityThresholds;

/// Kind of payload a request carries. Dispatch in the feature extractor is
/// keyed by this value, not by the payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Metrics,
    Text,
    #[serde(rename = "timeseries")]
    TimeSeries,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::Metrics => "metrics",
            InputType::Text => "text",
            InputType::TimeSeries => "timeseries",
        }
    }
}

/// One timestamped observation in a time series payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Typed payload, one variant per `InputType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputData {
    Metrics {
        metric_name: String,
        values: Vec<f64>,
    },
    TimeSeries {
        series_name: String,
        points: Vec<TimeSeriesPoint>,
    },
    Text {
        content: String,
    },
}

/// Optional per-request tuning supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<f64>,
    /// Per-request severity cutoffs; defaults come from `Settings`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<SeverityThresholds>,
}

/// Immutable once accepted; everything downstream derives from this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightRequest {
    pub user_id: String,
    pub tenant_id: String,
    pub input_type: InputType,
    pub data: InputData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextConfig>,
}

impl InsightRequest {
    /// Convenience constructor for the common metrics case.
    pub fn metrics(
        user_id: impl Into<String>,
        tenant_id: impl Into<String>,
        metric_name: impl Into<String>,
        values: Vec<f64>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            tenant_id: tenant_id.into(),
            input_type: InputType::Metrics,
            data: InputData::Metrics {
                metric_name: metric_name.into(),
                values,
            },
            context: None,
        }
    }

    pub fn text(
        user_id: impl Into<String>,
        tenant_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            tenant_id: tenant_id.into(),
            input_type: InputType::Text,
            data: InputData::Text {
                content: content.into(),
            },
            context: None,
        }
    }

    /// Human-readable subject of the analysis, used in prompts and summaries.
    pub fn subject(&self) -> String {
        match &self.data {
            InputData::Metrics { metric_name, .. } => {
                if metric_name.trim().is_empty() {
                    "Unknown Metric".to_string()
                } else {
                    metric_name.clone()
                }
            }
            InputData::Text { .. } => "Text Analysis".to_string(),
            InputData::TimeSeries { series_name, .. } => {
                if series_name.trim().is_empty() {
                    "Time Series".to_string()
                } else {
                    series_name.clone()
                }
            }
        }
    }

    /// Number of observations carried by the payload.
    pub fn data_points(&self) -> usize {
        match &self.data {
            InputData::Metrics { values, .. } => values.len(),
            InputData::TimeSeries { points, .. } => points.len(),
            InputData::Text { .. } => 1,
        }
    }
}

/// Ordered escalation tiers. `Ord` follows escalation, so
/// `SeverityLevel::High > SeverityLevel::Medium` holds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl SeverityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityLevel::None => "none",
            SeverityLevel::Low => "low",
            SeverityLevel::Medium => "medium",
            SeverityLevel::High => "high",
            SeverityLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispersion statistics over the supplied series; present when the series
/// carries at least three samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispersionStats {
    pub mean: f64,
    pub stddev: f64,
    /// Z-score of the latest value against the full series; 0.0 when the
    /// series has no variance.
    pub z_score: f64,
    pub sample_count: usize,
}

/// Statistical fingerprint of one request. Produced once, immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub previous_value: f64,
    pub current_value: f64,
    pub change_absolute: f64,
    pub change_percent: f64,
    /// True when `previous_value` was zero and `change_percent` is the
    /// capped absolute-delta fallback signal rather than a real ratio.
    #[serde(default)]
    pub baseline_undefined: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<DispersionStats>,
    /// Extractor's own severity estimate under default thresholds. The
    /// classifier is authoritative; this is informational.
    pub severity_hint: SeverityLevel,
}

/// Severity verdict plus the ordered signals that produced it.
/// Pure function of `FeatureSet` + thresholds, no hidden state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAssessment {
    pub is_anomalous: bool,
    pub severity: SeverityLevel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rationale: Vec<String>,
}

/// Rendered prompt handed to a generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub template_id: String,
    pub rendered_text: String,
}

/// Structured output of one successful generation call, stamped by the
/// gateway with the provider that actually produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub summary: String,
    /// The model may adjust the rule-based tier; absent when it declined to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<SeverityLevel>,
    /// Always within [0.0, 1.0]; values outside fail structural validation.
    pub confidence: f32,
    pub recommended_actions: Vec<String>,
    pub key_findings: Vec<String>,
    pub provider_used: String,
    pub model_version: String,
    pub fallback_used: bool,
    pub latency_ms: u64,
}

/// Brief description of what was analyzed, carried on the final artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSummary {
    pub subject: String,
    pub data_points: usize,
}

/// Final artifact of one orchestration. Immutable once assembled; handed to
/// the persistence collaborator post-hoc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub insight_id: Uuid,
    pub user_id: String,
    pub tenant_id: String,
    pub created_at: DateTime<Utc>,
    pub input_summary: InputSummary,
    pub features: FeatureSet,
    pub assessment: AnomalyAssessment,
    pub generation: GenerationResult,
    pub processing_time_ms: u64,
}

/// Clamp into [0.0, 1.0].
pub fn clamp01(x: f32) -> f32 {
    if x < 0.0 {
        0.0
    } else if x > 1.0 {
        1.0
    } else {
        x
    }
}

/// Round to two decimal places, matching the wire format of feature values.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
