//! features.rs — Pure statistical feature extraction.
//!
//! `extract` is deterministic and does no I/O. Dispatch is a
//! capability-keyed table (`InputType` → extractor fn), so new input kinds
//! register a function instead of growing a type hierarchy.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use thiserror::Error;

use crate::insight::{
    round2, DispersionStats, FeatureSet, InputData, InputType, InsightRequest, SeverityLevel,
};

/// Cap applied to the zero-baseline fallback signal (percent points).
const ZERO_BASELINE_CAP_PCT: f64 = 1000.0;

/// Minimum samples before dispersion statistics are meaningful.
const MIN_SAMPLES_FOR_STATS: usize = 3;

/// Words that escalate the severity hint for text input.
const URGENCY_KEYWORDS: [&str; 4] = ["urgent", "critical", "emergency", "immediate"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeatureError {
    #[error("unsupported input type: {0}")]
    UnsupportedInputType(String),
    #[error("need at least {needed} values, got {got}")]
    InsufficientData { needed: usize, got: usize },
}

/// Raised when a percent change against a zero baseline is requested.
/// Absorbed inside `extract`: the caller receives the capped absolute-delta
/// fallback signal instead.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("percent change undefined for zero previous value")]
pub struct DivisionUndefined;

type ExtractorFn = fn(&InputData) -> Result<FeatureSet, FeatureError>;

static EXTRACTORS: Lazy<HashMap<InputType, ExtractorFn>> = Lazy::new(|| {
    let mut m: HashMap<InputType, ExtractorFn> = HashMap::new();
    m.insert(InputType::Metrics, extract_metrics);
    m.insert(InputType::Text, extract_text);
    m.insert(InputType::TimeSeries, extract_timeseries);
    m
});

#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract a feature set for the request's input type.
    pub fn extract(&self, request: &InsightRequest) -> Result<FeatureSet, FeatureError> {
        self.extract_parts(request.input_type, &request.data)
    }

    /// Dispatch on the declared input type; the payload must match it.
    pub fn extract_parts(
        &self,
        input_type: InputType,
        data: &InputData,
    ) -> Result<FeatureSet, FeatureError> {
        let f = EXTRACTORS
            .get(&input_type)
            .ok_or_else(|| FeatureError::UnsupportedInputType(input_type.as_str().into()))?;
        f(data)
    }
}

/// Percent change of `current` against `previous`. The zero baseline is the
/// caller's problem; `extract_metrics` maps it to the fallback signal.
pub fn percent_change(previous: f64, current: f64) -> Result<f64, DivisionUndefined> {
    if previous == 0.0 {
        return Err(DivisionUndefined);
    }
    Ok((current - previous) / previous.abs() * 100.0)
}

fn extract_metrics(data: &InputData) -> Result<FeatureSet, FeatureError> {
    let values = match data {
        InputData::Metrics { values, .. } => values.as_slice(),
        _ => return Err(FeatureError::UnsupportedInputType("metrics".into())),
    };
    extract_from_values(values)
}

fn extract_timeseries(data: &InputData) -> Result<FeatureSet, FeatureError> {
    let values: Vec<f64> = match data {
        InputData::TimeSeries { points, .. } => points.iter().map(|p| p.value).collect(),
        _ => return Err(FeatureError::UnsupportedInputType("timeseries".into())),
    };
    extract_from_values(&values)
}

fn extract_from_values(values: &[f64]) -> Result<FeatureSet, FeatureError> {
    if values.len() < 2 {
        return Err(FeatureError::InsufficientData {
            needed: 2,
            got: values.len(),
        });
    }

    let previous_value = values[values.len() - 2];
    let current_value = values[values.len() - 1];
    let change_absolute = current_value - previous_value;

    let (change_percent, baseline_undefined) = match percent_change(previous_value, current_value)
    {
        Ok(pct) => (pct, false),
        // Zero baseline: report a capped absolute-delta signal instead.
        Err(DivisionUndefined) => {
            let pct = if current_value == 0.0 {
                0.0
            } else if current_value > 0.0 {
                ZERO_BASELINE_CAP_PCT
            } else {
                -ZERO_BASELINE_CAP_PCT
            };
            (pct, true)
        }
    };

    let stats = dispersion_stats(values);
    let change_percent = round2(change_percent);

    Ok(FeatureSet {
        previous_value,
        current_value,
        change_absolute: round2(change_absolute),
        change_percent,
        baseline_undefined,
        stats,
        severity_hint: crate::classify::SeverityThresholds::default()
            .tier_for(change_percent.abs()),
    })
}

fn extract_text(data: &InputData) -> Result<FeatureSet, FeatureError> {
    let content = match data {
        InputData::Text { content } => content.as_str(),
        _ => return Err(FeatureError::UnsupportedInputType("text".into())),
    };
    if content.trim().is_empty() {
        return Err(FeatureError::InsufficientData { needed: 1, got: 0 });
    }

    let word_count = content.split_whitespace().count() as f64;

    let lowered = content.to_lowercase();
    let urgent = URGENCY_KEYWORDS.iter().any(|kw| lowered.contains(kw));
    let severity_hint = if urgent {
        SeverityLevel::High
    } else {
        SeverityLevel::Medium
    };

    Ok(FeatureSet {
        previous_value: 0.0,
        current_value: word_count,
        change_absolute: word_count,
        change_percent: 0.0,
        baseline_undefined: false,
        stats: None,
        severity_hint,
    })
}

/// Mean, population standard deviation, and z-score of the last value.
/// Returns `None` when the series is too short to say anything.
fn dispersion_stats(values: &[f64]) -> Option<DispersionStats> {
    if values.len() < MIN_SAMPLES_FOR_STATS {
        return None;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    let current = values[values.len() - 1];
    let z_score = if stddev == 0.0 {
        0.0
    } else {
        (current - mean) / stddev
    };

    Some(DispersionStats {
        mean: round2(mean),
        stddev: round2(stddev),
        z_score: round2(z_score),
        sample_count: values.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics_request(values: Vec<f64>) -> InsightRequest {
        InsightRequest::metrics("u1", "t1", "revenue", values)
    }

    #[test]
    fn percent_change_matches_formula() {
        let f = FeatureExtractor::new()
            .extract(&metrics_request(vec![10_200.0, 15_000.0]))
            .unwrap();
        assert_eq!(f.previous_value, 10_200.0);
        assert_eq!(f.current_value, 15_000.0);
        assert_eq!(f.change_absolute, 4_800.0);
        assert!((f.change_percent - 47.06).abs() < 1e-9);
        assert!(!f.baseline_undefined);
    }

    #[test]
    fn negative_baseline_uses_magnitude_for_the_denominator() {
        let pct = percent_change(-100.0, -150.0).unwrap();
        assert!((pct - (-50.0)).abs() < 1e-9);
    }

    #[test]
    fn zero_previous_value_falls_back_to_capped_signal() {
        let f = FeatureExtractor::new()
            .extract(&metrics_request(vec![0.0, 50.0]))
            .unwrap();
        assert_eq!(f.change_percent, 1000.0);
        assert!(f.baseline_undefined);

        let f = FeatureExtractor::new()
            .extract(&metrics_request(vec![0.0, -50.0]))
            .unwrap();
        assert_eq!(f.change_percent, -1000.0);

        let f = FeatureExtractor::new()
            .extract(&metrics_request(vec![0.0, 0.0]))
            .unwrap();
        assert_eq!(f.change_percent, 0.0);
        assert!(f.baseline_undefined);
    }

    #[test]
    fn short_series_is_rejected() {
        let err = FeatureExtractor::new()
            .extract(&metrics_request(vec![42.0]))
            .unwrap_err();
        assert_eq!(err, FeatureError::InsufficientData { needed: 2, got: 1 });
    }

    #[test]
    fn stats_appear_from_three_samples() {
        let f = FeatureExtractor::new()
            .extract(&metrics_request(vec![10.0, 20.0]))
            .unwrap();
        assert!(f.stats.is_none());

        let f = FeatureExtractor::new()
            .extract(&metrics_request(vec![10.0, 10.0, 10.0, 40.0]))
            .unwrap();
        let stats = f.stats.unwrap();
        assert_eq!(stats.sample_count, 4);
        assert_eq!(stats.mean, 17.5);
        assert!(stats.z_score > 1.0);
    }

    #[test]
    fn flat_series_has_zero_z_score() {
        let f = FeatureExtractor::new()
            .extract(&metrics_request(vec![5.0, 5.0, 5.0]))
            .unwrap();
        let stats = f.stats.unwrap();
        assert_eq!(stats.stddev, 0.0);
        assert_eq!(stats.z_score, 0.0);
    }

    #[test]
    fn text_features_count_words_and_scan_urgency() {
        let f = FeatureExtractor::new()
            .extract(&InsightRequest::text("u1", "t1", "All systems nominal today"))
            .unwrap();
        assert_eq!(f.current_value, 4.0);
        assert_eq!(f.severity_hint, SeverityLevel::Medium);

        let f = FeatureExtractor::new()
            .extract(&InsightRequest::text("u1", "t1", "URGENT: database latency spike"))
            .unwrap();
        assert_eq!(f.severity_hint, SeverityLevel::High);
    }

    #[test]
    fn extraction_is_deterministic() {
        let req = metrics_request(vec![10.0, 12.0, 9.0, 30.0]);
        let ex = FeatureExtractor::new();
        let a = serde_json::to_string(&ex.extract(&req).unwrap()).unwrap();
        let b = serde_json::to_string(&ex.extract(&req).unwrap()).unwrap();
        assert_eq!(a, b);
    }
}
