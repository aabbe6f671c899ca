//! classify.rs — Severity scoring from extracted features.
//!
//! Pure, deterministic, no I/O. Severity is the highest tier whose cutoff is
//! met or exceeded by `|change_percent|`; exact equality rounds UP to the
//! stricter tier. Anomaly detection additionally consults the z-score of the
//! latest value against the series.

use serde::{Deserialize, Serialize};

use crate::insight::{AnomalyAssessment, FeatureSet, SeverityLevel};

/// Values beyond this many standard deviations are anomalous regardless of
/// the percent-change tier.
pub const Z_SCORE_ANOMALY_THRESHOLD: f64 = 3.0;

/// Percent-change cutoffs for the escalation tiers. Cutoffs are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityThresholds {
    pub critical_pct: f64,
    pub high_pct: f64,
    pub medium_pct: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            critical_pct: 50.0,
            high_pct: 25.0,
            medium_pct: 10.0,
        }
    }
}

impl SeverityThresholds {
    /// Map an absolute percent change to its tier. Equality hits the
    /// stricter tier; below `medium_pct` only a zero change is `None`.
    pub fn tier_for(&self, abs_change_pct: f64) -> SeverityLevel {
        if abs_change_pct >= self.critical_pct {
            SeverityLevel::Critical
        } else if abs_change_pct >= self.high_pct {
            SeverityLevel::High
        } else if abs_change_pct >= self.medium_pct {
            SeverityLevel::Medium
        } else if abs_change_pct > 0.0 {
            SeverityLevel::Low
        } else {
            SeverityLevel::None
        }
    }

    fn cutoff_for(&self, tier: SeverityLevel) -> Option<f64> {
        match tier {
            SeverityLevel::Critical => Some(self.critical_pct),
            SeverityLevel::High => Some(self.high_pct),
            SeverityLevel::Medium => Some(self.medium_pct),
            _ => None,
        }
    }
}

/// Classify one feature set against the configured thresholds.
pub fn classify(features: &FeatureSet, thresholds: &SeverityThresholds) -> AnomalyAssessment {
    let abs_change = features.change_percent.abs();
    let severity = thresholds.tier_for(abs_change);

    let mut rationale = Vec::new();

    match thresholds.cutoff_for(severity) {
        Some(cutoff) => rationale.push(format!(
            "change of {:+.2}% meets the {} cutoff ({}%)",
            features.change_percent, severity, cutoff
        )),
        None => rationale.push(format!(
            "change of {:+.2}% is below the {}% medium cutoff",
            features.change_percent, thresholds.medium_pct
        )),
    }

    if features.baseline_undefined {
        rationale.push(
            "previous value was zero; percent change is a capped absolute-delta signal"
                .to_string(),
        );
    }

    let mut z_flagged = false;
    if let Some(stats) = &features.stats {
        if stats.z_score.abs() > Z_SCORE_ANOMALY_THRESHOLD {
            z_flagged = true;
            rationale.push(format!(
                "latest value is {:.2} standard deviations from the series mean",
                stats.z_score.abs()
            ));
        }
    }

    let is_anomalous = severity >= SeverityLevel::High || z_flagged;

    AnomalyAssessment {
        is_anomalous,
        severity,
        rationale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insight::DispersionStats;

    fn features(change_percent: f64) -> FeatureSet {
        FeatureSet {
            previous_value: 100.0,
            current_value: 100.0 + change_percent,
            change_absolute: change_percent,
            change_percent,
            baseline_undefined: false,
            stats: None,
            severity_hint: SeverityLevel::None,
        }
    }

    #[test]
    fn tiers_match_default_cutoffs() {
        let t = SeverityThresholds::default();
        assert_eq!(classify(&features(60.0), &t).severity, SeverityLevel::Critical);
        assert_eq!(classify(&features(-30.0), &t).severity, SeverityLevel::High);
        assert_eq!(classify(&features(12.0), &t).severity, SeverityLevel::Medium);
        assert_eq!(classify(&features(4.0), &t).severity, SeverityLevel::Low);
        assert_eq!(classify(&features(0.0), &t).severity, SeverityLevel::None);
    }

    #[test]
    fn exact_cutoff_rounds_up_to_stricter_tier() {
        let t = SeverityThresholds::default();
        assert_eq!(classify(&features(25.0), &t).severity, SeverityLevel::High);
        assert_eq!(classify(&features(50.0), &t).severity, SeverityLevel::Critical);
        assert_eq!(classify(&features(10.0), &t).severity, SeverityLevel::Medium);
    }

    #[test]
    fn negative_changes_use_magnitude() {
        let t = SeverityThresholds::default();
        assert_eq!(classify(&features(-25.0), &t).severity, SeverityLevel::High);
    }

    #[test]
    fn z_score_beyond_threshold_flags_anomaly() {
        let t = SeverityThresholds::default();
        let mut f = features(4.0); // Low tier on its own
        f.stats = Some(DispersionStats {
            mean: 100.0,
            stddev: 1.0,
            z_score: 4.2,
            sample_count: 12,
        });
        let a = classify(&f, &t);
        assert_eq!(a.severity, SeverityLevel::Low);
        assert!(a.is_anomalous);
        assert!(a.rationale.iter().any(|r| r.contains("standard deviations")));
    }

    #[test]
    fn high_tier_is_anomalous_without_stats() {
        let t = SeverityThresholds::default();
        let a = classify(&features(30.0), &t);
        assert!(a.is_anomalous);
    }

    #[test]
    fn zero_baseline_fallback_is_named_in_rationale() {
        let t = SeverityThresholds::default();
        let mut f = features(1000.0);
        f.baseline_undefined = true;
        let a = classify(&f, &t);
        assert_eq!(a.severity, SeverityLevel::Critical);
        assert!(a.rationale.iter().any(|r| r.contains("absolute-delta")));
    }
}
