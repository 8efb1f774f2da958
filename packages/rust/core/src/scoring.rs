//! Confidence scoring from source signals.

use errorpress_shared::{Candidate, ScoringConfig, SignalWeight, Signals};

/// Weighted mean of the configured signals a candidate reports.
///
/// Weights are renormalized over the signals present, so a Reddit post is not
/// penalized for lacking `view_count`. No usable signal scores 0. The fold
/// walks the weight table in key order, which keeps the result bit-identical
/// across runs.
pub fn confidence(signals: &Signals, config: &ScoringConfig) -> f64 {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;

    for (name, signal) in &config.signals {
        if signal.weight <= 0.0 {
            continue;
        }
        let Some(&raw) = signals.get(name) else {
            continue;
        };
        if !raw.is_finite() {
            continue;
        }
        weighted += signal.weight * normalized(raw, signal);
        total_weight += signal.weight;
    }

    if total_weight == 0.0 {
        return 0.0;
    }
    (weighted / total_weight).clamp(0.0, 1.0)
}

/// Score a candidate in place.
pub fn score_candidate(candidate: &mut Candidate, config: &ScoringConfig) {
    candidate.confidence_score = confidence(&candidate.source_signals, config);
}

fn normalized(raw: f64, signal: &SignalWeight) -> f64 {
    let value = raw.max(0.0);
    match signal.saturation {
        Some(saturation) if saturation > 0.0 => value / (value + saturation),
        _ => value.min(1.0),
    }
}
