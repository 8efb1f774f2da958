//! Admission of scored, deduplicated candidates into the work queue.

use errorpress_shared::{Candidate, SelectionConfig};

/// A candidate left out of the batch and why.
#[derive(Debug, Clone)]
pub struct Exclusion {
    pub candidate: Candidate,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct SelectionOutcome {
    /// Highest confidence first; ties keep discovery order.
    pub admitted: Vec<Candidate>,
    pub excluded: Vec<Exclusion>,
}

/// Filter, rank and cap a batch given in discovery order.
pub fn select(candidates: Vec<Candidate>, config: &SelectionConfig) -> SelectionOutcome {
    let mut outcome = SelectionOutcome::default();

    for candidate in candidates {
        match exclusion_reason(&candidate, config) {
            Some(reason) => outcome.excluded.push(Exclusion { candidate, reason }),
            None => outcome.admitted.push(candidate),
        }
    }

    // sort_by is stable
    outcome
        .admitted
        .sort_by(|a, b| b.confidence_score.total_cmp(&a.confidence_score));

    if let Some(max) = config.max_batch_size {
        if outcome.admitted.len() > max {
            for candidate in outcome.admitted.split_off(max) {
                outcome.excluded.push(Exclusion {
                    candidate,
                    reason: format!("over batch limit of {max}"),
                });
            }
        }
    }

    outcome
}

fn exclusion_reason(candidate: &Candidate, config: &SelectionConfig) -> Option<String> {
    if candidate.confidence_score < config.min_confidence_score {
        return Some(format!(
            "confidence {:.3} below minimum {:.3}",
            candidate.confidence_score, config.min_confidence_score
        ));
    }

    let length = candidate.raw_text.trim().chars().count();
    if length < config.min_text_length {
        return Some(format!(
            "error text too short ({length} < {} chars)",
            config.min_text_length
        ));
    }

    let words: Vec<&str> = candidate.fingerprint.split_whitespace().collect();
    if let Some(keyword) = config
        .excluded_keywords
        .iter()
        .find(|k| words.contains(&k.to_lowercase().as_str()))
    {
        return Some(format!("contains excluded keyword '{keyword}'"));
    }

    for (signal, floor) in &config.signal_floors {
        if let Some(&value) = candidate.source_signals.get(signal) {
            if value < *floor {
                return Some(format!("{signal} {value} below floor {floor}"));
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use errorpress_shared::{Signals, Source};
    use std::collections::BTreeMap;

    fn candidate(text: &str, score: f64) -> Candidate {
        Candidate {
            raw_text: text.into(),
            source: Source::Trends,
            source_signals: Signals::new(),
            confidence_score: score,
            fingerprint: errorpress_discovery::fingerprint(text),
            source_url: None,
            title: None,
        }
    }

    fn config() -> SelectionConfig {
        SelectionConfig {
            min_confidence_score: 0.5,
            max_batch_size: None,
            ..SelectionConfig::default()
        }
    }

    fn texts(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.raw_text.as_str()).collect()
    }

    #[test]
    fn sorts_by_confidence_and_keeps_tie_order() {
        let outcome = select(
            vec![
                candidate("ECONNREFUSED 127.0.0.1:5432", 0.6),
                candidate("ENOSPC no space left on device", 0.9),
                candidate("EACCES permission denied, open", 0.6),
                candidate("ETIMEDOUT connect timed out", 0.7),
            ],
            &config(),
        );
        assert_eq!(
            texts(&outcome.admitted),
            vec![
                "ENOSPC no space left on device",
                "ETIMEDOUT connect timed out",
                "ECONNREFUSED 127.0.0.1:5432",
                "EACCES permission denied, open",
            ]
        );
        assert!(outcome.excluded.is_empty());
    }

    #[test]
    fn every_exclusion_has_a_reason() {
        let mut floored = candidate("Kernel panic - not syncing", 0.8);
        floored.source_signals.insert("search_volume".into(), 40.0);

        let mut cfg = config();
        cfg.signal_floors = BTreeMap::from([("search_volume".to_string(), 100.0)]);

        let outcome = select(
            vec![
                candidate("Segmentation fault (core dumped)", 0.1),
                candidate("E404", 0.9),
                candidate("pytest test collection failed", 0.9),
                floored,
            ],
            &cfg,
        );

        assert!(outcome.admitted.is_empty());
        let reasons: Vec<&str> = outcome.excluded.iter().map(|e| e.reason.as_str()).collect();
        assert!(reasons[0].starts_with("confidence"));
        assert!(reasons[1].contains("too short"));
        assert!(reasons[2].contains("'test'"));
        assert!(reasons[3].contains("search_volume"));
    }

    #[test]
    fn floors_skip_candidates_without_the_signal() {
        let mut cfg = config();
        cfg.signal_floors = BTreeMap::from([("search_volume".to_string(), 100.0)]);
        let outcome = select(vec![candidate("ModuleNotFoundError: numpy", 0.8)], &cfg);
        assert_eq!(outcome.admitted.len(), 1);
    }

    #[test]
    fn keywords_match_whole_words_only() {
        let outcome = select(
            vec![candidate("Unable to fetch latest release metadata", 0.8)],
            &config(),
        );
        assert_eq!(outcome.admitted.len(), 1);
    }

    #[test]
    fn truncates_to_batch_size() {
        let mut cfg = config();
        cfg.max_batch_size = Some(2);
        let outcome = select(
            vec![
                candidate("ERR_CONNECTION_RESET", 0.7),
                candidate("ERR_CERT_AUTHORITY_INVALID", 0.95),
                candidate("ERR_NAME_NOT_RESOLVED", 0.8),
            ],
            &cfg,
        );
        assert_eq!(
            texts(&outcome.admitted),
            vec!["ERR_CERT_AUTHORITY_INVALID", "ERR_NAME_NOT_RESOLVED"]
        );
        assert_eq!(outcome.excluded.len(), 1);
        assert!(outcome.excluded[0].reason.contains("batch limit"));
    }

    #[test]
    fn zero_signal_candidate_is_excluded() {
        let mut empty = candidate("0x80070002 file not found", 0.0);
        empty.confidence_score =
            crate::scoring::confidence(&empty.source_signals, &Default::default());
        let outcome = select(vec![empty], &config());
        assert!(outcome.admitted.is_empty());
    }

    #[test]
    fn empty_batch_is_fine() {
        let outcome = select(Vec::new(), &config());
        assert!(outcome.admitted.is_empty());
        assert!(outcome.excluded.is_empty());
    }
}
