//! Item lifecycle transitions.
//!
//! ```text
//! Discovered -> Collecting -> Drafted -> QualityChecked -> Published
//!      \            \            \             \
//!       +------------+------------+-------------+--> Rejected
//! ```
//!
//! Every function checks the current state first and leaves the item
//! untouched on [`PressError::InvalidTransition`].

use chrono::Utc;
use errorpress_shared::{
    Article, Item, ItemState, PressError, PublishRef, QualityReport, Rejection, Result,
};

fn transition(item: &mut Item, next: ItemState, action: &str) -> Result<()> {
    if !item.state.can_transition_to(next) {
        return Err(PressError::InvalidTransition {
            sequence_id: item.sequence_id,
            from: item.state.to_string(),
            action: action.to_string(),
        });
    }
    item.state = next;
    item.updated_at = Utc::now();
    Ok(())
}

/// Discovered → Collecting.
pub fn start_collection(item: &mut Item) -> Result<()> {
    transition(item, ItemState::Collecting, "start collection")
}

/// Collecting → Drafted, attaching the generated article.
pub fn complete_draft(item: &mut Item, article: Article) -> Result<()> {
    transition(item, ItemState::Drafted, "complete draft")?;
    item.article = Some(article);
    Ok(())
}

/// Drafted → QualityChecked when the report passed, otherwise → Rejected.
/// The report is attached either way.
pub fn record_verdict(item: &mut Item, report: QualityReport) -> Result<()> {
    if report.passed {
        transition(item, ItemState::QualityChecked, "record quality verdict")?;
        item.quality = Some(report);
        return Ok(());
    }

    if item.state != ItemState::Drafted {
        return Err(PressError::InvalidTransition {
            sequence_id: item.sequence_id,
            from: item.state.to_string(),
            action: "record quality verdict".into(),
        });
    }
    let reason = format!("quality gate: {}", report.reasons.join("; "));
    item.quality = Some(report);
    reject(item, reason)
}

/// QualityChecked → Published.
pub fn mark_published(item: &mut Item, publish_ref: PublishRef) -> Result<()> {
    transition(item, ItemState::Published, "publish")?;
    item.publish_ref = Some(publish_ref);
    Ok(())
}

/// Any non-terminal state → Rejected.
pub fn reject(item: &mut Item, reason: impl Into<String>) -> Result<()> {
    let stage = item.state;
    transition(item, ItemState::Rejected, "reject")?;
    item.rejection = Some(Rejection {
        stage,
        reason: reason.into(),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use errorpress_shared::{ArticleMetadata, Candidate, Signals, Source};

    fn item() -> Item {
        Item::new(
            1,
            "eacces".into(),
            Candidate {
                raw_text: "EACCES: permission denied".into(),
                source: Source::Manual,
                source_signals: Signals::new(),
                confidence_score: 1.0,
                fingerprint: "eacces permission denied".into(),
                source_url: None,
                title: None,
            },
        )
    }

    fn article() -> Article {
        Article {
            title: "Fix EACCES".into(),
            body: "body".into(),
            metadata: ArticleMetadata::default(),
        }
    }

    fn report(passed: bool) -> QualityReport {
        QualityReport {
            seo_score: 80.0,
            word_count: 2500,
            passed,
            reasons: if passed {
                vec![]
            } else {
                vec!["word count 400 below minimum 1000".into()]
            },
        }
    }

    #[test]
    fn happy_path_reaches_published() {
        let mut item = item();
        start_collection(&mut item).expect("collect");
        complete_draft(&mut item, article()).expect("draft");
        record_verdict(&mut item, report(true)).expect("verdict");
        assert_eq!(item.state, ItemState::QualityChecked);
        assert!(item.quality.is_some());

        mark_published(
            &mut item,
            PublishRef {
                id: "9".into(),
                url: None,
            },
        )
        .expect("publish");
        assert_eq!(item.state, ItemState::Published);
        assert!(item.publish_ref.is_some());
    }

    #[test]
    fn failed_verdict_rejects_with_reasons() {
        let mut item = item();
        start_collection(&mut item).expect("collect");
        complete_draft(&mut item, article()).expect("draft");
        record_verdict(&mut item, report(false)).expect("verdict");

        assert_eq!(item.state, ItemState::Rejected);
        let rejection = item.rejection.as_ref().expect("rejection");
        assert_eq!(rejection.stage, ItemState::Drafted);
        assert!(rejection.reason.contains("word count"));
        assert!(item.quality.as_ref().is_some_and(|q| !q.passed));
    }

    #[test]
    fn terminal_states_refuse_events() {
        let mut item = item();
        reject(&mut item, "no solution").expect("reject");

        let err = start_collection(&mut item).unwrap_err();
        assert!(matches!(err, PressError::InvalidTransition { .. }));
        let err = reject(&mut item, "again").unwrap_err();
        assert!(matches!(err, PressError::InvalidTransition { .. }));
        assert_eq!(item.rejection.as_ref().map(|r| r.reason.as_str()), Some("no solution"));
    }

    #[test]
    fn skipping_states_is_invalid() {
        let mut item = item();
        let err = mark_published(
            &mut item,
            PublishRef {
                id: "1".into(),
                url: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, PressError::InvalidTransition { .. }));
        assert_eq!(item.state, ItemState::Discovered);
        assert!(item.publish_ref.is_none());

        let err = record_verdict(&mut item, report(false)).unwrap_err();
        assert!(matches!(err, PressError::InvalidTransition { .. }));
        assert!(item.quality.is_none());
    }
}
