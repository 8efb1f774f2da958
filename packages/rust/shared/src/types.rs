//! Core domain types: candidates, items, articles and quality records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version for the persisted `item.json` format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Where a candidate was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    StackOverflow,
    Reddit,
    Trends,
    Manual,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StackOverflow => "stack_overflow",
            Self::Reddit => "reddit",
            Self::Trends => "trends",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Open signal mapping. Sorted keys keep every fold over it deterministic.
pub type Signals = BTreeMap<String, f64>;

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// A prospective error topic, before admission into the work queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Canonicalized error message or code.
    pub raw_text: String,
    /// Which source produced it.
    pub source: Source,
    /// Source-specific numeric signals. Absent keys mean "unknown", not zero.
    #[serde(default)]
    pub source_signals: Signals,
    /// Computed confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence_score: f64,
    /// Normalized text used for duplicate detection.
    pub fingerprint: String,
    /// Link to the originating post, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Original post title, if it differs from the extracted error text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

// ---------------------------------------------------------------------------
// Article
// ---------------------------------------------------------------------------

/// Publication metadata accompanying an article.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleMetadata {
    /// Meta description / excerpt.
    #[serde(default)]
    pub excerpt: String,
    /// URL slug suggested by the generator.
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// BCP-47-ish language tag of the body.
    #[serde(default)]
    pub language: String,
    /// Anything else the generator returned.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Generated content payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    /// Markdown body.
    pub body: String,
    #[serde(default)]
    pub metadata: ArticleMetadata,
}

/// Solution text gathered for a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    /// Concatenated Markdown solution text.
    pub text: String,
    /// Where the text came from.
    #[serde(default)]
    pub references: Vec<SolutionReference>,
}

/// Attribution for one collected solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionReference {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub score: i64,
}

// ---------------------------------------------------------------------------
// Quality
// ---------------------------------------------------------------------------

/// Structured Quality Gate verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// SEO score on a 0–100 scale.
    pub seo_score: f64,
    pub word_count: usize,
    pub passed: bool,
    /// Every failed check, in evaluation order.
    #[serde(default)]
    pub reasons: Vec<String>,
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// Lifecycle state of an [`Item`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Discovered,
    Collecting,
    Drafted,
    QualityChecked,
    Rejected,
    Published,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Collecting => "collecting",
            Self::Drafted => "drafted",
            Self::QualityChecked => "quality_checked",
            Self::Rejected => "rejected",
            Self::Published => "published",
        }
    }

    /// Rejected and Published accept no further events.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Published)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: ItemState) -> bool {
        use ItemState::*;
        matches!(
            (self, next),
            (Discovered, Collecting)
                | (Collecting, Drafted)
                | (Drafted, QualityChecked)
                | (QualityChecked, Published)
                | (Discovered | Collecting | Drafted | QualityChecked, Rejected)
        )
    }
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemState {
    type Err = crate::PressError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "discovered" => Self::Discovered,
            "collecting" => Self::Collecting,
            "drafted" => Self::Drafted,
            "quality_checked" => Self::QualityChecked,
            "rejected" => Self::Rejected,
            "published" => Self::Published,
            other => {
                return Err(crate::PressError::validation(format!(
                    "unknown item state '{other}'"
                )));
            }
        })
    }
}

/// Why an item ended up in [`ItemState::Rejected`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    /// State the item was in when rejected.
    pub stage: ItemState,
    pub reason: String,
}

/// Opaque identifier returned by the publishing collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRef {
    /// Remote post identifier.
    pub id: String,
    /// Public or preview URL, when the target reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl std::fmt::Display for PublishRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.url {
            Some(url) => write!(f, "{} ({url})", self.id),
            None => f.write_str(&self.id),
        }
    }
}

/// Requested visibility of a published article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    Draft,
    Publish,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Publish => "publish",
        }
    }
}

/// A sequenced unit of work tracked through the publication lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    /// Durable, never-reused identity.
    pub sequence_id: u64,
    /// Human-readable name, unique within the sequence namespace.
    pub slug: String,
    pub state: ItemState,
    /// Immutable copy of the promoted candidate.
    pub candidate: Candidate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article: Option<Article>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_ref: Option<PublishRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
    /// Collected solution, kept so a resumed item can be redrafted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<Solution>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// A freshly sequenced item in [`ItemState::Discovered`].
    pub fn new(sequence_id: u64, slug: String, candidate: Candidate) -> Self {
        let now = Utc::now();
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            sequence_id,
            slug,
            state: ItemState::Discovered,
            candidate,
            article: None,
            quality: None,
            publish_ref: None,
            rejection: None,
            solution: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Directory name of this item's storage slot.
    pub fn slot_name(&self) -> String {
        slot_name(self.sequence_id, &self.slug)
    }
}

/// `{zero-padded sequence_id}_{slug}`.
pub fn slot_name(sequence_id: u64, slug: &str) -> String {
    format!("{sequence_id:04}_{slug}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> Candidate {
        Candidate {
            raw_text: "ERROR_ACCESS_DENIED 0x80070005".into(),
            source: Source::Trends,
            source_signals: Signals::from([("search_volume".into(), 1200.0)]),
            confidence_score: 0.7,
            fingerprint: "error access denied 0x80070005".into(),
            source_url: None,
            title: None,
        }
    }

    #[test]
    fn slot_names_are_zero_padded() {
        assert_eq!(slot_name(7, "disk-full"), "0007_disk-full");
        assert_eq!(slot_name(12345, "x"), "12345_x");
    }

    #[test]
    fn state_transitions() {
        use ItemState::*;
        assert!(Discovered.can_transition_to(Collecting));
        assert!(QualityChecked.can_transition_to(Published));
        assert!(Drafted.can_transition_to(Rejected));
        assert!(!Discovered.can_transition_to(Drafted));
        assert!(!Published.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Collecting));
        assert!(!Collecting.can_transition_to(Discovered));
    }

    #[test]
    fn state_string_roundtrip() {
        for state in [
            ItemState::Discovered,
            ItemState::Collecting,
            ItemState::Drafted,
            ItemState::QualityChecked,
            ItemState::Rejected,
            ItemState::Published,
        ] {
            let parsed: ItemState = state.as_str().parse().expect("parse state");
            assert_eq!(parsed, state);
        }
        assert!("archived".parse::<ItemState>().is_err());
    }

    #[test]
    fn item_serialization() {
        let item = Item::new(3, "access-denied".into(), candidate());
        let json = serde_json::to_string_pretty(&item).expect("serialize");
        assert!(!json.contains("publish_ref"));
        let parsed: Item = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.sequence_id, 3);
        assert_eq!(parsed.state, ItemState::Discovered);
        assert_eq!(parsed.candidate.source_signals["search_volume"], 1200.0);
    }
}
