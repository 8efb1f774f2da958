//! Quality gate for drafted articles.
//!
//! [`QualityGate::assess`] is a pure function of the article and the
//! candidate's error text. [`QualityGate::evaluate`] applies the verdict to a
//! Drafted item.

use std::sync::LazyLock;

use errorpress_shared::{Article, Item, ItemState, PressError, QualityConfig, QualityReport, Result};
use regex::Regex;

use crate::lifecycle;

// ---------------------------------------------------------------------------
// SEO scoring
// ---------------------------------------------------------------------------

/// Scores an article on a 0–100 scale for a target keyword.
pub trait SeoScorer: Send + Sync {
    fn score(&self, article: &Article, keyword: &str) -> f64;
}

/// Point-based heuristic:
///
/// | check | points |
/// |---|---|
/// | keyword in title | 20 |
/// | keyword in excerpt | 15 |
/// | keyword density 1–3% (0.5–1% earns 15) | 25 |
/// | slug is lowercase ASCII with dashes | 10 |
/// | three or more tags (one or two earn 10) | 15 |
/// | three or more `##` headings (one or two earn 8) | 15 |
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicSeoScorer;

impl SeoScorer for HeuristicSeoScorer {
    fn score(&self, article: &Article, keyword: &str) -> f64 {
        static SLUG: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("valid regex"));
        static H2: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"(?m)^##\s+\S").expect("valid regex"));

        let keyword = keyword.trim().to_lowercase();
        let mut score = 0.0;

        if !keyword.is_empty() {
            if article.title.to_lowercase().contains(&keyword) {
                score += 20.0;
            }
            if article.metadata.excerpt.to_lowercase().contains(&keyword) {
                score += 15.0;
            }

            let words = article.body.split_whitespace().count();
            if words > 0 {
                let hits = article.body.to_lowercase().matches(keyword.as_str()).count();
                let density = hits as f64 / words as f64 * 100.0;
                if (1.0..=3.0).contains(&density) {
                    score += 25.0;
                } else if (0.5..1.0).contains(&density) {
                    score += 15.0;
                }
            }
        }

        if SLUG.is_match(&article.metadata.slug) {
            score += 10.0;
        }

        score += match article.metadata.tags.len() {
            0 => 0.0,
            1 | 2 => 10.0,
            _ => 15.0,
        };

        score += match H2.find_iter(&article.body).count() {
            0 => 0.0,
            1 | 2 => 8.0,
            _ => 15.0,
        };

        score
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

pub struct QualityGate {
    config: QualityConfig,
    scorer: Box<dyn SeoScorer>,
}

impl QualityGate {
    pub fn new(config: QualityConfig, scorer: Box<dyn SeoScorer>) -> Self {
        Self { config, scorer }
    }

    pub fn from_config(config: &QualityConfig) -> Self {
        Self::new(config.clone(), Box::new(HeuristicSeoScorer))
    }

    /// Run every check. `reasons` lists each failure in check order.
    pub fn assess(&self, article: &Article, keyword: &str) -> QualityReport {
        let word_count = count_words(&article.body);
        let seo_score = self.scorer.score(article, keyword).clamp(0.0, 100.0);
        let mut reasons = Vec::new();

        if article.title.trim().is_empty() {
            reasons.push("title is missing".to_string());
        }
        if article.body.trim().is_empty() {
            reasons.push("body is empty".to_string());
        }
        if word_count < self.config.min_word_count {
            reasons.push(format!(
                "word count {word_count} below minimum {}",
                self.config.min_word_count
            ));
        }
        if let Some(max) = self.config.max_word_count {
            if word_count > max {
                reasons.push(format!("word count {word_count} above maximum {max}"));
            }
        }
        if seo_score < self.config.min_seo_score {
            reasons.push(format!(
                "SEO score {seo_score:.1} below minimum {:.1}",
                self.config.min_seo_score
            ));
        }
        let markers = placeholder_markers(article);
        if !markers.is_empty() {
            reasons.push(format!("unresolved placeholders: {}", markers.join(", ")));
        }

        QualityReport {
            seo_score,
            word_count,
            passed: reasons.is_empty(),
            reasons,
        }
    }

    /// Assess a Drafted item's article and move it to QualityChecked or Rejected.
    pub fn evaluate(&self, item: &mut Item) -> Result<QualityReport> {
        if item.state != ItemState::Drafted {
            return Err(PressError::InvalidTransition {
                sequence_id: item.sequence_id,
                from: item.state.to_string(),
                action: "evaluate quality".into(),
            });
        }
        let Some(article) = item.article.as_ref() else {
            return Err(PressError::validation(format!(
                "item {} is drafted but has no article",
                item.sequence_id
            )));
        };

        let report = self.assess(article, &item.candidate.raw_text);
        lifecycle::record_verdict(item, report.clone())?;
        Ok(report)
    }
}

/// Whitespace-delimited words. CJK ideographs and kana count one each, since
/// those scripts do not separate words with spaces.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace()
        .map(|token| {
            let cjk = token.chars().filter(|c| is_cjk(*c)).count();
            let rest = token.chars().any(|c| !is_cjk(c));
            cjk + usize::from(rest)
        })
        .sum()
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30FF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{AC00}'..='\u{D7AF}')
}

/// Template leftovers in the title, excerpt or body.
fn placeholder_markers(article: &Article) -> Vec<String> {
    static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\{\{[^}]*\}\}|\[(?:todo|tbd|placeholder|insert[^\]]*)\]|lorem ipsum|<placeholder>")
            .expect("valid regex")
    });

    let mut found: Vec<String> = [
        article.title.as_str(),
        article.metadata.excerpt.as_str(),
        article.body.as_str(),
    ]
    .iter()
    .flat_map(|text| PLACEHOLDER.find_iter(text).map(|m| m.as_str().to_string()))
    .collect();
    found.dedup();
    found
}
