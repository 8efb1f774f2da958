//! Duplicate detection against the persistent fingerprint index.
//!
//! A [`Deduplicator`] is loaded with every fingerprint indexed by earlier
//! runs and stages the fingerprints it accepts during the current batch.
//! Staged fingerprints become persistent only when the sequencer commits
//! the item that owns them.

use std::collections::HashSet;

use errorpress_shared::{Candidate, DedupConfig, SimilarityStrategy};
use tracing::debug;

// ---------------------------------------------------------------------------
// Similarity strategies
// ---------------------------------------------------------------------------

/// Similarity of two fingerprints in `[0, 1]`.
pub trait Similarity: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Jaccard over whitespace tokens.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenSet;

impl Similarity for TokenSet {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let a_tokens: HashSet<&str> = a.split_whitespace().collect();
        let b_tokens: HashSet<&str> = b.split_whitespace().collect();
        let union = a_tokens.union(&b_tokens).count();
        if union == 0 {
            return 0.0;
        }
        a_tokens.intersection(&b_tokens).count() as f64 / union as f64
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Levenshtein;

impl Similarity for Levenshtein {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        strsim::normalized_levenshtein(a, b)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JaroWinkler;

impl Similarity for JaroWinkler {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        strsim::jaro_winkler(a, b)
    }
}

pub fn strategy(kind: SimilarityStrategy) -> Box<dyn Similarity> {
    match kind {
        SimilarityStrategy::TokenSet => Box::new(TokenSet),
        SimilarityStrategy::Levenshtein => Box::new(Levenshtein),
        SimilarityStrategy::JaroWinkler => Box::new(JaroWinkler),
    }
}

// ---------------------------------------------------------------------------
// Deduplicator
// ---------------------------------------------------------------------------

/// Dedup decision for one fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Unique,
    /// Exact match, or similar to a fingerprint accepted earlier in this batch.
    Duplicate,
    /// Similar to an indexed fingerprint from an earlier run.
    NearDuplicate { matched: String, similarity: f64 },
}

pub struct Deduplicator {
    similarity: Box<dyn Similarity>,
    threshold: f64,
    allow_near_duplicates: bool,
    indexed: Vec<String>,
    indexed_set: HashSet<String>,
    staged: Vec<String>,
    staged_set: HashSet<String>,
}

impl Deduplicator {
    pub fn new(config: &DedupConfig, indexed: impl IntoIterator<Item = String>) -> Self {
        Self::with_similarity(config, strategy(config.strategy), indexed)
    }

    pub fn with_similarity(
        config: &DedupConfig,
        similarity: Box<dyn Similarity>,
        indexed: impl IntoIterator<Item = String>,
    ) -> Self {
        let indexed: Vec<String> = indexed.into_iter().collect();
        let indexed_set = indexed.iter().cloned().collect();
        Self {
            similarity,
            threshold: config.similarity_threshold,
            allow_near_duplicates: config.allow_near_duplicates,
            indexed,
            indexed_set,
            staged: Vec::new(),
            staged_set: HashSet::new(),
        }
    }

    /// Classify a fingerprint without staging it.
    pub fn check(&self, fingerprint: &str) -> Verdict {
        if self.indexed_set.contains(fingerprint) || self.staged_set.contains(fingerprint) {
            return Verdict::Duplicate;
        }

        if self
            .staged
            .iter()
            .any(|s| self.similarity.similarity(fingerprint, s) > self.threshold)
        {
            return Verdict::Duplicate;
        }

        let best = self
            .indexed
            .iter()
            .map(|known| (known, self.similarity.similarity(fingerprint, known)))
            .filter(|(_, score)| *score > self.threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((matched, similarity)) => Verdict::NearDuplicate {
                matched: matched.clone(),
                similarity,
            },
            None => Verdict::Unique,
        }
    }

    /// Classify a fingerprint and stage it when it may proceed.
    /// Returns the verdict and whether the fingerprint was accepted.
    pub fn admit(&mut self, fingerprint: &str) -> (Verdict, bool) {
        let verdict = self.check(fingerprint);
        let accepted = match verdict {
            Verdict::Unique => true,
            Verdict::NearDuplicate { .. } => self.allow_near_duplicates,
            Verdict::Duplicate => false,
        };
        if accepted {
            self.staged.push(fingerprint.to_string());
            self.staged_set.insert(fingerprint.to_string());
        }
        (verdict, accepted)
    }

    /// Fingerprints accepted so far in this batch, in acceptance order.
    pub fn staged(&self) -> &[String] {
        &self.staged
    }
}

/// Candidates split by dedup outcome, each keeping discovery order.
#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub accepted: Vec<(Candidate, Verdict)>,
    pub dropped: Vec<(Candidate, Verdict)>,
}

/// Run a batch through the deduplicator in order. First seen wins.
pub fn dedup_batch(dedup: &mut Deduplicator, candidates: Vec<Candidate>) -> DedupOutcome {
    let mut outcome = DedupOutcome::default();
    for candidate in candidates {
        let (verdict, accepted) = dedup.admit(&candidate.fingerprint);
        if accepted {
            outcome.accepted.push((candidate, verdict));
        } else {
            debug!(fingerprint = %candidate.fingerprint, ?verdict, "dropping duplicate");
            outcome.dropped.push((candidate, verdict));
        }
    }
    outcome
}
