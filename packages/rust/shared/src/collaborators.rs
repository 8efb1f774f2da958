// Trait seams for the pipeline's external collaborators.
//
// SolutionCollector gathers solution text, ArticleGenerator turns it into an
// Article, Publisher pushes a finished Article to the target site. Concrete
// adapters live in the collector, core and publisher crates; pipeline tests
// swap in in-memory mocks.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Article, Candidate, PublishRef, PublishStatus, Solution};

// ---------------------------------------------------------------------------
// SolutionCollector
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SolutionCollector: Send + Sync {
    /// Gather solution text for a candidate. Fails with
    /// [`PressError::MissingSolution`](crate::PressError::MissingSolution)
    /// when nothing usable exists.
    async fn collect(&self, candidate: &Candidate) -> Result<Solution>;
}

// ---------------------------------------------------------------------------
// ArticleGenerator
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ArticleGenerator: Send + Sync {
    /// Produce an article in `language`. Fails with
    /// [`PressError::GenerationFailed`](crate::PressError::GenerationFailed).
    async fn generate_article(
        &self,
        candidate: &Candidate,
        solution: &Solution,
        language: &str,
    ) -> Result<Article>;
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Push an article to the target. `idempotency_key` is stable per item so
    /// a repeated call can locate an earlier post instead of creating another.
    async fn publish(
        &self,
        article: &Article,
        status: PublishStatus,
        idempotency_key: u64,
    ) -> Result<PublishRef>;
}
