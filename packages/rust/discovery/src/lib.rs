//! Candidate discovery from heterogeneous signal sources.
//!
//! Each [`SignalSource`] fetches raw records (StackOverflow questions, Reddit
//! posts, configured trend terms). [`discover_all`] queries every source
//! concurrently, tolerates per-source failures, and runs each record through
//! the [`normalizer`] to produce canonical [`Candidate`]s in discovery order.

mod http;
pub mod normalizer;
mod sources;

use errorpress_shared::{AppConfig, Candidate, PressError, Result, RetryPolicy, Source};
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

pub use http::{HttpOptions, build_client};
pub use normalizer::{canonicalize, fingerprint, normalize};
pub use sources::{RedditSource, StackOverflowSource, TrendsSource};

// ---------------------------------------------------------------------------
// Source trait
// ---------------------------------------------------------------------------

/// One record as returned by a source, before canonicalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub source: Source,
    /// Title or term carrying the error text, possibly HTML-encoded.
    pub text: String,
    pub url: Option<String>,
    /// Numeric and descriptive fields reported by the source.
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Per-call options passed to every source.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    /// Upper bound on records returned by a single source.
    pub limit: Option<usize>,
}

/// A producer of raw candidate records.
#[async_trait::async_trait]
pub trait SignalSource: Send + Sync {
    fn source(&self) -> Source;

    /// Fetch records. An empty result is normal.
    async fn fetch_candidates(&self, params: &QueryParams) -> Result<Vec<RawRecord>>;
}

/// Build the enabled sources from configuration, in a fixed order.
pub fn sources_from_config(config: &AppConfig) -> Result<Vec<Box<dyn SignalSource>>> {
    let client = build_client(&HttpOptions::from(&config.pipeline))?;
    let retry = RetryPolicy::from(&config.retry);
    let mut sources: Vec<Box<dyn SignalSource>> = Vec::new();

    if config.sources.stackoverflow.enabled {
        sources.push(Box::new(StackOverflowSource::new(
            client.clone(),
            config.sources.stackoverflow.clone(),
            retry,
        )));
    }
    if config.sources.reddit.enabled {
        sources.push(Box::new(RedditSource::new(
            client.clone(),
            config.sources.reddit.clone(),
            retry,
        )));
    }
    if config.sources.trends.enabled {
        sources.push(Box::new(TrendsSource::new(config.sources.trends.clone())));
    }

    Ok(sources)
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// A record the normalizer refused.
#[derive(Debug, Clone)]
pub struct DroppedRecord {
    pub source: Source,
    pub reason: String,
}

/// Outcome of one discovery pass.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Normalized, unscored candidates in discovery order.
    pub candidates: Vec<Candidate>,
    pub dropped: Vec<DroppedRecord>,
    /// Sources whose fetch failed; they contributed nothing.
    pub failed_sources: Vec<Source>,
}

/// Query every source concurrently and normalize the results.
///
/// Discovery order is source order, then record order within a source.
#[instrument(skip_all, fields(sources = sources.len()))]
pub async fn discover_all(
    sources: &[Box<dyn SignalSource>],
    params: &QueryParams,
) -> DiscoveryReport {
    let fetches = sources.iter().map(|s| async move {
        let source = s.source();
        (source, s.fetch_candidates(params).await)
    });
    let results = join_all(fetches).await;

    let mut report = DiscoveryReport::default();
    for (source, result) in results {
        let records = match result {
            Ok(records) => records,
            Err(e) => {
                warn!(%source, error = %e, "source failed, continuing without it");
                report.failed_sources.push(source);
                continue;
            }
        };

        let fetched = records.len();
        for record in &records {
            match normalize(record) {
                Ok(candidate) => report.candidates.push(candidate),
                Err(PressError::MalformedRecord { reason, .. }) => {
                    debug!(%source, %reason, "dropping malformed record");
                    report.dropped.push(DroppedRecord { source, reason });
                }
                Err(e) => {
                    debug!(%source, error = %e, "dropping record");
                    report.dropped.push(DroppedRecord {
                        source,
                        reason: e.to_string(),
                    });
                }
            }
        }
        info!(%source, fetched, "source fetched");
    }

    info!(
        candidates = report.candidates.len(),
        dropped = report.dropped.len(),
        failed_sources = report.failed_sources.len(),
        "discovery complete"
    );
    report
}
