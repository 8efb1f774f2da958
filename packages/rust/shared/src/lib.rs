//! Shared types, error model, and configuration for errorpress.
//!
//! This crate is the foundation depended on by all other errorpress crates.
//! It provides:
//! - [`PressError`], the unified error type
//! - Domain types ([`Candidate`], [`Item`], [`Article`], [`QualityReport`])
//! - Configuration ([`AppConfig`], config loading)
//! - Retry with backoff and the collaborator traits used by the pipeline

pub mod collaborators;
pub mod config;
pub mod error;
pub mod retry;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use collaborators::{ArticleGenerator, Publisher, SolutionCollector};
pub use config::{
    AppConfig, CollectionConfig, DedupConfig, GenerationConfig, PipelineConfig, PublishConfig,
    QualityConfig, RedditSourceConfig, RetryConfig, ScoringConfig, SelectionConfig, SignalWeight,
    SimilarityStrategy, SourcesConfig, StackOverflowSourceConfig, StorageConfig, TrendTerm,
    TrendsSourceConfig, config_dir, config_file_path, expand_home, init_config, load_config,
    load_config_from, optional_secret, resolve_secret,
};
pub use error::{PressError, Result};
pub use retry::{RetryPolicy, network_error, retry_with_backoff};
pub use types::{
    Article, ArticleMetadata, CURRENT_SCHEMA_VERSION, Candidate, Item, ItemState, PublishRef,
    PublishStatus, QualityReport, Rejection, Signals, Solution, SolutionReference, Source,
    slot_name,
};
