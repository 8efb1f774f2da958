//! Application configuration for errorpress.
//!
//! User config lives at `~/.errorpress/errorpress.toml`; `--config` overrides
//! the location. Secrets are never stored in the file: each section that needs
//! one names the environment variable that holds it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PressError, Result};
use crate::types::PublishStatus;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "errorpress.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".errorpress";

// ---------------------------------------------------------------------------
// Config structs (matching errorpress.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the database and article slots. `~` is expanded.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Database file name inside `data_dir`.
    #[serde(default = "default_db_file")]
    pub db_file: String,

    /// Directory holding one slot per item, relative to `data_dir`.
    #[serde(default = "default_slots_dir")]
    pub slots_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_file: default_db_file(),
            slots_dir: default_slots_dir(),
        }
    }
}

impl StorageConfig {
    /// Absolute path of the libSQL database file.
    pub fn db_path(&self) -> Result<PathBuf> {
        Ok(expand_home(&self.data_dir)?.join(&self.db_file))
    }

    /// Absolute path of the slots root.
    pub fn slots_path(&self) -> Result<PathBuf> {
        Ok(expand_home(&self.data_dir)?.join(&self.slots_dir))
    }
}

fn default_data_dir() -> String {
    "~/.errorpress".into()
}
fn default_db_file() -> String {
    "errorpress.db".into()
}
fn default_slots_dir() -> String {
    "articles".into()
}

/// `[sources]` section with one table per signal source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub stackoverflow: StackOverflowSourceConfig,
    #[serde(default)]
    pub reddit: RedditSourceConfig,
    #[serde(default)]
    pub trends: TrendsSourceConfig,
}

/// `[sources.stackoverflow]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackOverflowSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// StackExchange API base URL.
    #[serde(default = "default_stackexchange_api")]
    pub api_base: String,

    #[serde(default = "default_stackexchange_site")]
    pub site: String,

    /// Tags searched, one request per tag.
    #[serde(default = "default_so_tags")]
    pub tags: Vec<String>,

    /// Free-text query terms applied to every tag search.
    #[serde(default = "default_so_query")]
    pub query: String,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Env var holding an optional StackExchange API key.
    #[serde(default = "default_stackexchange_key_env")]
    pub api_key_env: String,
}

impl Default for StackOverflowSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: default_stackexchange_api(),
            site: default_stackexchange_site(),
            tags: default_so_tags(),
            query: default_so_query(),
            page_size: default_page_size(),
            api_key_env: default_stackexchange_key_env(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_stackexchange_api() -> String {
    "https://api.stackexchange.com/2.3".into()
}
fn default_stackexchange_site() -> String {
    "stackoverflow".into()
}
fn default_so_tags() -> Vec<String> {
    vec!["windows".into(), "error-handling".into(), "exception".into()]
}
fn default_so_query() -> String {
    "error".into()
}
fn default_page_size() -> u32 {
    25
}
fn default_stackexchange_key_env() -> String {
    "STACKEXCHANGE_KEY".into()
}

/// `[sources.reddit]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_reddit_base")]
    pub base_url: String,

    #[serde(default = "default_subreddits")]
    pub subreddits: Vec<String>,

    /// Posts below this many upvotes are skipped before normalization.
    #[serde(default = "default_min_upvotes")]
    pub min_upvotes: i64,

    #[serde(default = "default_reddit_limit")]
    pub limit: u32,
}

impl Default for RedditSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_reddit_base(),
            subreddits: default_subreddits(),
            min_upvotes: default_min_upvotes(),
            limit: default_reddit_limit(),
        }
    }
}

fn default_reddit_base() -> String {
    "https://www.reddit.com".into()
}
fn default_subreddits() -> Vec<String> {
    vec!["techsupport".into(), "windows".into(), "sysadmin".into()]
}
fn default_min_upvotes() -> i64 {
    5
}
fn default_reddit_limit() -> u32 {
    50
}

/// `[sources.trends]`. Terms are configured rather than fetched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrendsSourceConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub terms: Vec<TrendTerm>,
}

/// One `[[sources.trends.terms]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendTerm {
    pub term: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend_score: Option<f64>,
}

/// `[scoring]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Weight table keyed by signal name. Signals absent here are ignored.
    #[serde(default = "default_signal_weights")]
    pub signals: BTreeMap<String, SignalWeight>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            signals: default_signal_weights(),
        }
    }
}

/// `[scoring.signals.<name>]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalWeight {
    pub weight: f64,
    /// Raw values map into `[0, 1)` as `v / (v + saturation)`; without it
    /// the value is clamped to `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saturation: Option<f64>,
}

fn default_signal_weights() -> BTreeMap<String, SignalWeight> {
    let weight = |weight, saturation| SignalWeight { weight, saturation };
    BTreeMap::from([
        ("vote_count".into(), weight(0.35, Some(10.0))),
        ("view_count".into(), weight(0.2, Some(1000.0))),
        ("answer_count".into(), weight(0.15, Some(2.0))),
        ("comment_count".into(), weight(0.15, Some(10.0))),
        ("search_volume".into(), weight(0.4, Some(1000.0))),
        ("trend_score".into(), weight(0.3, None)),
    ])
}

/// Similarity function used by the deduplicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityStrategy {
    /// Jaccard over whitespace tokens.
    #[default]
    TokenSet,
    /// Normalized Levenshtein over the whole fingerprint.
    Levenshtein,
    JaroWinkler,
}

/// `[dedup]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default)]
    pub strategy: SimilarityStrategy,

    /// Similarity strictly above this marks a near-duplicate.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    #[serde(default)]
    pub allow_near_duplicates: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            strategy: SimilarityStrategy::default(),
            similarity_threshold: default_similarity_threshold(),
            allow_near_duplicates: false,
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.85
}

/// `[selection]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default = "default_min_confidence")]
    pub min_confidence_score: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_batch_size: Option<usize>,

    /// Minimum length in characters of the error text.
    #[serde(default = "default_min_text_length")]
    pub min_text_length: usize,

    /// Case-insensitive words that disqualify a candidate.
    #[serde(default = "default_excluded_keywords")]
    pub excluded_keywords: Vec<String>,

    /// Minimum values for specific signals, enforced only when the signal is present.
    #[serde(default)]
    pub signal_floors: BTreeMap<String, f64>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_confidence_score: default_min_confidence(),
            max_batch_size: Some(10),
            min_text_length: default_min_text_length(),
            excluded_keywords: default_excluded_keywords(),
            signal_floors: BTreeMap::new(),
        }
    }
}

fn default_min_confidence() -> f64 {
    0.5
}
fn default_min_text_length() -> usize {
    10
}
fn default_excluded_keywords() -> Vec<String> {
    ["test", "sample", "example", "dummy"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// `[quality]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default = "default_min_word_count")]
    pub min_word_count: usize,

    #[serde(default = "default_max_word_count", skip_serializing_if = "Option::is_none")]
    pub max_word_count: Option<usize>,

    /// Minimum SEO score on a 0–100 scale.
    #[serde(default = "default_min_seo_score")]
    pub min_seo_score: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_word_count: default_min_word_count(),
            max_word_count: default_max_word_count(),
            min_seo_score: default_min_seo_score(),
        }
    }
}

fn default_min_word_count() -> usize {
    2000
}
fn default_max_word_count() -> Option<usize> {
    Some(8000)
}
fn default_min_seo_score() -> f64 {
    70.0
}

/// `[collection]` section: where solution text comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    #[serde(default = "default_stackexchange_api")]
    pub api_base: String,

    #[serde(default = "default_stackexchange_site")]
    pub site: String,

    /// Questions searched per candidate.
    #[serde(default = "default_max_questions")]
    pub max_questions: u32,

    /// Answers kept per candidate.
    #[serde(default = "default_max_answers")]
    pub max_answers: usize,

    /// Answers that are not accepted must score above this.
    #[serde(default = "default_min_answer_score")]
    pub min_answer_score: i64,

    #[serde(default = "default_stackexchange_key_env")]
    pub api_key_env: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            api_base: default_stackexchange_api(),
            site: default_stackexchange_site(),
            max_questions: default_max_questions(),
            max_answers: default_max_answers(),
            min_answer_score: default_min_answer_score(),
            api_key_env: default_stackexchange_key_env(),
        }
    }
}

fn default_max_questions() -> u32 {
    5
}
fn default_max_answers() -> usize {
    3
}
fn default_min_answer_score() -> i64 {
    5
}

/// `[generation]` section: the external article generator bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Program spawned to generate articles.
    #[serde(default = "default_generator_command")]
    pub command: String,

    #[serde(default = "default_generator_args")]
    pub args: Vec<String>,

    /// Language requested for every article.
    #[serde(default = "default_language")]
    pub language: String,

    /// Name of the env var holding the generator's API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Seconds to wait for one article before giving up.
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            command: default_generator_command(),
            args: default_generator_args(),
            language: default_language(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_generator_command() -> String {
    "python3".into()
}
fn default_generator_args() -> Vec<String> {
    vec!["generator/bridge.py".into()]
}
fn default_language() -> String {
    "en".into()
}
fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_generation_timeout() -> u64 {
    300
}

/// `[publish]` section: WordPress REST target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// When false, items stop at QualityChecked.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub site_url: String,

    #[serde(default)]
    pub username: String,

    /// Name of the env var holding the application password.
    #[serde(default = "default_app_password_env")]
    pub app_password_env: String,

    #[serde(default = "default_publish_status")]
    pub status: PublishStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<u64>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            site_url: String::new(),
            username: String::new(),
            app_password_env: default_app_password_env(),
            status: default_publish_status(),
            category_id: None,
        }
    }
}

fn default_app_password_env() -> String {
    "WP_APP_PASSWORD".into()
}
fn default_publish_status() -> PublishStatus {
    PublishStatus::Draft
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    8000
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Items collected and drafted at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_http_timeout() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        for (name, signal) in &self.scoring.signals {
            if !(signal.weight >= 0.0) {
                return Err(PressError::config(format!(
                    "scoring.signals.{name}.weight must be >= 0, got {}",
                    signal.weight
                )));
            }
            if let Some(saturation) = signal.saturation {
                if !(saturation > 0.0) {
                    return Err(PressError::config(format!(
                        "scoring.signals.{name}.saturation must be > 0, got {saturation}"
                    )));
                }
            }
        }

        check_unit("dedup.similarity_threshold", self.dedup.similarity_threshold)?;
        check_unit(
            "selection.min_confidence_score",
            self.selection.min_confidence_score,
        )?;

        if !(0.0..=100.0).contains(&self.quality.min_seo_score) {
            return Err(PressError::config(format!(
                "quality.min_seo_score must be within [0, 100], got {}",
                self.quality.min_seo_score
            )));
        }
        if let Some(max) = self.quality.max_word_count {
            if max < self.quality.min_word_count {
                return Err(PressError::config(format!(
                    "quality.max_word_count ({max}) is below min_word_count ({})",
                    self.quality.min_word_count
                )));
            }
        }

        if self.pipeline.concurrency == 0 {
            return Err(PressError::config("pipeline.concurrency must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(PressError::config("retry.max_attempts must be at least 1"));
        }
        if self.selection.max_batch_size == Some(0) {
            return Err(PressError::config("selection.max_batch_size must be at least 1"));
        }

        if self.publish.enabled && self.publish.site_url.trim().is_empty() {
            return Err(PressError::config(
                "publish.site_url is required when publishing is enabled",
            ));
        }

        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PressError::config(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.errorpress/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| PressError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.errorpress/errorpress.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from the default location. Returns defaults
/// if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PressError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| PressError::config(format!("failed to parse {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

/// Write a default config file, creating parent directories.
/// Uses the default location when `path` is `None`. Returns the written path.
pub fn init_config(path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| PressError::io(dir, e))?;
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| PressError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PressError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the environment variable named in the config.
pub fn resolve_secret(var_name: &str, purpose: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(PressError::config(format!(
            "{purpose} not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Read an optional secret; unset or empty yields `None`.
pub fn optional_secret(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().filter(|v| !v.is_empty())
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    if path == "~" || path.starts_with("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| PressError::config("could not determine home directory"))?;
        Ok(home.join(path.trim_start_matches('~').trim_start_matches('/')))
    } else {
        Ok(PathBuf::from(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("min_word_count"));
        assert!(toml_str.contains("WP_APP_PASSWORD"));
        assert!(toml_str.contains("[scoring.signals.vote_count]"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.quality.min_word_count, 2000);
        assert_eq!(parsed.dedup.strategy, SimilarityStrategy::TokenSet);
        assert_eq!(parsed.publish.status, PublishStatus::Draft);
        assert_eq!(parsed.scoring.signals.len(), 6);
        parsed.validate().expect("defaults are valid");
    }

    #[test]
    fn partial_config_uses_defaults() {
        let toml_str = r#"
[dedup]
strategy = "jaro_winkler"
similarity_threshold = 0.9

[scoring.signals.search_volume]
weight = 1.0

[[sources.trends.terms]]
term = "0x80070005 access denied"
search_volume = 1500.0
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.dedup.strategy, SimilarityStrategy::JaroWinkler);
        assert!(!config.dedup.allow_near_duplicates);
        assert_eq!(config.scoring.signals.len(), 1);
        assert_eq!(config.scoring.signals["search_volume"].saturation, None);
        assert_eq!(config.sources.trends.terms[0].search_volume, Some(1500.0));
        assert_eq!(config.selection.min_text_length, 10);
        assert_eq!(config.pipeline.concurrency, 4);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.dedup.similarity_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.pipeline.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.scoring.signals.insert(
            "vote_count".into(),
            SignalWeight {
                weight: -1.0,
                saturation: None,
            },
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("vote_count"));

        let mut config = AppConfig::default();
        config.publish.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn init_and_load_from_custom_path() {
        let dir = std::env::temp_dir().join(format!("ep_cfg_{}", std::process::id()));
        let path = dir.join("nested").join("errorpress.toml");
        let written = init_config(Some(&path)).expect("init");
        assert_eq!(written, path);
        let loaded = load_config_from(&path).expect("load");
        assert_eq!(loaded.retry.max_attempts, 3);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn secret_resolution() {
        let result = resolve_secret("EP_TEST_NONEXISTENT_SECRET_12345", "WordPress password");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("WordPress password not found"));
        assert_eq!(optional_secret("EP_TEST_NONEXISTENT_SECRET_12345"), None);
    }

    #[test]
    fn home_expansion() {
        assert_eq!(expand_home("/var/lib/ep").expect("abs"), PathBuf::from("/var/lib/ep"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/.errorpress").expect("home"), home.join(".errorpress"));
        }
    }
}
