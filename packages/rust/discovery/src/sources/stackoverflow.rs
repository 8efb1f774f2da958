//! StackExchange `search/advanced` source.

use async_trait::async_trait;
use errorpress_shared::{
    Result, RetryPolicy, Source, StackOverflowSourceConfig, optional_secret,
};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::cap;
use crate::http::get_json;
use crate::{QueryParams, RawRecord, SignalSource};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Question>,
}

#[derive(Debug, Deserialize)]
struct Question {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    score: Option<i64>,
    #[serde(default)]
    view_count: Option<i64>,
    #[serde(default)]
    answer_count: Option<i64>,
    #[serde(default)]
    question_id: Option<u64>,
}

/// Searches StackOverflow questions by tag, highest voted first.
pub struct StackOverflowSource {
    client: Client,
    config: StackOverflowSourceConfig,
    retry: RetryPolicy,
}

impl StackOverflowSource {
    pub fn new(client: Client, config: StackOverflowSourceConfig, retry: RetryPolicy) -> Self {
        Self {
            client,
            config,
            retry,
        }
    }

    async fn search_tag(&self, tag: &str) -> Result<Vec<Question>> {
        let url = format!("{}/search/advanced", self.config.api_base.trim_end_matches('/'));
        let mut query = vec![
            ("order", "desc".to_string()),
            ("sort", "votes".to_string()),
            ("tagged", tag.to_string()),
            ("q", self.config.query.clone()),
            ("site", self.config.site.clone()),
            ("pagesize", self.config.page_size.to_string()),
        ];
        if let Some(key) = optional_secret(&self.config.api_key_env) {
            query.push(("key", key));
        }

        let response: SearchResponse = get_json(&self.client, &url, &query, &self.retry).await?;
        debug!(tag, questions = response.items.len(), "stackoverflow search");
        Ok(response.items)
    }
}

#[async_trait]
impl SignalSource for StackOverflowSource {
    fn source(&self) -> Source {
        Source::StackOverflow
    }

    #[instrument(skip_all, fields(source = "stack_overflow"))]
    async fn fetch_candidates(&self, params: &QueryParams) -> Result<Vec<RawRecord>> {
        let mut seen = std::collections::HashSet::new();
        let mut records = Vec::new();

        for tag in &self.config.tags {
            for q in self.search_tag(tag).await? {
                // The same question shows up under several tags.
                if let Some(id) = q.question_id {
                    if !seen.insert(id) {
                        continue;
                    }
                }
                records.push(to_record(q));
            }
        }

        Ok(cap(records, params.limit))
    }
}

fn to_record(q: Question) -> RawRecord {
    let mut fields = serde_json::Map::new();
    for (name, value) in [
        ("score", q.score),
        ("view_count", q.view_count),
        ("answer_count", q.answer_count),
    ] {
        if let Some(v) = value {
            fields.insert(name.into(), v.into());
        }
    }
    RawRecord {
        source: Source::StackOverflow,
        text: q.title,
        url: q.link,
        fields,
    }
}
