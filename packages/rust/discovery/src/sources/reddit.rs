//! Reddit public `search.json` source.

use async_trait::async_trait;
use errorpress_shared::{RedditSourceConfig, Result, RetryPolicy, Source};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::cap;
use crate::http::get_json;
use crate::{QueryParams, RawRecord, SignalSource};

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    title: String,
    #[serde(default)]
    ups: Option<i64>,
    #[serde(default)]
    num_comments: Option<i64>,
    #[serde(default)]
    permalink: Option<String>,
}

/// Searches configured subreddits for error reports.
pub struct RedditSource {
    client: Client,
    config: RedditSourceConfig,
    retry: RetryPolicy,
}

impl RedditSource {
    pub fn new(client: Client, config: RedditSourceConfig, retry: RetryPolicy) -> Self {
        Self {
            client,
            config,
            retry,
        }
    }

    async fn search_subreddit(&self, subreddit: &str) -> Result<Vec<Post>> {
        let url = format!(
            "{}/r/{subreddit}/search.json",
            self.config.base_url.trim_end_matches('/')
        );
        let query = [
            ("q", "error".to_string()),
            ("restrict_sr", "true".to_string()),
            ("sort", "top".to_string()),
            ("t", "month".to_string()),
            ("limit", self.config.limit.to_string()),
        ];

        let listing: Listing = get_json(&self.client, &url, &query, &self.retry).await?;
        let posts: Vec<Post> = listing.data.children.into_iter().map(|c| c.data).collect();
        debug!(subreddit, posts = posts.len(), "reddit search");
        Ok(posts)
    }
}

#[async_trait]
impl SignalSource for RedditSource {
    fn source(&self) -> Source {
        Source::Reddit
    }

    #[instrument(skip_all, fields(source = "reddit"))]
    async fn fetch_candidates(&self, params: &QueryParams) -> Result<Vec<RawRecord>> {
        let mut records = Vec::new();

        for subreddit in &self.config.subreddits {
            for post in self.search_subreddit(subreddit).await? {
                if post.ups.unwrap_or(0) < self.config.min_upvotes {
                    continue;
                }
                records.push(self.to_record(post));
            }
        }

        Ok(cap(records, params.limit))
    }
}

impl RedditSource {
    fn to_record(&self, post: Post) -> RawRecord {
        let mut fields = serde_json::Map::new();
        if let Some(ups) = post.ups {
            fields.insert("ups".into(), ups.into());
        }
        if let Some(comments) = post.num_comments {
            fields.insert("num_comments".into(), comments.into());
        }
        RawRecord {
            source: Source::Reddit,
            text: post.title,
            url: post
                .permalink
                .map(|p| format!("{}{p}", self.config.base_url.trim_end_matches('/'))),
            fields,
        }
    }
}
