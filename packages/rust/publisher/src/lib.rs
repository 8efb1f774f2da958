//! WordPress REST publisher.
//!
//! Posts go to `{site}/wp-json/wp/v2/posts` with basic auth (application
//! password). Each item's remote slug ends in its sequence id, so a repeated
//! publish for the same item finds the earlier post instead of creating a
//! second one.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use errorpress_shared::{
    AppConfig, Article, PressError, PublishRef, PublishStatus, Publisher, Result, RetryPolicy,
    network_error, resolve_secret, retry_with_backoff,
};
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

/// User-Agent string for publishing requests.
const USER_AGENT: &str = concat!("errorpress/", env!("CARGO_PKG_VERSION"));

/// Tags attached to one post at most.
const MAX_TAGS: usize = 10;

/// Longest slug stem before the sequence suffix.
const MAX_SLUG_STEM: usize = 50;

#[derive(Debug, Deserialize)]
struct RemotePost {
    id: u64,
    #[serde(default)]
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteTag {
    id: u64,
    #[serde(default)]
    name: String,
}

/// Connection settings for a WordPress site.
#[derive(Debug, Clone)]
pub struct WordPressSettings {
    pub site_url: String,
    pub username: String,
    pub app_password: String,
    pub category_id: Option<u64>,
}

/// [`Publisher`] for the WordPress REST API.
pub struct WordPressPublisher {
    client: Client,
    settings: WordPressSettings,
    /// Applied to read-only lookups; post creation is attempted once.
    lookup_retry: RetryPolicy,
}

impl WordPressPublisher {
    pub fn new(client: Client, settings: WordPressSettings, lookup_retry: RetryPolicy) -> Self {
        Self {
            client,
            settings,
            lookup_retry,
        }
    }

    /// Build from application config, reading the password from the
    /// environment variable the config names.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let publish = &config.publish;
        if publish.site_url.trim().is_empty() {
            return Err(PressError::config("publish.site_url is not set"));
        }
        let app_password = resolve_secret(&publish.app_password_env, "WordPress application password")?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.pipeline.http_timeout_secs))
            .build()
            .map_err(|e| network_error("failed to build HTTP client", e))?;

        Ok(Self::new(
            client,
            WordPressSettings {
                site_url: publish.site_url.clone(),
                username: publish.username.clone(),
                app_password,
                category_id: publish.category_id,
            },
            RetryPolicy::from(&config.retry),
        ))
    }

    fn endpoint(&self, resource: &str) -> String {
        format!(
            "{}/wp-json/wp/v2/{resource}",
            self.settings.site_url.trim_end_matches('/')
        )
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.basic_auth(&self.settings.username, Some(&self.settings.app_password))
    }

    /// Look for a post created by an earlier attempt.
    async fn find_existing(&self, slug: &str) -> Result<Option<RemotePost>> {
        let url = self.endpoint("posts");
        let posts: Vec<RemotePost> = retry_with_backoff("wordpress lookup", &self.lookup_retry, || {
            let req = self
                .authed(self.client.get(&url))
                .query(&[("slug", slug), ("status", "any"), ("context", "edit")]);
            async move { read_json(req, &url_label("posts")).await }
        })
        .await?;
        Ok(posts.into_iter().next())
    }

    /// Resolve tag names to ids, creating missing tags. Failures drop the tag.
    async fn resolve_tags(&self, names: &[String]) -> Vec<u64> {
        let mut ids = Vec::new();
        for name in names.iter().take(MAX_TAGS) {
            match self.resolve_tag(name).await {
                Ok(id) => ids.push(id),
                Err(e) => warn!(tag = %name, error = %e, "skipping tag"),
            }
        }
        ids
    }

    async fn resolve_tag(&self, name: &str) -> Result<u64> {
        let url = self.endpoint("tags");
        let found: Vec<RemoteTag> = retry_with_backoff("wordpress tag lookup", &self.lookup_retry, || {
            let req = self.authed(self.client.get(&url)).query(&[("search", name)]);
            async move { read_json(req, &url_label("tags")).await }
        })
        .await?;

        if let Some(tag) = found.into_iter().find(|t| t.name == name) {
            return Ok(tag.id);
        }

        let req = self
            .authed(self.client.post(&url))
            .json(&json!({ "name": name, "slug": slugify(name) }));
        let created: RemoteTag = read_json(req, &url_label("tags")).await?;
        debug!(tag = name, id = created.id, "created tag");
        Ok(created.id)
    }
}

#[async_trait]
impl Publisher for WordPressPublisher {
    #[instrument(skip_all, fields(sequence_id = idempotency_key))]
    async fn publish(
        &self,
        article: &Article,
        status: PublishStatus,
        idempotency_key: u64,
    ) -> Result<PublishRef> {
        let slug = remote_slug(article, idempotency_key);

        if let Some(existing) = self.find_existing(&slug).await? {
            info!(post_id = existing.id, %slug, "post already exists, reusing it");
            return Ok(to_ref(existing));
        }

        let tags = self.resolve_tags(&article.metadata.tags).await;
        let content = article
            .metadata
            .extra
            .get("html")
            .and_then(|v| v.as_str())
            .unwrap_or(&article.body);

        let mut body = json!({
            "title": article.title,
            "content": content,
            "excerpt": article.metadata.excerpt,
            "status": status.as_str(),
            "slug": slug,
            "tags": tags,
        });
        if let Some(category) = self.settings.category_id {
            body["categories"] = json!([category]);
        }

        let req = self.authed(self.client.post(self.endpoint("posts"))).json(&body);
        let response = req
            .send()
            .await
            .map_err(|e| network_error("wordpress create post", e))?;

        let code = response.status();
        if code != StatusCode::CREATED {
            let text = response.text().await.unwrap_or_default();
            return Err(PressError::Publish(format!(
                "create post returned HTTP {code}: {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        let post: RemotePost = response
            .json()
            .await
            .map_err(|e| PressError::parse(format!("create post response: {e}")))?;
        info!(post_id = post.id, %slug, status = status.as_str(), "post created");
        Ok(to_ref(post))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn read_json<T: serde::de::DeserializeOwned>(
    req: reqwest::RequestBuilder,
    label: &str,
) -> Result<T> {
    let response = req.send().await.map_err(|e| network_error(label, e))?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(PressError::http(
            status.as_u16(),
            label,
            text.chars().take(200).collect::<String>(),
        ));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| PressError::parse(format!("{label}: {e}")))
}

fn url_label(resource: &str) -> String {
    format!("wp/v2/{resource}")
}

fn to_ref(post: RemotePost) -> PublishRef {
    PublishRef {
        id: post.id.to_string(),
        url: post.link,
    }
}

/// Lowercase, non-word runs as single dashes, trimmed and capped.
pub fn slugify(text: &str) -> String {
    static NON_WORD: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

    let lower = text.to_lowercase();
    let dashed = NON_WORD.replace_all(&lower, "-");
    let mut slug: String = dashed.trim_matches('-').chars().take(MAX_SLUG_STEM).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Stable per-item slug: article slug (or title) plus the sequence id.
pub fn remote_slug(article: &Article, sequence_id: u64) -> String {
    let stem = if article.metadata.slug.trim().is_empty() {
        slugify(&article.title)
    } else {
        slugify(&article.metadata.slug)
    };
    if stem.is_empty() {
        format!("error-{sequence_id}")
    } else {
        format!("{stem}-{sequence_id}")
    }
}
