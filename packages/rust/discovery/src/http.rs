//! HTTP client construction and JSON fetching with retry.

use std::time::Duration;

use errorpress_shared::{
    PipelineConfig, PressError, Result, RetryPolicy, network_error, retry_with_backoff,
};
use reqwest::Client;
use serde::de::DeserializeOwned;

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// User-Agent string for discovery requests.
const USER_AGENT: &str = concat!("errorpress/", env!("CARGO_PKG_VERSION"));

/// Client settings for source requests.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout_secs: u64,
}

impl From<&PipelineConfig> for HttpOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            timeout_secs: config.http_timeout_secs,
        }
    }
}

/// Build a reqwest client with appropriate settings.
pub fn build_client(opts: &HttpOptions) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(opts.timeout_secs))
        .build()
        .map_err(|e| network_error("failed to build HTTP client", e))
}

/// GET `url` with query parameters and decode a JSON body, retrying
/// transient failures.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    query: &[(&str, String)],
    retry: &RetryPolicy,
) -> Result<T> {
    retry_with_backoff(url, retry, move || async move {
        let response = client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| network_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PressError::http(
                status.as_u16(),
                url,
                body.chars().take(200).collect::<String>(),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PressError::parse(format!("{url}: {e}")))
    })
    .await
}
