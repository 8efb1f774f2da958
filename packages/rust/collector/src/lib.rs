//! Solution collection from StackExchange.
//!
//! For a candidate, searches questions with an accepted answer that match the
//! error text, takes the best answers (accepted, or scoring above a threshold),
//! converts their HTML bodies to Markdown and concatenates them with source
//! attribution. No usable answer yields [`PressError::MissingSolution`].

mod markdown;

use std::time::Duration;

use async_trait::async_trait;
use errorpress_shared::{
    AppConfig, Candidate, CollectionConfig, PressError, Result, RetryPolicy, Solution,
    SolutionCollector, SolutionReference, network_error, optional_secret, retry_with_backoff,
};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};
use url::Url;

pub use markdown::answer_to_markdown;

/// User-Agent string for collection requests.
const USER_AGENT: &str = concat!("errorpress/", env!("CARGO_PKG_VERSION"));

/// Answers looked at per question, in vote order.
const ANSWERS_PER_QUESTION: usize = 3;

// ---------------------------------------------------------------------------
// API shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ItemsResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Question {
    question_id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
}

#[derive(Debug, Deserialize)]
struct Answer {
    #[serde(default)]
    body: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    is_accepted: bool,
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// [`SolutionCollector`] backed by the StackExchange API.
pub struct StackExchangeCollector {
    client: Client,
    config: CollectionConfig,
    retry: RetryPolicy,
    api_key: Option<String>,
}

impl StackExchangeCollector {
    pub fn new(client: Client, config: CollectionConfig, retry: RetryPolicy) -> Self {
        let api_key = optional_secret(&config.api_key_env);
        Self {
            client,
            config,
            retry,
            api_key,
        }
    }

    /// Build a collector with its own HTTP client from application config.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.pipeline.http_timeout_secs))
            .build()
            .map_err(|e| network_error("failed to build HTTP client", e))?;
        Ok(Self::new(
            client,
            config.collection.clone(),
            RetryPolicy::from(&config.retry),
        ))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.api_base.trim_end_matches('/'))
    }

    fn with_common(&self, mut query: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        query.push(("site", self.config.site.clone()));
        if let Some(key) = &self.api_key {
            query.push(("key", key.clone()));
        }
        query
    }

    async fn search_questions(&self, error_text: &str) -> Result<Vec<Question>> {
        let query = self.with_common(vec![
            ("order", "desc".into()),
            ("sort", "votes".into()),
            ("q", error_text.to_string()),
            ("accepted", "True".into()),
            ("pagesize", self.config.max_questions.to_string()),
        ]);
        let response: ItemsResponse<Question> =
            self.get_json(&self.endpoint("search/advanced"), &query).await?;
        Ok(response.items)
    }

    async fn answers_for(&self, question_id: u64) -> Result<Vec<Answer>> {
        let query = self.with_common(vec![
            ("order", "desc".into()),
            ("sort", "votes".into()),
            ("filter", "withbody".into()),
        ]);
        let url = self.endpoint(&format!("questions/{question_id}/answers"));
        let response: ItemsResponse<Answer> = self.get_json(&url, &query).await?;
        Ok(response.items)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&'static str, String)],
    ) -> Result<T> {
        let client = &self.client;
        retry_with_backoff(url, &self.retry, move || async move {
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

    fn is_usable(&self, answer: &Answer) -> bool {
        answer.is_accepted || answer.score > self.config.min_answer_score
    }
}

#[async_trait]
impl SolutionCollector for StackExchangeCollector {
    #[instrument(skip_all, fields(fingerprint = %candidate.fingerprint))]
    async fn collect(&self, candidate: &Candidate) -> Result<Solution> {
        let questions = self.search_questions(&candidate.raw_text).await?;
        debug!(questions = questions.len(), "matching questions");

        let mut sections = Vec::new();
        let mut references = Vec::new();

        'questions: for question in &questions {
            let base = Url::parse(&question.link).ok();
            let answers = self.answers_for(question.question_id).await?;

            for answer in answers.iter().take(ANSWERS_PER_QUESTION) {
                if !self.is_usable(answer) {
                    continue;
                }
                let body = answer_to_markdown(&answer.body, base.as_ref())?;
                if body.is_empty() {
                    continue;
                }

                let title = markdown_title(&question.title);
                sections.push(format!(
                    "### {title}\n\nSource: <{}> (score {}{})\n\n{body}",
                    question.link,
                    answer.score,
                    if answer.is_accepted { ", accepted" } else { "" },
                ));
                references.push(SolutionReference {
                    title,
                    url: question.link.clone(),
                    score: answer.score,
                });

                if references.len() >= self.config.max_answers {
                    break 'questions;
                }
            }
        }

        if sections.is_empty() {
            return Err(PressError::MissingSolution {
                error_text: candidate.raw_text.clone(),
            });
        }

        info!(answers = references.len(), "solution collected");
        Ok(Solution {
            text: sections.join("\n\n"),
            references,
        })
    }
}

/// Question titles arrive HTML-encoded.
fn markdown_title(title: &str) -> String {
    let fragment = scraper::Html::parse_fragment(title);
    let text: String = fragment.root_element().text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use errorpress_shared::{Signals, Source};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn candidate() -> Candidate {
        Candidate {
            raw_text: "0x80070005".into(),
            source: Source::StackOverflow,
            source_signals: Signals::new(),
            confidence_score: 0.8,
            fingerprint: "0x80070005".into(),
            source_url: None,
            title: None,
        }
    }

    fn collector(server: &MockServer, max_answers: usize) -> StackExchangeCollector {
        let config = CollectionConfig {
            api_base: server.uri(),
            max_answers,
            api_key_env: "EP_TEST_NO_SE_KEY".into(),
            ..CollectionConfig::default()
        };
        StackExchangeCollector::new(Client::new(), config, RetryPolicy::none())
    }

    async fn mount_search(server: &MockServer, questions: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/search/advanced"))
            .and(query_param("accepted", "True"))
            .and(query_param("q", "0x80070005"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": questions })),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn collects_accepted_and_high_scoring_answers() {
        let server = MockServer::start().await;
        mount_search(
            &server,
            serde_json::json!([
                {"question_id": 10, "title": "Access denied &quot;0x80070005&quot; on update", "link": "https://stackoverflow.com/q/10"}
            ]),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/questions/10/answers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"body": "<p>Run <code>sfc /scannow</code>.</p>", "score": 3, "is_accepted": true},
                    {"body": "<p>Reset permissions.</p>", "score": 12, "is_accepted": false},
                    {"body": "<p>Reboot.</p>", "score": 1, "is_accepted": false}
                ]
            })))
            .mount(&server)
            .await;

        let solution = collector(&server, 3)
            .collect(&candidate())
            .await
            .expect("collect");

        assert_eq!(solution.references.len(), 2);
        assert_eq!(solution.references[0].title, "Access denied \"0x80070005\" on update");
        assert!(solution.text.contains("`sfc /scannow`"));
        assert!(solution.text.contains("Reset permissions."));
        assert!(!solution.text.contains("Reboot."));
        assert!(solution.text.contains("score 3, accepted"));
    }

    #[tokio::test]
    async fn stops_at_max_answers() {
        let server = MockServer::start().await;
        mount_search(
            &server,
            serde_json::json!([
                {"question_id": 1, "title": "First", "link": "https://stackoverflow.com/q/1"},
                {"question_id": 2, "title": "Second", "link": "https://stackoverflow.com/q/2"}
            ]),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/questions/1/answers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"body": "<p>Only answer.</p>", "score": 40, "is_accepted": true}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/questions/2/answers"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let solution = collector(&server, 1)
            .collect(&candidate())
            .await
            .expect("collect");
        assert_eq!(solution.references.len(), 1);
    }

    #[tokio::test]
    async fn no_usable_answers_is_missing_solution() {
        let server = MockServer::start().await;
        mount_search(&server, serde_json::json!([])).await;

        let err = collector(&server, 3)
            .collect(&candidate())
            .await
            .unwrap_err();
        assert!(matches!(err, PressError::MissingSolution { .. }));
    }
}
