//! Article generation through an external bridge process.
//!
//! The bridge speaks JSON lines over stdin/stdout:
//!
//! ```text
//! bridge → {"type":"ready"}
//! us     → {"type":"generate","id":"req-1","task":{...}}
//! bridge → {"type":"result","id":"req-1","article":{...}}
//!        | {"type":"error","id":"req-1","error":"..."}
//! us     → {"type":"shutdown"}
//! ```
//!
//! One process is spawned per article so concurrent items never share a pipe.
//! Bridge logs go to our stderr.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use errorpress_shared::{
    AppConfig, Article, ArticleGenerator, Candidate, GenerationConfig, PressError, Result,
    Solution, SolutionReference,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, instrument, warn};

/// How long a bridge may take to exit after answering.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Protocol types
// ---------------------------------------------------------------------------

/// Everything the bridge needs to write one article.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationTask<'a> {
    pub error_text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<&'a str>,
    pub solution: &'a str,
    pub references: &'a [SolutionReference],
    pub language: &'a str,
    pub model: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RequestMessage<'a> {
    Generate { id: String, task: GenerationTask<'a> },
    Shutdown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseMessage {
    Ready,
    Result { id: String, article: Article },
    Error { id: String, error: String },
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// [`ArticleGenerator`] backed by the bridge subprocess.
pub struct BridgeGenerator {
    config: GenerationConfig,
    request_counter: AtomicU64,
}

impl BridgeGenerator {
    pub fn new(config: GenerationConfig) -> Self {
        Self {
            config,
            request_counter: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.generation.clone())
    }

    /// The timeout covers startup and the answer only. A bridge that answers
    /// and then lingers still yields its article.
    async fn exchange(&self, task: GenerationTask<'_>) -> Result<Article> {
        let mut bridge = Bridge::spawn(&self.config)?;
        let id = format!(
            "req-{}",
            self.request_counter.fetch_add(1, Ordering::Relaxed) + 1
        );

        let limit = Duration::from_secs(self.config.timeout_secs);
        let answer = tokio::time::timeout(limit, async {
            bridge.wait_for_ready().await?;
            bridge.send_task(id, task).await
        })
        .await;

        match answer {
            Ok(article) => {
                bridge.shutdown().await;
                article
            }
            // dropping the handle kills the process
            Err(_) => Err(PressError::GenerationFailed(format!(
                "bridge did not answer within {}s",
                self.config.timeout_secs
            ))),
        }
    }
}

#[async_trait]
impl ArticleGenerator for BridgeGenerator {
    #[instrument(skip_all, fields(fingerprint = %candidate.fingerprint, language = %language))]
    async fn generate_article(
        &self,
        candidate: &Candidate,
        solution: &Solution,
        language: &str,
    ) -> Result<Article> {
        let task = GenerationTask {
            error_text: &candidate.raw_text,
            title: candidate.title.as_deref(),
            source_url: candidate.source_url.as_deref(),
            solution: &solution.text,
            references: &solution.references,
            language,
            model: &self.config.model,
        };

        let article = self.exchange(task).await?;
        info!(title = %article.title, "article generated");
        Ok(article)
    }
}

// ---------------------------------------------------------------------------
// Bridge handle
// ---------------------------------------------------------------------------

struct Bridge {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

impl Bridge {
    fn spawn(config: &GenerationConfig) -> Result<Self> {
        debug!(cmd = %config.command, args = ?config.args, "spawning generator bridge");

        // A missing program is a setup problem, not a per-article failure.
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .env("ERRORPRESS_API_KEY_ENV", &config.api_key_env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PressError::config(format!(
                    "failed to spawn generator: {e}. Is `{}` installed?",
                    config.command
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PressError::GenerationFailed("failed to capture bridge stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PressError::GenerationFailed("failed to capture bridge stdout".into()))?;

        Ok(Self {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
        })
    }

    async fn read_message(&mut self) -> Result<ResponseMessage> {
        let line = self
            .lines
            .next_line()
            .await
            .map_err(|e| PressError::GenerationFailed(format!("bridge read error: {e}")))?
            .ok_or_else(|| {
                PressError::GenerationFailed("bridge closed stdout unexpectedly".into())
            })?;

        serde_json::from_str(line.trim()).map_err(|e| {
            PressError::GenerationFailed(format!(
                "invalid bridge message: {e} (got: {})",
                line.chars().take(200).collect::<String>()
            ))
        })
    }

    async fn write_message(&mut self, msg: &RequestMessage<'_>) -> Result<()> {
        let mut json = serde_json::to_string(msg).map_err(|e| {
            PressError::GenerationFailed(format!("failed to serialize request: {e}"))
        })?;
        json.push('\n');
        self.stdin
            .write_all(json.as_bytes())
            .await
            .map_err(|e| PressError::GenerationFailed(format!("failed to write to bridge: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| PressError::GenerationFailed(format!("failed to flush bridge stdin: {e}")))
    }

    async fn wait_for_ready(&mut self) -> Result<()> {
        match self.read_message().await? {
            ResponseMessage::Ready => Ok(()),
            other => Err(PressError::GenerationFailed(format!(
                "expected ready message, got {other:?}"
            ))),
        }
    }

    async fn send_task(&mut self, id: String, task: GenerationTask<'_>) -> Result<Article> {
        self.write_message(&RequestMessage::Generate {
            id: id.clone(),
            task,
        })
        .await?;

        match self.read_message().await? {
            ResponseMessage::Result { id: resp_id, article } if resp_id == id => Ok(article),
            ResponseMessage::Error { id: resp_id, error } if resp_id == id => {
                Err(PressError::GenerationFailed(error))
            }
            other => Err(PressError::GenerationFailed(format!(
                "unexpected bridge reply to {id}: {other:?}"
            ))),
        }
    }

    async fn shutdown(mut self) {
        let _ = tokio::time::timeout(
            SHUTDOWN_GRACE,
            self.write_message(&RequestMessage::Shutdown),
        )
        .await;
        let Bridge {
            mut child, stdin, ..
        } = self;
        drop(stdin);

        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!(?status, "bridge exited"),
            Ok(Err(e)) => warn!("bridge wait error: {e}"),
            Err(_) => {
                warn!("bridge did not exit after shutdown, killing it");
                if let Err(e) = child.kill().await {
                    warn!("failed to kill bridge: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use errorpress_shared::{Signals, Source};

    fn script_generator(script: &str, timeout_secs: u64) -> BridgeGenerator {
        BridgeGenerator::new(GenerationConfig {
            command: "sh".into(),
            args: vec!["-c".into(), script.into()],
            timeout_secs,
            ..GenerationConfig::default()
        })
    }

    fn candidate() -> Candidate {
        Candidate {
            raw_text: "ERR_SSL_PROTOCOL_ERROR".into(),
            source: Source::Manual,
            source_signals: Signals::new(),
            confidence_score: 1.0,
            fingerprint: "err ssl protocol error".into(),
            source_url: None,
            title: None,
        }
    }

    fn solution() -> Solution {
        Solution {
            text: "Clear the SSL state.".into(),
            references: vec![],
        }
    }

    #[tokio::test]
    async fn generates_article_over_json_lines() {
        let generator = script_generator(
            r###"echo '{"type":"ready"}'
read -r req
case "$req" in *'"language":"de"'*) ;; *) exit 3 ;; esac
echo '{"type":"result","id":"req-1","article":{"title":"ERR_SSL_PROTOCOL_ERROR beheben","body":"## Ursache","metadata":{"slug":"err-ssl-protocol-error","language":"de"}}}'
read -r bye"###,
            10,
        );

        let article = generator
            .generate_article(&candidate(), &solution(), "de")
            .await
            .expect("generate");
        assert_eq!(article.title, "ERR_SSL_PROTOCOL_ERROR beheben");
        assert_eq!(article.metadata.slug, "err-ssl-protocol-error");
        assert_eq!(article.metadata.language, "de");
    }

    #[tokio::test]
    async fn bridge_error_is_generation_failed() {
        let generator = script_generator(
            r#"echo '{"type":"ready"}'
read -r req
echo '{"type":"error","id":"req-1","error":"model refused"}'"#,
            10,
        );
        let err = generator
            .generate_article(&candidate(), &solution(), "en")
            .await
            .unwrap_err();
        assert!(matches!(err, PressError::GenerationFailed(ref m) if m == "model refused"));
    }

    #[tokio::test]
    async fn silent_bridge_times_out() {
        let generator = script_generator(r#"echo '{"type":"ready"}'; sleep 30"#, 1);
        let err = generator
            .generate_article(&candidate(), &solution(), "en")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("within 1s"));
    }

    #[tokio::test]
    async fn slow_exit_after_answer_keeps_the_article() {
        let generator = script_generator(
            r###"echo '{"type":"ready"}'
read -r req
echo '{"type":"result","id":"req-1","article":{"title":"Fix it","body":"## Steps"}}'
sleep 30"###,
            1,
        );
        let article = generator
            .generate_article(&candidate(), &solution(), "en")
            .await
            .expect("article despite slow exit");
        assert_eq!(article.title, "Fix it");
    }

    #[tokio::test]
    async fn missing_program_is_config_error() {
        let generator = BridgeGenerator::new(GenerationConfig {
            command: "errorpress-no-such-generator".into(),
            args: vec![],
            ..GenerationConfig::default()
        });
        let err = generator
            .generate_article(&candidate(), &solution(), "en")
            .await
            .unwrap_err();
        assert!(matches!(err, PressError::Config { .. }));
    }
}
