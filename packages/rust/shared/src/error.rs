//! Error types for errorpress.
//!
//! Library crates use [`PressError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all errorpress operations.
#[derive(Debug, thiserror::Error)]
pub enum PressError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Connection-level failure (timeout, refused, reset).
    #[error("network error: {0}")]
    Network(String),

    /// A remote API answered with a non-success status.
    #[error("HTTP {status} from {url}: {message}")]
    Http {
        status: u16,
        url: String,
        message: String,
    },

    /// Response body or payload could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A raw source record could not be turned into a candidate.
    #[error("malformed record from {source_name}: {reason}")]
    MalformedRecord { source_name: String, reason: String },

    /// No usable solution text exists for a candidate.
    #[error("no solution found for '{error_text}'")]
    MissingSolution { error_text: String },

    /// The generation collaborator failed to produce an article.
    #[error("article generation failed: {0}")]
    GenerationFailed(String),

    /// The publishing collaborator refused or failed the request.
    #[error("publish failed: {0}")]
    Publish(String),

    /// A lifecycle event was applied to an item in a state that does not accept it.
    #[error("invalid transition for item {sequence_id}: cannot {action} from {from}")]
    InvalidTransition {
        sequence_id: u64,
        from: String,
        action: String,
    },

    /// Two items were about to share a sequence id. Indicates a serialization bug.
    #[error("duplicate sequence assignment: {sequence_id} ({detail})")]
    DuplicateSequenceAssignment { sequence_id: u64, detail: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PressError>;

impl PressError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a malformed-record error for the named source.
    pub fn malformed(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Build an HTTP status error.
    pub fn http(status: u16, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            url: url.into(),
            message: message.into(),
        }
    }

    /// Whether a retry with backoff may succeed: connection failures,
    /// server errors (5xx) and rate limiting (429).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    /// Whether this error must abort the whole run rather than a single
    /// candidate or item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::Storage(_)
                | Self::Io { .. }
                | Self::DuplicateSequenceAssignment { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = PressError::config("missing weights");
        assert_eq!(err.to_string(), "config error: missing weights");

        let err = PressError::InvalidTransition {
            sequence_id: 7,
            from: "published".into(),
            action: "reject".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid transition for item 7: cannot reject from published"
        );
    }

    #[test]
    fn transient_classification() {
        assert!(PressError::Network("timed out".into()).is_transient());
        assert!(PressError::http(503, "https://x", "unavailable").is_transient());
        assert!(PressError::http(429, "https://x", "slow down").is_transient());
        assert!(!PressError::http(404, "https://x", "missing").is_transient());
        assert!(!PressError::GenerationFailed("bad".into()).is_transient());
    }

    #[test]
    fn fatal_classification() {
        assert!(PressError::Storage("disk full".into()).is_fatal());
        assert!(
            PressError::DuplicateSequenceAssignment {
                sequence_id: 3,
                detail: "slot exists".into()
            }
            .is_fatal()
        );
        assert!(!PressError::malformed("reddit", "empty title").is_fatal());
        assert!(!PressError::MissingSolution { error_text: "x".into() }.is_fatal());
    }
}
