//! Built-in signal sources.

mod reddit;
mod stackoverflow;
mod trends;

pub use reddit::RedditSource;
pub use stackoverflow::StackOverflowSource;
pub use trends::TrendsSource;

/// Apply an optional per-call cap.
pub(crate) fn cap<T>(mut records: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit {
        records.truncate(limit);
    }
    records
}
