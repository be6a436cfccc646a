//! KIS2 source extraction
//!
//! A [`SourceExtractor`] turns an entity type into the flat JSON records the
//! legacy system serves for it, or a typed [`SourceError`].

pub mod client;
pub mod retry;
pub mod seeded;
pub mod session;

use async_trait::async_trait;

use crate::import::types::EntityKind;

pub use client::Kis2Source;
pub use retry::RetryConfig;
pub use seeded::{SeededSource, StaticSource};
pub use session::{Kis2Session, SessionConfig};

/// Fetches the raw records of one entity type
#[async_trait]
pub trait SourceExtractor: Send + Sync {
    async fn fetch(&self, kind: EntityKind) -> Result<Vec<serde_json::Value>, SourceError>;
}

/// Failure talking to the legacy system
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("could not connect to {url}: {message}")]
    Connect { url: String, message: String },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("{url} returned HTML instead of JSON (session rejected or wrong endpoint)")]
    NotJson { url: String },
    #[error("{url} returned malformed JSON: {message}")]
    Decode { url: String, message: String },
    #[error("{url} returned {found} instead of a JSON array")]
    UnexpectedShape { url: String, found: &'static str },
}

impl SourceError {
    /// Check if retrying the request could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Timeout { .. } | SourceError::Connect { .. } => true,
            SourceError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        let url = url.to_string();
        if err.is_timeout() {
            SourceError::Timeout { url }
        } else if err.is_connect() {
            SourceError::Connect { url, message: err.to_string() }
        } else {
            SourceError::Http { url, message: err.to_string() }
        }
    }
}

/// JSON type name used in shape errors
pub(crate) fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
