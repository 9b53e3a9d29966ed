use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::{Analysis, Conversation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    RateLimited,
    Timeout,
    Other,
}

/// Why a single annotation attempt failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct AnnotationFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Wait advertised by the provider, if any.
    pub retry_after: Option<Duration>,
}

impl AnnotationFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), retry_after: None }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimited, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Other, message)
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == FailureKind::RateLimited
    }
}

/// Remote oracle that annotates a conversation. One call is one attempt,
/// retrying is the caller's business.
#[async_trait]
pub trait AnnotationClient: Send + Sync {
    async fn analyze(&self, conversation: &Conversation) -> Result<Analysis, AnnotationFailure>;

    fn provider(&self) -> &str;

    fn model(&self) -> &str;
}
