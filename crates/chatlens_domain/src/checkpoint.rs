use chrono::{DateTime, Utc};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};

/// Resume marker of a run. Every conversation before `current_index` has a
/// persisted result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(rename = "current_index")]
    pub last_completed_index: usize,
    pub total_count: usize,
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(last_completed_index: usize, total_count: usize) -> Self {
        Self { last_completed_index, total_count, timestamp: Utc::now() }
    }

    pub fn is_complete(&self) -> bool {
        self.last_completed_index >= self.total_count
    }

    pub fn remaining(&self) -> usize {
        self.total_count.saturating_sub(self.last_completed_index)
    }
}

/// Header written alongside the annotated conversations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(into)]
pub struct RunMetadata {
    pub total_conversations: usize,
    pub processed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[setters(strip_option)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(rename = "llm_provider")]
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub gap_threshold_minutes: u64,
}

impl RunMetadata {
    pub fn new(total_conversations: usize, provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            total_conversations,
            processed_at: Utc::now(),
            last_updated: None,
            provider: provider.into(),
            model: model.into(),
            gap_threshold_minutes: 30,
        }
    }
}
