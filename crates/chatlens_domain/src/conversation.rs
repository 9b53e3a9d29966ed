use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use derive_more::derive::{Display, From};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};

use crate::{AgentKind, Analysis, Block, UserId};

/// Run-wide identifier of a conversation. Identifiers are handed out in
/// increasing order starting at [`DialogueId::FIRST`].
#[derive(
    Debug, Display, From, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DialogueId(u64);

impl DialogueId {
    pub const FIRST: DialogueId = DialogueId(1);

    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// A bounded, time-contiguous exchange of one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(into)]
pub struct Conversation {
    pub dialogue_id: DialogueId,
    pub user_id: UserId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: f64,
    /// Number of raw events, duplicates included.
    pub message_count: usize,
    /// Deduplicated block texts joined by newlines.
    pub full_text: String,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub departments: Vec<String>,
    #[serde(default)]
    pub agent_kinds: BTreeSet<AgentKind>,
    #[serde(default)]
    #[setters(strip_option)]
    pub analysis: Option<Analysis>,
}

impl Conversation {
    pub fn new(dialogue_id: DialogueId, user_id: impl Into<UserId>, start_time: DateTime<Utc>) -> Self {
        Self {
            dialogue_id,
            user_id: user_id.into(),
            start_time,
            end_time: start_time,
            duration_minutes: 0.0,
            message_count: 0,
            full_text: String::new(),
            blocks: Vec::new(),
            departments: Vec::new(),
            agent_kinds: BTreeSet::new(),
            analysis: None,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_minutes * 60.0
    }

    /// Text the conversation is judged on: the blocks when present, the
    /// legacy full text otherwise.
    pub fn texts(&self) -> Vec<&str> {
        if self.blocks.is_empty() {
            vec![self.full_text.as_str()]
        } else {
            self.blocks.iter().map(|block| block.text.as_str()).collect()
        }
    }

    pub fn is_analyzed(&self) -> bool {
        self.analysis.as_ref().is_some_and(Analysis::is_analyzed)
    }
}
