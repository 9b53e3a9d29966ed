use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use strum::IntoEnumIterator;

use crate::{Conversation, DialogueId, ProblemKeywordDetector, ProblemKind};

/// Aggregate figures over a segmented log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversationStats {
    pub total_conversations: usize,
    pub total_messages: usize,
    pub unique_users: usize,
    pub avg_duration_minutes: f64,
    pub avg_message_count: f64,
}

impl ConversationStats {
    pub fn from_conversations(conversations: &[Conversation]) -> Self {
        if conversations.is_empty() {
            return Self::default();
        }

        let total = conversations.len();
        let total_messages: usize = conversations.iter().map(|c| c.message_count).sum();
        let unique_users = conversations.iter().map(|c| &c.user_id).collect::<HashSet<_>>().len();
        let total_duration: f64 = conversations.iter().map(|c| c.duration_minutes).sum();

        Self {
            total_conversations: total,
            total_messages,
            unique_users,
            avg_duration_minutes: total_duration / total as f64,
            avg_message_count: total_messages as f64 / total as f64,
        }
    }
}

/// Keyword-only problem breakdown. Does not consult the oracle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProblemSummary {
    pub total_conversations: usize,
    pub problematic_conversations: usize,
    pub problem_rate: f64,
    pub counts: BTreeMap<ProblemKind, usize>,
    pub percentages: BTreeMap<ProblemKind, f64>,
    pub dialogues: BTreeMap<ProblemKind, Vec<DialogueId>>,
    pub top: Vec<(ProblemKind, usize)>,
}

impl ProblemSummary {
    pub const DEFAULT_TOP: usize = 3;

    pub fn from_conversations(detector: &ProblemKeywordDetector, conversations: &[Conversation]) -> Self {
        Self::with_top(detector, conversations, Self::DEFAULT_TOP)
    }

    pub fn with_top(
        detector: &ProblemKeywordDetector,
        conversations: &[Conversation],
        top_n: usize,
    ) -> Self {
        let mut counts: BTreeMap<ProblemKind, usize> = ProblemKind::iter().map(|k| (k, 0)).collect();
        let mut dialogues: BTreeMap<ProblemKind, Vec<DialogueId>> = BTreeMap::new();
        let mut problematic = 0;

        for conversation in conversations {
            let problems = detector.detect(conversation);
            if !problems.is_empty() {
                problematic += 1;
            }
            for kind in problems {
                *counts.entry(kind).or_default() += 1;
                dialogues.entry(kind).or_default().push(conversation.dialogue_id);
            }
        }

        let total = conversations.len();
        let ratio = |count: usize| if total == 0 { 0.0 } else { count as f64 / total as f64 };
        let percentages = counts.iter().map(|(kind, count)| (*kind, ratio(*count) * 100.0)).collect();

        let mut top: Vec<(ProblemKind, usize)> = counts.iter().map(|(k, c)| (*k, *c)).collect();
        // Stable sort keeps declaration order among ties.
        top.sort_by(|a, b| b.1.cmp(&a.1));
        top.truncate(top_n);

        Self {
            total_conversations: total,
            problematic_conversations: problematic,
            problem_rate: ratio(problematic),
            counts,
            percentages,
            dialogues,
            top,
        }
    }

    pub fn dialogues_with(&self, kind: ProblemKind) -> &[DialogueId] {
        self.dialogues.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }
}
