use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::Duration;

use crate::{Block, BlockKind, Conversation, DialogueId, RawEvent, UserId};

/// Splits a flat event log into conversations.
///
/// Events are grouped per user and ordered by timestamp. A new conversation
/// starts when the gap to the previous event exceeds the threshold, or when a
/// request follows a response.
#[derive(Debug, Clone)]
pub struct EventSegmenter {
    gap_threshold: Duration,
}

impl Default for EventSegmenter {
    fn default() -> Self {
        Self::from_minutes(30)
    }
}

impl EventSegmenter {
    pub fn new(gap_threshold: Duration) -> Self {
        Self { gap_threshold }
    }

    pub fn from_minutes(minutes: u64) -> Self {
        Self::new(Duration::minutes(minutes as i64))
    }

    pub fn gap_threshold(&self) -> Duration {
        self.gap_threshold
    }

    /// Segments `events` into conversations ordered by dialogue id. Caller
    /// order is not trusted, events are sorted internally.
    pub fn segment(&self, events: Vec<RawEvent>) -> Vec<Conversation> {
        let mut by_user: BTreeMap<UserId, Vec<RawEvent>> = BTreeMap::new();
        for event in events {
            by_user.entry(event.user_id.clone()).or_default().push(event);
        }

        let (conversations, _) = by_user.into_values().fold(
            (Vec::new(), DialogueId::FIRST),
            |(mut conversations, next_id), mut events| {
                // Stable sort keeps log order for identical timestamps.
                events.sort_by_key(|event| event.timestamp);
                let next_id = self.split(events).into_iter().fold(next_id, |id, group| {
                    conversations.extend(build_conversation(id, group));
                    id.next()
                });
                (conversations, next_id)
            },
        );

        conversations
    }

    fn split(&self, events: Vec<RawEvent>) -> Vec<Vec<RawEvent>> {
        let mut groups: Vec<Vec<RawEvent>> = Vec::new();
        for event in events {
            match groups.last_mut() {
                Some(group)
                    if group
                        .last()
                        .is_some_and(|previous| !self.is_boundary(previous, &event)) =>
                {
                    group.push(event)
                }
                _ => groups.push(vec![event]),
            }
        }
        groups
    }

    fn is_boundary(&self, previous: &RawEvent, current: &RawEvent) -> bool {
        let gap = current.timestamp - previous.timestamp;
        let turn_over = previous.block_kind == BlockKind::Response
            && current.block_kind == BlockKind::Request;
        gap > self.gap_threshold || turn_over
    }
}

fn build_conversation(dialogue_id: DialogueId, events: Vec<RawEvent>) -> Option<Conversation> {
    let first = events.first()?;
    let start_time = events.iter().map(|e| e.timestamp).min()?;
    let end_time = events.iter().map(|e| e.timestamp).max()?;

    let mut seen = HashSet::new();
    let blocks: Vec<Block> = events
        .iter()
        .filter(|event| seen.insert(event.text.as_str()))
        .map(|event| Block::from_kind(event.block_kind, event.text.as_str()))
        .collect();

    let full_text = blocks
        .iter()
        .map(|block| block.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let mut departments: Vec<String> = Vec::new();
    for department in events.iter().filter_map(|e| e.department.as_ref()) {
        if !departments.contains(department) {
            departments.push(department.clone());
        }
    }

    let agent_kinds: BTreeSet<_> = blocks.iter().filter_map(|block| block.agent_kind).collect();

    Some(
        Conversation::new(dialogue_id, first.user_id.clone(), start_time)
            .end_time(end_time)
            .duration_minutes((end_time - start_time).num_milliseconds() as f64 / 60_000.0)
            .message_count(events.len())
            .full_text(full_text)
            .blocks(blocks)
            .departments(departments)
            .agent_kinds(agent_kinds),
    )
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{AgentKind, Role};

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn event(user: i64, minutes: i64, kind: BlockKind, text: &str) -> RawEvent {
        RawEvent::new(user, at(minutes), kind, text)
    }

    fn ids(conversations: &[Conversation]) -> Vec<u64> {
        conversations.iter().map(|c| c.dialogue_id.value()).collect()
    }

    #[test]
    fn test_empty_input_yields_no_conversations() {
        let actual = EventSegmenter::default().segment(vec![]);
        assert_eq!(actual, vec![]);
    }

    #[test]
    fn test_single_event_yields_one_message_conversation() {
        let fixture = vec![event(1, 0, BlockKind::Request, "hello")];

        let actual = EventSegmenter::default().segment(fixture);

        assert_eq!(actual.len(), 1);
        assert_eq!(actual[0].message_count, 1);
        assert_eq!(actual[0].duration_minutes, 0.0);
        assert_eq!(actual[0].dialogue_id, DialogueId::FIRST);
    }

    #[test]
    fn test_response_then_request_starts_new_conversation() {
        let fixture = vec![
            event(1, 0, BlockKind::Request, "q1"),
            event(1, 5, BlockKind::Response, "a1"),
            event(1, 6, BlockKind::Request, "q2"),
        ];

        let actual = EventSegmenter::default().segment(fixture);

        assert_eq!(ids(&actual), vec![1, 2]);
        assert_eq!(actual[0].message_count, 2);
        assert_eq!(actual[1].message_count, 1);
    }

    #[test]
    fn test_gap_over_threshold_starts_new_conversation() {
        let fixture = vec![
            event(1, 0, BlockKind::Request, "q1"),
            event(1, 40, BlockKind::Request, "q2"),
        ];

        let actual = EventSegmenter::default().segment(fixture);

        assert_eq!(ids(&actual), vec![1, 2]);
    }

    #[test]
    fn test_gap_equal_to_threshold_continues_conversation() {
        let fixture = vec![
            event(1, 0, BlockKind::Request, "q1"),
            event(1, 30, BlockKind::Intermediate, "thinking"),
        ];

        let actual = EventSegmenter::default().segment(fixture);

        assert_eq!(ids(&actual), vec![1]);
        assert_eq!(actual[0].duration_minutes, 30.0);
    }

    #[test]
    fn test_caller_order_is_not_trusted() {
        let fixture = vec![
            event(1, 6, BlockKind::Request, "q2"),
            event(1, 0, BlockKind::Request, "q1"),
            event(1, 5, BlockKind::Response, "a1"),
        ];

        let actual = EventSegmenter::default().segment(fixture);

        assert_eq!(ids(&actual), vec![1, 2]);
        assert_eq!(actual[0].full_text, "q1\na1");
        assert_eq!(actual[1].full_text, "q2");
    }

    #[test]
    fn test_ids_are_monotonic_across_users() {
        let fixture = vec![
            event(2, 0, BlockKind::Request, "b1"),
            event(1, 0, BlockKind::Request, "a1"),
            event(1, 1, BlockKind::Response, "a2"),
            event(1, 2, BlockKind::Request, "a3"),
            event(2, 90, BlockKind::Request, "b2"),
        ];

        let actual = EventSegmenter::default().segment(fixture);

        assert_eq!(ids(&actual), vec![1, 2, 3, 4]);
        let users: Vec<_> = actual.iter().map(|c| c.user_id.as_str().to_string()).collect();
        assert_eq!(users, vec!["1", "1", "2", "2"]);
    }

    #[test]
    fn test_every_event_lands_in_exactly_one_conversation() {
        let fixture: Vec<_> = (0..20)
            .map(|i| {
                let kind = if i % 3 == 2 { BlockKind::Response } else { BlockKind::Request };
                event(i % 4, i * 7, kind, &format!("message {i}"))
            })
            .collect();

        let actual = EventSegmenter::default().segment(fixture);

        let total: usize = actual.iter().map(|c| c.message_count).sum();
        assert_eq!(total, 20);
        let blocks: usize = actual.iter().map(|c| c.blocks.len()).sum();
        assert_eq!(blocks, 20);
    }

    #[test]
    fn test_duplicate_text_is_kept_once_but_counted() {
        let fixture = vec![
            event(1, 0, BlockKind::Request, "same").department("sales"),
            event(1, 1, BlockKind::Intermediate, "same"),
            event(1, 2, BlockKind::Intermediate, "Supervisor routing").department("sales"),
            event(1, 3, BlockKind::Intermediate, "HR assistant answers").department("hr"),
        ];

        let actual = EventSegmenter::default().segment(fixture);

        assert_eq!(actual.len(), 1);
        let conversation = &actual[0];
        assert_eq!(conversation.message_count, 4);
        assert_eq!(conversation.blocks.len(), 3);
        assert_eq!(conversation.blocks[0].role, Role::User);
        assert_eq!(conversation.full_text, "same\nSupervisor routing\nHR assistant answers");
        assert_eq!(conversation.departments, vec!["sales", "hr"]);
        assert_eq!(
            conversation.agent_kinds,
            BTreeSet::from([AgentKind::Supervisor, AgentKind::Hr])
        );
    }

    #[test]
    fn test_custom_threshold() {
        let fixture = vec![
            event(1, 0, BlockKind::Request, "q1"),
            event(1, 6, BlockKind::Intermediate, "slow"),
        ];

        let actual = EventSegmenter::from_minutes(5).segment(fixture);

        assert_eq!(ids(&actual), vec![1, 2]);
    }
}
