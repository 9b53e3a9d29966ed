use chatlens_domain::{Category, Conversation, Emotion, Intent, ProblemKind, Role, Sentiment};
use strum::IntoEnumIterator;

pub const SYSTEM_PROMPT: &str = "You are an expert conversation analyst. Analyze conversations between \
employees and an assistant system and reply with a single JSON object only.";

fn vocabulary<T: IntoEnumIterator + std::fmt::Display>() -> String {
    T::iter().map(|v| format!("\"{v}\"")).collect::<Vec<_>>().join(", ")
}

/// Conversation text capped at `budget` characters, one labelled line per
/// block.
pub fn transcript(conversation: &Conversation, budget: usize) -> String {
    let text = if conversation.blocks.is_empty() {
        conversation.full_text.clone()
    } else {
        conversation
            .blocks
            .iter()
            .map(|block| {
                let label = match block.role {
                    Role::User => "user",
                    Role::System => "system",
                    Role::Agent => "agent",
                };
                format!("[{label}] {}", block.text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    text.chars().take(budget).collect()
}

pub fn user_prompt(conversation: &Conversation, budget: usize) -> String {
    format!(
        r#"Analyze conversation ({duration:.1}m, {messages} msgs):
{transcript}

Rules:
- sentiment: one of [{sentiments}]. "positive" = gratitude or satisfaction, "negative" = frustration or problems, "neutral" = information requests
- confidence: 0.0-1.0, based on clear textual evidence
- emotions: any of [{emotions}]
- problems: any of [{problems}]. user_confusion ONLY for explicit confusion or repeated clarifications
- severity: 0-2 success, 3-4 minor issues, 5-6 moderate problems, 7-8 major failures, 9-10 critical
- intent: any of [{intents}], most important first
- category: any of [{categories}]
- feedback: user feedback about the assistant system (empty array if none)
- suggestions: user suggestions for improvement (empty array if none)
- is_successful: true if the request was fulfilled

JSON format:
{{
  "analysis": {{
    "request": {{"category": ["information"], "intent": ["general_info"]}},
    "problems": {{"problems": [], "severity": 0, "details": ""}},
    "ux": {{
      "sentiment": "neutral",
      "confidence": 0.8,
      "emotions": [],
      "feedback": [],
      "suggestions": [],
      "is_successful": true
    }}
  }}
}}"#,
        duration = conversation.duration_minutes,
        messages = conversation.message_count,
        transcript = transcript(conversation, budget),
        sentiments = vocabulary::<Sentiment>(),
        emotions = vocabulary::<Emotion>(),
        problems = vocabulary::<ProblemKind>(),
        intents = vocabulary::<Intent>(),
        categories = vocabulary::<Category>(),
    )
}

#[cfg(test)]
mod tests {
    use chatlens_domain::{Block, DialogueId};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;

    fn fixture() -> Conversation {
        Conversation::new(
            DialogueId::FIRST,
            3_i64,
            Utc.with_ymd_and_hms(2025, 7, 1, 10, 0, 0).unwrap(),
        )
        .message_count(2usize)
        .blocks(vec![
            Block::new(Role::User, "Где отчёт?"),
            Block::new(Role::System, "Отчёт в папке Reports"),
        ])
    }

    #[test]
    fn test_transcript_labels_roles() {
        let actual = transcript(&fixture(), 800);
        let expected = "[user] Где отчёт?\n[system] Отчёт в папке Reports";
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_transcript_counts_characters_not_bytes() {
        let actual = transcript(&fixture(), 10);
        let expected = "[user] Где";
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_prompt_lists_vocabularies() {
        let actual = user_prompt(&fixture(), 800);
        assert!(actual.contains("\"tech_support\""));
        assert!(actual.contains("\"performance_latency\""));
        assert!(actual.contains("2 msgs"));
    }
}
