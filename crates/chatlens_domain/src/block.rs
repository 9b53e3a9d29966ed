use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::BlockKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    User,
    System,
    Agent,
}

/// Assistants that can answer inside a conversation.
///
/// --- IMPORTANT ---
/// The declaration order is the order in which markers are matched, the first
/// marker found in a block's text wins.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentKind {
    Supervisor,
    Facts,
    Questions,
    Departments,
    Products,
    Tasks,
    Meetings,
    Hr,
    Faq,
    Feedback,
    Sources,
    Statistic,
    Designer,
}

const AGENT_MARKERS: [(&str, AgentKind); 13] = [
    ("Supervisor", AgentKind::Supervisor),
    ("Facts assistant", AgentKind::Facts),
    ("Questions assistant", AgentKind::Questions),
    ("Departments assistant", AgentKind::Departments),
    ("Products assistant", AgentKind::Products),
    ("Tasks assistant", AgentKind::Tasks),
    ("Meetings assistant", AgentKind::Meetings),
    ("HR assistant", AgentKind::Hr),
    ("FAQ assistant", AgentKind::Faq),
    ("Feedback assistant", AgentKind::Feedback),
    ("Sources assistant", AgentKind::Sources),
    ("Statistic assistant", AgentKind::Statistic),
    ("Designer assistant", AgentKind::Designer),
];

impl AgentKind {
    /// Returns the first assistant whose marker occurs verbatim in `text`.
    pub fn detect(text: &str) -> Option<Self> {
        AGENT_MARKERS
            .iter()
            .find(|(marker, _)| text.contains(marker))
            .map(|(_, kind)| *kind)
    }

    pub fn marker(&self) -> &'static str {
        AGENT_MARKERS
            .iter()
            .find(|(_, kind)| kind == self)
            .map(|(marker, _)| *marker)
            .unwrap_or_default()
    }
}

/// One message unit of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_kind: Option<AgentKind>,
}

impl Block {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        let text = text.into();
        let agent_kind = match role {
            Role::Agent => AgentKind::detect(&text),
            Role::User | Role::System => None,
        };
        Self { role, text, agent_kind }
    }

    pub fn from_kind(kind: BlockKind, text: impl Into<String>) -> Self {
        Self::new(kind.role(), text)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_detect_returns_first_marker_in_list_order() {
        let fixture = "Facts assistant handed over to Supervisor";
        let actual = AgentKind::detect(fixture);
        let expected = Some(AgentKind::Supervisor);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_detect_is_case_sensitive() {
        let actual = AgentKind::detect("asking the hr assistant");
        assert_eq!(actual, None);
    }

    #[test]
    fn test_every_agent_has_a_marker() {
        let actual: Vec<_> = AgentKind::iter()
            .filter(|kind| AgentKind::detect(kind.marker()) != Some(*kind))
            .collect();
        assert_eq!(actual, vec![]);
    }

    #[test]
    fn test_agent_kind_only_resolved_for_agent_blocks() {
        let fixture = "Meetings assistant: slot booked";

        let actual = (
            Block::from_kind(BlockKind::Intermediate, fixture).agent_kind,
            Block::from_kind(BlockKind::Response, fixture).agent_kind,
        );
        let expected = (Some(AgentKind::Meetings), None);

        assert_eq!(actual, expected);
    }
}
