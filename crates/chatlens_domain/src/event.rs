use chrono::{DateTime, Utc};
use derive_more::derive::Display;
use derive_setters::Setters;
use serde::{Deserialize, Deserializer, Serialize};
use strum_macros::{EnumIter, EnumString};

use crate::{Error, Result, Role};

/// Identifier of the user an event belongs to. Logs carry it either as a
/// number or as a string, both are normalised to text.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        StringOrNumber::deserialize(deserializer).map(|value| Self(value.into()))
    }
}

impl UserId {
    pub fn new(id: impl ToString) -> Self {
        Self(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Kind of a raw log entry as written by the chat backend.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BlockKind {
    Request,
    Response,
    Intermediate,
}

impl BlockKind {
    pub fn role(self) -> Role {
        match self {
            BlockKind::Request => Role::User,
            BlockKind::Response => Role::System,
            BlockKind::Intermediate => Role::Agent,
        }
    }
}

/// A single timestamped entry of the per-user event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(into, strip_option)]
pub struct RawEvent {
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "block_type", alias = "block_kind")]
    pub block_kind: BlockKind,
    #[serde(rename = "block_data", alias = "text")]
    pub text: String,
    #[serde(
        default,
        alias = "nnDepartment",
        deserialize_with = "optional_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub department: Option<String>,
}

impl RawEvent {
    pub fn new(
        user_id: impl Into<UserId>,
        timestamp: DateTime<Utc>,
        block_kind: BlockKind,
        text: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            timestamp,
            block_kind,
            text: text.into(),
            department: None,
        }
    }
}

/// Parses an event log given either as a JSON array or as JSON Lines.
///
/// # Errors
/// Returns an error when any record cannot be decoded or carries an empty
/// user id. A single bad record fails the whole log.
pub fn parse_events(content: &str) -> Result<Vec<RawEvent>> {
    let trimmed = content.trim_start();
    let events = if trimmed.starts_with('[') {
        serde_json::from_str::<Vec<RawEvent>>(trimmed).map_err(Error::MalformedLog)?
    } else {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str::<RawEvent>(line)
                    .map_err(|source| Error::MalformedEvent { line: index + 1, source })
            })
            .collect::<Result<Vec<_>>>()?
    };

    if let Some(position) = events.iter().position(|e| e.user_id.as_str().trim().is_empty()) {
        return Err(Error::EmptyUserId { record: position + 1 });
    }

    Ok(events)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Number(n) => n.to_string(),
        }
    }
}

fn optional_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?
        .map(String::from)
        .filter(|value| !value.trim().is_empty()))
}
