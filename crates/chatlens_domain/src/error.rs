/// Errors raised while turning raw event data into conversations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed event at line {line}: {source}")]
    MalformedEvent {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed event log: {0}")]
    MalformedLog(#[source] serde_json::Error),

    #[error("Event record {record} has an empty user id")]
    EmptyUserId { record: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
