#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Invalid provider base URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
