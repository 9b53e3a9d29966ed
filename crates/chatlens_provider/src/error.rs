use chatlens_config::ProviderId;

/// Errors raised while building an oracle client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No API key for provider '{provider}', set it in the config or in {env}")]
    MissingApiKey { provider: ProviderId, env: &'static str },

    #[error(transparent)]
    Config(#[from] chatlens_config::Error),

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
