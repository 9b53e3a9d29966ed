use std::path::PathBuf;

/// Failures that stop a pipeline run. Oracle failures never show up here,
/// they are recorded per conversation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to persist {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "Checkpoint was taken over {found} conversations but {expected} were segmented, start a fresh run"
    )]
    CheckpointMismatch { expected: usize, found: usize },

    #[error("Result store holds {stored} records but the checkpoint claims {checkpoint}")]
    StoreBehindCheckpoint { stored: usize, checkpoint: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
