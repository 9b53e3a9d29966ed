use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chatlens_domain::{Checkpoint, Conversation, RunMetadata};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{Error, Result};

/// Persisted output of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDocument {
    pub metadata: RunMetadata,
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

impl ResultDocument {
    pub fn new(metadata: RunMetadata) -> Self {
        Self { metadata, conversations: Vec::new() }
    }
}

/// Durable, append-only collection of annotated conversations.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn load(&self) -> Result<Option<ResultDocument>>;

    async fn len(&self) -> Result<usize> {
        Ok(self.load().await?.map(|doc| doc.conversations.len()).unwrap_or_default())
    }

    /// Replaces whatever is stored with an empty document.
    async fn reset(&self, metadata: RunMetadata) -> Result<()>;

    /// Appends a whole batch. Either every record lands or none does.
    async fn append(&self, conversations: &[Conversation]) -> Result<()>;

    /// Drops every record from index `len` on.
    async fn truncate(&self, len: usize) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self) -> Result<Option<Checkpoint>>;
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(Error::Persistence { path: path.to_path_buf(), source }),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| Error::Corrupt { path: path.to_path_buf(), source })
}

/// Writes into a sibling temp file and renames it over `path`, so readers see
/// either the previous content or the new one.
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_vec_pretty(value)
        .map_err(|source| Error::Corrupt { path: path.to_path_buf(), source })?;
    let target = path.to_path_buf();

    let persisted = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let parent = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;
        let mut file = tempfile::NamedTempFile::new_in(&parent)?;
        file.write_all(&content)?;
        file.as_file().sync_all()?;
        file.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(std::io::Error::other)
    .and_then(|result| result);

    persisted.map_err(|source| Error::Persistence { path: path.to_path_buf(), source })
}

async fn remove(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(Error::Persistence { path: path.to_path_buf(), source }),
    }
}

/// Result store backed by a single JSON document. The document is cached after
/// the first read; every mutation rewrites the whole file.
pub struct JsonResultStore {
    path: PathBuf,
    cache: Mutex<Option<ResultDocument>>,
}

impl JsonResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), cache: Mutex::new(None) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut ResultDocument) + Send,
    {
        let mut cache = self.cache.lock().await;
        let mut document = match cache.take() {
            Some(document) => document,
            None => read_json::<ResultDocument>(&self.path).await?.ok_or_else(|| {
                Error::Persistence {
                    path: self.path.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "result store has not been initialised",
                    ),
                }
            })?,
        };
        let previous = document.clone();
        f(&mut document);
        document.metadata.last_updated = Some(Utc::now());

        match write_json(&self.path, &document).await {
            Ok(()) => {
                *cache = Some(document);
                Ok(())
            }
            Err(e) => {
                *cache = Some(previous);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl ResultStore for JsonResultStore {
    async fn load(&self) -> Result<Option<ResultDocument>> {
        let mut cache = self.cache.lock().await;
        if let Some(document) = cache.as_ref() {
            return Ok(Some(document.clone()));
        }
        let document = read_json::<ResultDocument>(&self.path).await?;
        *cache = document.clone();
        Ok(document)
    }

    async fn reset(&self, metadata: RunMetadata) -> Result<()> {
        let mut cache = self.cache.lock().await;
        let document = ResultDocument::new(metadata);
        write_json(&self.path, &document).await?;
        *cache = Some(document);
        Ok(())
    }

    async fn append(&self, conversations: &[Conversation]) -> Result<()> {
        self.update(|document| document.conversations.extend_from_slice(conversations))
            .await
    }

    async fn truncate(&self, len: usize) -> Result<()> {
        self.update(|document| document.conversations.truncate(len)).await
    }

    async fn clear(&self) -> Result<()> {
        let mut cache = self.cache.lock().await;
        remove(&self.path).await?;
        *cache = None;
        Ok(())
    }
}

pub struct JsonCheckpointStore {
    path: PathBuf,
}

impl JsonCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CheckpointStore for JsonCheckpointStore {
    async fn load(&self) -> Result<Option<Checkpoint>> {
        read_json(&self.path).await
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        write_json(&self.path, checkpoint).await
    }

    async fn clear(&self) -> Result<()> {
        remove(&self.path).await
    }
}

/// In-memory result store, mostly for tests and dry runs.
#[derive(Default)]
pub struct MemoryResultStore {
    document: Mutex<Option<ResultDocument>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: ResultDocument) -> Self {
        Self { document: Mutex::new(Some(document)) }
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn load(&self) -> Result<Option<ResultDocument>> {
        Ok(self.document.lock().await.clone())
    }

    async fn reset(&self, metadata: RunMetadata) -> Result<()> {
        *self.document.lock().await = Some(ResultDocument::new(metadata));
        Ok(())
    }

    async fn append(&self, conversations: &[Conversation]) -> Result<()> {
        let mut guard = self.document.lock().await;
        let document = guard.get_or_insert_with(|| ResultDocument::new(RunMetadata::new(0, "", "")));
        document.conversations.extend_from_slice(conversations);
        document.metadata.last_updated = Some(Utc::now());
        Ok(())
    }

    async fn truncate(&self, len: usize) -> Result<()> {
        if let Some(document) = self.document.lock().await.as_mut() {
            document.conversations.truncate(len);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.document.lock().await = None;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCheckpointStore {
    checkpoint: Mutex<Option<Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        Self { checkpoint: Mutex::new(Some(checkpoint)) }
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> Result<Option<Checkpoint>> {
        Ok(self.checkpoint.lock().await.clone())
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        *self.checkpoint.lock().await = Some(checkpoint.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.checkpoint.lock().await = None;
        Ok(())
    }
}
