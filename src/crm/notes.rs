use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Error)]
pub enum NotesError {
    #[error("invalid note key: {0:?}")]
    InvalidKey(String),

    #[error("notes store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Opaque text blobs keyed by session or client id
#[async_trait::async_trait]
pub trait NotesStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, NotesError>;

    async fn put(&self, key: &str, text: &str) -> Result<(), NotesError>;
}

/// Keys become file names, so only a conservative character set is allowed
fn validate_key(key: &str) -> Result<&str, NotesError> {
    let valid = !key.is_empty()
        && key.len() <= 128
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(key)
    } else {
        Err(NotesError::InvalidKey(key.to_string()))
    }
}

/// One `<key>.txt` file per note under a root directory
#[derive(Debug, Clone)]
pub struct FileNotesStore {
    root: PathBuf,
}

impl FileNotesStore {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, NotesError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, NotesError> {
        Ok(self.root.join(format!("{}.txt", validate_key(key)?)))
    }
}

#[async_trait::async_trait]
impl NotesStore for FileNotesStore {
    async fn get(&self, key: &str) -> Result<Option<String>, NotesError> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, text: &str) -> Result<(), NotesError> {
        let path = self.path_for(key)?;

        // Write then rename so readers never see a half-written note
        let tmp = path.with_extension("txt.tmp");
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!("Stored note {} ({} bytes)", key, text.len());
        Ok(())
    }
}

/// Process-local store, used when no notes directory is configured
#[derive(Debug, Default)]
pub struct MemoryNotesStore {
    notes: RwLock<HashMap<String, String>>,
}

impl MemoryNotesStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl NotesStore for MemoryNotesStore {
    async fn get(&self, key: &str) -> Result<Option<String>, NotesError> {
        validate_key(key)?;
        Ok(self.notes.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, text: &str) -> Result<(), NotesError> {
        validate_key(key)?;
        self.notes
            .write()
            .await
            .insert(key.to_string(), text.to_string());
        Ok(())
    }
}
