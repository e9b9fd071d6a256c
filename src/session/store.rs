use async_trait::async_trait;
use crate::models::chat::Conversation;
use log::{ debug, info };
use std::path::{ Path, PathBuf };
use std::sync::Mutex;
use thiserror::Error;

/// Fixed key the conversation is stored under.
pub const STORAGE_KEY: &str = "chatMessages";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored conversation is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<Conversation>, StoreError>;

    async fn save(&self, conversation: &Conversation) -> Result<(), StoreError>;
}

/// Keeps the conversation as a JSON array in `<dir>/chatMessages.json`.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", STORAGE_KEY)),
        }
    }

    /// Store under the platform data directory, falling back to the working directory.
    pub fn in_default_location() -> Self {
        let dir = dirs
            ::data_dir()
            .map(|d| d.join("askgio"))
            .unwrap_or_else(|| PathBuf::from(".askgio"));
        Self::new(dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConversationStore for JsonFileStore {
    async fn load(&self) -> Result<Option<Conversation>, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No saved conversation at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(e.into());
            }
        };
        let conversation: Conversation = serde_json::from_str(&raw)?;
        debug!("Loaded {} messages from {}", conversation.len(), self.path.display());
        Ok(Some(conversation))
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec(conversation)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<Option<Conversation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conversation(conversation: Conversation) -> Self {
        Self { saved: Mutex::new(Some(conversation)) }
    }

    pub fn snapshot(&self) -> Option<Conversation> {
        let guard = self.saved.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        (*guard).clone()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn load(&self) -> Result<Option<Conversation>, StoreError> {
        Ok(self.snapshot())
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let mut guard = self.saved.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(conversation.clone());
        Ok(())
    }
}
