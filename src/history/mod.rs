mod query;

pub use query::{ QueryHistory, QUERY_HISTORY_CAPACITY };

use crate::models::chat::{ ChatMessage, MessageId, Role };
use log::debug;
use std::sync::{ Arc, RwLock, RwLockReadGuard, RwLockWriteGuard };
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("message '{0}' is not the open streaming message")]
    NotStreaming(MessageId),
}

#[derive(Debug, Default)]
struct StoreInner {
    messages: Vec<ChatMessage>,
    streaming: Option<MessageId>,
}

/// Append-only, ordered conversation log shared by the agent, the streaming
/// transport and the renderer. Clones are handles onto the same log.
#[derive(Clone, Debug, Default)]
pub struct ConversationStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn append(&self, role: Role, content: impl Into<String>) -> MessageId {
        let message = ChatMessage::new(role, content);
        let id = message.id.clone();
        debug!("Conversation append: role={} id={}", role, id);
        self.write().messages.push(message);
        id
    }

    /// Opens an empty trailing assistant message that `extend` may grow.
    pub fn begin_assistant(&self) -> MessageId {
        let message = ChatMessage::new(Role::Assistant, String::new());
        let id = message.id.clone();
        let mut inner = self.write();
        inner.messages.push(message);
        inner.streaming = Some(id.clone());
        id
    }

    pub fn extend(&self, id: &str, chunk: &str) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.streaming.as_deref() != Some(id) {
            return Err(StoreError::NotStreaming(id.to_string()));
        }
        match inner.messages.last_mut() {
            Some(last) if last.id == id => {
                last.content.push_str(chunk);
                Ok(())
            }
            _ => Err(StoreError::NotStreaming(id.to_string())),
        }
    }

    /// Closes the streaming message; it is immutable from here on.
    pub fn finish(&self, id: &str) {
        let mut inner = self.write();
        if inner.streaming.as_deref() == Some(id) {
            inner.streaming = None;
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.read().streaming.is_some()
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.read().messages.clone()
    }

    pub fn visible(&self) -> Vec<ChatMessage> {
        self.read()
            .messages
            .iter()
            .filter(|m| m.role.is_displayed())
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<ChatMessage> {
        self.read()
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    pub fn last(&self) -> Option<ChatMessage> {
        self.read().messages.last().cloned()
    }

    pub fn len(&self) -> usize {
        self.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().messages.is_empty()
    }
}
