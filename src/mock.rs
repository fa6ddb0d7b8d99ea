//! Deterministic collaborators for tests and offline runs.

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::sync::{ Arc, Mutex };

use async_trait::async_trait;
use futures::stream;

use crate::llm::chat::{ ChatClient, ChatStream };
use crate::models::chat::ChatMessage;
use crate::models::search::{ SearchRequest, SearchResult };
use crate::search::{ SearchClient, SearchError };

/// Pops one scripted reply per `search` call and records every request.
/// Once the script runs dry it keeps returning empty result lists.
#[derive(Default)]
pub struct ScriptedSearchClient {
    replies: Mutex<VecDeque<Result<Vec<SearchResult>, SearchError>>>,
    pub requests: Arc<Mutex<Vec<SearchRequest>>>,
}

impl ScriptedSearchClient {
    pub fn new(replies: Vec<Result<Vec<SearchResult>, SearchError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answers the first search with `results`; later searches come back empty.
    pub fn once(results: Vec<SearchResult>) -> Self {
        Self::new(vec![Ok(results)])
    }

    pub fn failing(status: u16) -> Self {
        Self::new(vec![Err(SearchError::Status { status, body: "unavailable".into() })])
    }

    pub fn recorded(&self) -> Vec<SearchRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SearchClient for ScriptedSearchClient {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, SearchError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        next.unwrap_or_else(|| Ok(Vec::new()))
    }
}

pub enum ChatScript {
    Chunks(Vec<String>),
    /// Emits the chunks, then a stream error.
    BreakAfter(Vec<String>, String),
    Reject(String),
}

/// Replays one script per `stream_chat` call and records the message lists
/// it was handed.
pub struct ScriptedChatClient {
    scripts: Mutex<VecDeque<ChatScript>>,
    pub requests: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedChatClient {
    pub fn new(scripts: Vec<ChatScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn chunks(chunks: &[&str]) -> Self {
        Self::new(vec![ChatScript::Chunks(chunks.iter().map(|c| c.to_string()).collect())])
    }

    pub fn recorded(&self) -> Vec<Vec<ChatMessage>> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage]
    ) -> Result<ChatStream, Box<dyn StdError + Send + Sync>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        let script = self.scripts
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| ChatScript::Chunks(vec!["MOCK".to_string()]));

        let items: Vec<Result<String, Box<dyn StdError + Send + Sync>>> = match script {
            ChatScript::Chunks(chunks) => chunks.into_iter().map(Ok).collect(),
            ChatScript::BreakAfter(chunks, error) => {
                let mut items: Vec<Result<String, Box<dyn StdError + Send + Sync>>> = chunks
                    .into_iter()
                    .map(Ok)
                    .collect();
                items.push(Err(error.into()));
                items
            }
            ChatScript::Reject(error) => {
                return Err(error.into());
            }
        };
        Ok(Box::pin(stream::iter(items)))
    }

    fn get_model(&self) -> String {
        "scripted-mock".to_string()
    }

    fn get_base_url(&self) -> Option<String> {
        None
    }
}

pub fn sample_result(index: usize) -> SearchResult {
    SearchResult {
        title: format!("Result {}", index),
        url: format!("https://example.com/{}", index),
        text: format!("Body of result {}", index),
        author: None,
        published_date: None,
    }
}
