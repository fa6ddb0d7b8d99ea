mod http;

pub use http::HttpSearchClient;

use crate::models::search::{ SearchRequest, SearchResult };
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("Search service returned {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },
    #[error("Search service returned an unexpected payload: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, SearchError>;
}
