use super::{ SearchClient, SearchError };
use crate::models::search::{ SearchRequest, SearchResponse, SearchResult };

use async_trait::async_trait;
use log::{ debug, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE } };
use std::error::Error as StdError;
use std::time::Duration;
use url::Url;

const MAX_ERROR_BODY: usize = 512;

pub struct HttpSearchClient {
    http: HttpClient,
    endpoint: Url,
}

impl HttpSearchClient {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        timeout: Duration
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| format!("Invalid search endpoint '{}': {}", endpoint, e))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key))
                    .map_err(|e| format!("Invalid search API key format: {}", e))?
            );
        }

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        info!("Search client configured: Endpoint={}", endpoint);
        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, SearchError> {
        debug!(
            "Searching: query='{}', previous_queries={}",
            request.query,
            request.previous_queries.len()
        );

        let resp = self.http
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(SearchError::Transport)?;

        let status = resp.status();
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
                body.truncate(cut);
            }
            return Err(SearchError::Status { status: status.as_u16(), body });
        }

        let raw = resp.text().await.map_err(SearchError::Transport)?;
        let parsed: SearchResponse = serde_json
            ::from_str(&raw)
            .map_err(|e| SearchError::Malformed(e.to_string()))?;

        debug!("Search returned {} result(s)", parsed.results.len());
        Ok(parsed.results)
    }
}
