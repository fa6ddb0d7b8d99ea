use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use async_trait::async_trait;
use std::error::Error as StdError;
use super::{ http_stream_generate, to_wire, ChatClient, ChatStream, LineParser, ReasoningWrapper, WireMessage };
use crate::llm::LlmConfig;
use crate::models::chat::ChatMessage;
use crate::segment::Markers;
use log::{ debug, info };

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
    temperature: Option<f32>,
    markers: Markers,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct StreamMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: Option<String>,
}

impl OllamaClient {
    pub fn new(
        base_url: Option<String>,
        completion_model: Option<String>,
        temperature: Option<f32>,
        markers: Markers
    ) -> Self {
        let model = completion_model.unwrap_or_else(|| "deepseek-r1:7b".to_string());
        let url = base_url.unwrap_or_else(|| "http://localhost:11434".into());

        Self {
            http: HttpClient::new(),
            base_url: url,
            completion_model: model,
            temperature,
            markers,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        if config.llm_type != crate::llm::LlmType::Ollama {
            return Err("Invalid config type for OllamaClient".into());
        }

        Ok(
            Self::new(
                config.base_url.clone(),
                config.completion_model.clone(),
                config.temperature,
                config.markers.clone()
            )
        )
    }
}

/// Parses Ollama's newline-delimited JSON chat stream.
pub struct NdjsonLineParser {
    reasoning: ReasoningWrapper,
    done: bool,
}

impl NdjsonLineParser {
    pub fn new(markers: Markers) -> Self {
        Self { reasoning: ReasoningWrapper::new(markers), done: false }
    }
}

impl LineParser for NdjsonLineParser {
    fn parse(&mut self, line: &str) -> Option<String> {
        if line.trim().is_empty() {
            return None;
        }
        match serde_json::from_str::<StreamResponse>(line) {
            Ok(stream_resp) => {
                if stream_resp.done {
                    self.done = true;
                }
                let message = stream_resp.message?;
                self.reasoning.push(message.thinking.as_deref(), Some(&message.content))
            }
            Err(e) => {
                debug!("JSON parse error: {} for line: {}", e, line);
                None
            }
        }
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn finish(&mut self) -> Option<String> {
        self.reasoning.close()
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage]
    ) -> Result<ChatStream, Box<dyn StdError + Send + Sync>> {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let req = ChatRequest {
            model: &self.completion_model,
            messages: to_wire(messages),
            stream: true,
            options: self.temperature.map(|temperature| ChatOptions { temperature }),
        };
        info!("Requesting ollama completion: model={}, messages={}", self.completion_model, messages.len());

        http_stream_generate(&self.http, &url, &req, NdjsonLineParser::new(self.markers.clone())).await
    }

    fn get_model(&self) -> String {
        self.completion_model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}
