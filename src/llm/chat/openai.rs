use async_trait::async_trait;
use log::{ debug, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

use super::{ http_stream_generate, to_wire, ChatClient, ChatStream, LineParser, ReasoningWrapper, WireMessage };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::ChatMessage;
use crate::segment::Markers;

/// Chat-completions client shared by every OpenAI-compatible provider.
pub struct OpenAIChatClient {
    http: HttpClient,
    provider: LlmType,
    model: String,
    base_url: String,
    temperature: f32,
    markers: Markers,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIDelta,
    #[serde(rename = "finish_reason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAIDelta {
    content: Option<String>,
    #[serde(alias = "reasoning")]
    reasoning_content: Option<String>,
}

pub fn default_base_url(provider: LlmType) -> &'static str {
    match provider {
        LlmType::DeepSeek => "https://api.deepseek.com/v1",
        LlmType::Groq => "https://api.groq.com/openai/v1",
        LlmType::XAI => "https://api.x.ai/v1",
        LlmType::Together => "https://api.together.xyz/v1",
        LlmType::OpenAI | LlmType::Ollama => "https://api.openai.com/v1",
    }
}

pub fn default_model(provider: LlmType) -> &'static str {
    match provider {
        LlmType::DeepSeek => "deepseek-reasoner",
        LlmType::Groq => "llama-3.3-70b-versatile",
        LlmType::XAI => "grok-3-mini",
        LlmType::Together => "deepseek-ai/DeepSeek-R1",
        LlmType::OpenAI | LlmType::Ollama => "gpt-4o-mini",
    }
}

pub fn chat_completions_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.ends_with("/chat/completions") {
        trimmed.to_string()
    } else {
        format!("{}/chat/completions", trimmed)
    }
}

impl OpenAIChatClient {
    pub fn new(
        provider: LlmType,
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        temperature: Option<f32>,
        markers: Markers
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let chat_model = model.unwrap_or_else(|| default_model(provider).to_string());
        let api_url = base_url.unwrap_or_else(|| default_base_url(provider).to_string());
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| format!("Invalid API key format: {}", e))?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            provider,
            model: chat_model,
            base_url: api_url,
            temperature: temperature.unwrap_or(0.6),
            markers,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| format!("{} API key is required", config.llm_type))?;

        Self::new(
            config.llm_type,
            api_key,
            config.completion_model.clone(),
            config.base_url.clone(),
            config.temperature,
            config.markers.clone()
        )
    }
}

/// Parses `data: {...}` server-sent events.
pub struct SseLineParser {
    reasoning: ReasoningWrapper,
    done: bool,
}

impl SseLineParser {
    pub fn new(markers: Markers) -> Self {
        Self { reasoning: ReasoningWrapper::new(markers), done: false }
    }
}

impl LineParser for SseLineParser {
    fn parse(&mut self, line: &str) -> Option<String> {
        let data = line.strip_prefix("data:")?.trim_start();
        if data == "[DONE]" {
            self.done = true;
            return None;
        }
        let stream_resp = match serde_json::from_str::<OpenAIStreamResponse>(data) {
            Ok(resp) => resp,
            Err(e) => {
                debug!("JSON parse error: {} for data: {}", e, data);
                return None;
            }
        };

        let mut out = String::new();
        for choice in stream_resp.choices {
            if
                let Some(text) = self.reasoning.push(
                    choice.delta.reasoning_content.as_deref(),
                    choice.delta.content.as_deref()
                )
            {
                out.push_str(&text);
            }
            if choice.finish_reason.as_deref() == Some("stop") {
                self.done = true;
            }
        }
        if out.is_empty() { None } else { Some(out) }
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn finish(&mut self) -> Option<String> {
        self.reasoning.close()
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage]
    ) -> Result<ChatStream, Box<dyn StdError + Send + Sync>> {
        let url = chat_completions_url(&self.base_url);
        let req = OpenAIChatRequest {
            model: &self.model,
            messages: to_wire(messages),
            temperature: self.temperature,
            stream: true,
        };
        info!(
            "Requesting {} completion: model={}, messages={}",
            self.provider,
            self.model,
            messages.len()
        );

        http_stream_generate(&self.http, &url, &req, SseLineParser::new(self.markers.clone())).await
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> SseLineParser {
        SseLineParser::new(Markers::default())
    }

    #[test]
    fn extracts_delta_content() {
        let mut p = parser();
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        assert_eq!(p.parse(line).as_deref(), Some("Hello"));
        assert!(!p.is_done());
    }

    #[test]
    fn done_sentinel_and_stop_reason_end_the_stream() {
        let mut p = parser();
        assert_eq!(p.parse("data: [DONE]"), None);
        assert!(p.is_done());

        let mut p = parser();
        let line = r#"data: {"choices":[{"delta":{"content":"."},"finish_reason":"stop"}]}"#;
        assert_eq!(p.parse(line).as_deref(), Some("."));
        assert!(p.is_done());
    }

    #[test]
    fn ignores_comments_blank_lines_and_garbage() {
        let mut p = parser();
        assert_eq!(p.parse(""), None);
        assert_eq!(p.parse(": keep-alive"), None);
        assert_eq!(p.parse("data: {not json"), None);
        assert_eq!(p.parse(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#), None);
    }

    #[test]
    fn reasoning_content_becomes_marked_text() {
        let mut p = parser();
        let r = r#"data: {"choices":[{"delta":{"reasoning_content":"Let me check"}}]}"#;
        let c = r#"data: {"choices":[{"delta":{"content":"42"}}]}"#;
        assert_eq!(p.parse(r).as_deref(), Some("<think>Let me check"));
        assert_eq!(p.parse(c).as_deref(), Some("</think>42"));
        assert_eq!(p.finish(), None);
    }

    #[test]
    fn urls_and_defaults() {
        assert_eq!(chat_completions_url("https://api.x.ai/v1/"), "https://api.x.ai/v1/chat/completions");
        assert_eq!(
            chat_completions_url("http://localhost:8080/v1/chat/completions"),
            "http://localhost:8080/v1/chat/completions"
        );
        assert_eq!(default_base_url(LlmType::Together), "https://api.together.xyz/v1");
    }

    #[test]
    fn requires_api_key() {
        let config = LlmConfig { llm_type: LlmType::OpenAI, ..LlmConfig::default() };
        let err = OpenAIChatClient::from_config(&config).err().unwrap();
        assert_eq!(err.to_string(), "openai API key is required");
    }
}
