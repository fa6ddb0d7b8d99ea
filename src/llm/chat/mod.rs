pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use futures::{ Future, Stream, StreamExt };
use serde::Serialize;
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use super::{ LlmConfig, LlmType };
use self::ollama::OllamaClient;
use self::openai::OpenAIChatClient;
use crate::models::chat::ChatMessage;
use crate::segment::Markers;
use log::debug;
use reqwest::Client as HttpClient;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String, Box<dyn StdError + Send + Sync>>> + Send>>;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        }
    }
}

pub fn to_wire(messages: &[ChatMessage]) -> Vec<WireMessage> {
    messages.iter().map(WireMessage::from).collect()
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Opens a streamed completion over the full ordered message list.
    /// Resolves once the provider has accepted the request.
    async fn stream_chat(
        &self,
        messages: &[ChatMessage]
    ) -> Result<ChatStream, Box<dyn StdError + Send + Sync>>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

/// Turns one framed line of a provider stream into text.
pub trait LineParser: Send + 'static {
    fn parse(&mut self, line: &str) -> Option<String>;

    fn is_done(&self) -> bool;

    /// Emitted once when the stream ends, whether by `is_done` or EOF.
    fn finish(&mut self) -> Option<String> {
        None
    }
}

/// Re-inserts a provider's separate reasoning field into the text stream,
/// wrapped in the configured markers.
#[derive(Debug, Clone)]
pub struct ReasoningWrapper {
    markers: Markers,
    open: bool,
}

impl ReasoningWrapper {
    pub fn new(markers: Markers) -> Self {
        Self { markers, open: false }
    }

    pub fn push(&mut self, reasoning: Option<&str>, content: Option<&str>) -> Option<String> {
        let mut out = String::new();
        if let Some(reasoning) = reasoning.filter(|r| !r.is_empty()) {
            if !self.open {
                out.push_str(&self.markers.start);
                self.open = true;
            }
            out.push_str(reasoning);
        }
        if let Some(content) = content.filter(|c| !c.is_empty()) {
            if self.open {
                out.push_str(&self.markers.end);
                self.open = false;
            }
            out.push_str(content);
        }
        if out.is_empty() { None } else { Some(out) }
    }

    pub fn close(&mut self) -> Option<String> {
        if self.open {
            self.open = false;
            Some(self.markers.end.clone())
        } else {
            None
        }
    }
}

pub fn create_streaming_response<F, Fut>(response_fn: F) -> ChatStream
    where
        F: FnOnce(mpsc::Sender<Result<String, Box<dyn StdError + Send + Sync>>>) -> Fut +
            Send +
            'static,
        Fut: Future<Output = ()> + Send + 'static
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Ollama => {
            let specific_client = OllamaClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::OpenAI | LlmType::DeepSeek | LlmType::Groq | LlmType::XAI | LlmType::Together => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

/// Splits a byte stream into lines, keeping partial lines (and partial UTF-8
/// sequences) buffered until their newline arrives.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: Vec<u8>,
}

impl LineFramer {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&line));
        }
        lines
    }

    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end_matches(['\n', '\r']).to_string()
}

/// POSTs `payload` and streams parsed tokens. A non-success status fails the
/// call itself; failures after that arrive as `Err` items.
pub async fn http_stream_generate<P, L>(
    http: &HttpClient,
    url: &str,
    payload: &P,
    mut parser: L
) -> Result<ChatStream, Box<dyn StdError + Send + Sync>>
    where P: Serialize + ?Sized, L: LineParser
{
    let resp = http.post(url).json(payload).send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(format!("Model request to {} failed with {}: {}", url, status, body).into());
    }
    debug!("Model stream opened: {}", url);

    Ok(
        create_streaming_response(move |tx| async move {
            let mut bytes = resp.bytes_stream();
            let mut framer = LineFramer::default();

            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(buf) => {
                        for line in framer.push(&buf) {
                            if let Some(tok) = parser.parse(&line) {
                                if tx.send(Ok(tok)).await.is_err() {
                                    return;
                                }
                            }
                            if parser.is_done() {
                                if let Some(tail) = parser.finish() {
                                    let _ = tx.send(Ok(tail)).await;
                                }
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(Box::new(e) as _)).await;
                        return;
                    }
                }
            }

            if let Some(line) = framer.flush() {
                if let Some(tok) = parser.parse(&line) {
                    if tx.send(Ok(tok)).await.is_err() {
                        return;
                    }
                }
            }
            if let Some(tail) = parser.finish() {
                let _ = tx.send(Ok(tail)).await;
            }
        })
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    #[test]
    fn framer_joins_lines_split_across_chunks() {
        let mut framer = LineFramer::default();
        assert!(framer.push(b"data: {\"a\"").is_empty());
        let lines = framer.push(b":1}\r\ndata: x\n\npartial");
        assert_eq!(lines, vec!["data: {\"a\":1}", "data: x", ""]);
        assert_eq!(framer.flush().as_deref(), Some("partial"));
        assert_eq!(framer.flush(), None);
    }

    #[test]
    fn framer_keeps_multibyte_chars_split_across_chunks() {
        let mut framer = LineFramer::default();
        let text = "héllo\n".as_bytes();
        assert!(framer.push(&text[..2]).is_empty());
        assert_eq!(framer.push(&text[2..]), vec!["héllo"]);
    }

    #[test]
    fn reasoning_is_wrapped_in_markers() {
        let mut wrapper = ReasoningWrapper::new(Markers::default());
        assert_eq!(wrapper.push(Some("Let me"), None).as_deref(), Some("<think>Let me"));
        assert_eq!(wrapper.push(Some(" think"), None).as_deref(), Some(" think"));
        assert_eq!(wrapper.push(None, Some("Answer")).as_deref(), Some("</think>Answer"));
        assert_eq!(wrapper.push(None, Some("!")).as_deref(), Some("!"));
        assert_eq!(wrapper.push(Some(""), Some("")), None);
        assert_eq!(wrapper.close(), None);
    }

    #[test]
    fn unterminated_reasoning_closes_on_finish() {
        let mut wrapper = ReasoningWrapper::new(Markers::default());
        wrapper.push(Some("hmm"), None);
        assert_eq!(wrapper.close().as_deref(), Some("</think>"));
        assert_eq!(wrapper.close(), None);
    }

    #[test]
    fn wire_messages_carry_lowercase_roles() {
        let messages = vec![
            ChatMessage::new(Role::System, "ctx"),
            ChatMessage::new(Role::User, "q"),
        ];
        let wire = to_wire(&messages);
        assert_eq!(wire[0], WireMessage { role: "system".into(), content: "ctx".into() });
        assert_eq!(wire[1].role, "user");
    }
}
