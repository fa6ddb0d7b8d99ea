use crate::agent::{ SearchAgent, TurnOutcome };
use crate::history::ConversationStore;
use crate::models::chat::Role;
use crate::render::Renderer;
use crate::stream::pump;

use log::{ info, warn };
use std::error::Error;
use std::io::{ self, Write };
use std::sync::Arc;
use tokio::io::{ AsyncBufRead, AsyncBufReadExt };

const HELP: &str = "\
/history     show the queries sent as search context
/transcript  re-render the conversation with its sources
/new         start a fresh conversation
/quit        leave (also /exit)
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnStatus {
    Ignored,
    Answered,
    SearchFailed(String),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

pub struct ChatSession<W: Write> {
    agent: Arc<SearchAgent>,
    conversation: ConversationStore,
    renderer: Renderer,
    system_prompt: Option<String>,
    out: W,
}

impl<W: Write> ChatSession<W> {
    pub fn new(
        agent: Arc<SearchAgent>,
        renderer: Renderer,
        system_prompt: Option<String>,
        out: W
    ) -> Self {
        let system_prompt = system_prompt.filter(|p| !p.trim().is_empty());
        let conversation = new_conversation(system_prompt.as_deref());
        Self { agent, conversation, renderer, system_prompt, out }
    }

    pub fn conversation(&self) -> &ConversationStore {
        &self.conversation
    }

    pub fn agent(&self) -> &SearchAgent {
        &self.agent
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub async fn run_turn(&mut self, input: &str) -> Result<TurnStatus, Box<dyn Error + Send + Sync>> {
        let dispatch = match self.agent.submit(input, &self.conversation).await {
            Ok(TurnOutcome::Ignored) => {
                return Ok(TurnStatus::Ignored);
            }
            Ok(TurnOutcome::SearchFailed { message }) => {
                write!(self.out, "{}", self.renderer.render_error(&message))?;
                return Ok(TurnStatus::SearchFailed(message));
            }
            Ok(TurnOutcome::Dispatched(dispatch)) => dispatch,
            Err(e) => {
                let message = e.to_string();
                warn!("Turn not sent: {}", message);
                write!(self.out, "{}", self.renderer.render_error(&message))?;
                return Ok(TurnStatus::Failed(message));
            }
        };

        if !dispatch.results.is_empty() {
            writeln!(self.out, "{}", self.renderer.render_results(&dispatch.results))?;
        }
        self.out.flush()?;

        let renderer = &self.renderer;
        let out = &mut self.out;
        let mut printer = renderer.printer();
        let mut write_error: Option<io::Error> = None;
        let streamed = pump(dispatch.stream, &self.conversation, &renderer.markers, |raw, view| {
            let text = printer.update(raw, view);
            if text.is_empty() || write_error.is_some() {
                return;
            }
            if let Err(e) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
                write_error = Some(e);
            }
        }).await;
        write!(out, "{}", printer.finish())?;
        if let Some(e) = write_error {
            return Err(e.into());
        }

        match streamed {
            Ok(reply) => {
                info!("Reply stored: id={}, {} byte(s)", reply.message_id, reply.content.len());
                Ok(TurnStatus::Answered)
            }
            Err(e) => {
                let message = e.to_string();
                write!(out, "{}", renderer.render_error(&message))?;
                Ok(TurnStatus::Failed(message))
            }
        }
    }

    pub async fn handle_line(&mut self, line: &str) -> Result<Control, Box<dyn Error + Send + Sync>> {
        let trimmed = line.trim();
        if !trimmed.starts_with('/') {
            self.run_turn(line).await?;
            return Ok(Control::Continue);
        }

        match trimmed {
            "/quit" | "/exit" => {
                return Ok(Control::Quit);
            }
            "/help" => write!(self.out, "{}", HELP)?,
            "/history" => {
                let window = self.agent.query_history().window();
                if window.is_empty() {
                    writeln!(self.out, "(no previous queries)")?;
                }
                for (i, query) in window.iter().enumerate() {
                    writeln!(self.out, "{}. {}", i + 1, query)?;
                }
            }
            "/transcript" => {
                let agent = &self.agent;
                let text = self.renderer.render_transcript(&self.conversation.visible(), |id| {
                    agent.results_for(id)
                });
                write!(self.out, "{}", text)?;
            }
            "/new" => {
                self.conversation = new_conversation(self.system_prompt.as_deref());
                self.agent.reset();
                writeln!(self.out, "Started a new conversation.")?;
            }
            other => {
                let message = format!("Unknown command '{}'. Try /help.", other);
                write!(self.out, "{}", self.renderer.render_error(&message))?;
            }
        }
        Ok(Control::Continue)
    }

    /// Reads lines until EOF or `/quit`.
    pub async fn run<R>(&mut self, input: R) -> Result<(), Box<dyn Error + Send + Sync>>
        where R: AsyncBufRead + Unpin
    {
        let mut lines = input.lines();
        loop {
            write!(self.out, "> ")?;
            self.out.flush()?;
            let Some(line) = lines.next_line().await? else {
                writeln!(self.out)?;
                break;
            };
            if self.handle_line(&line).await? == Control::Quit {
                break;
            }
        }
        Ok(())
    }
}

fn new_conversation(system_prompt: Option<&str>) -> ConversationStore {
    let conversation = ConversationStore::new();
    if let Some(prompt) = system_prompt {
        conversation.append(Role::System, prompt);
    }
    conversation
}
