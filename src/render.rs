//! Terminal rendering of the transcript, the per-turn result list and the
//! live reasoning/answer regions of a streaming reply.

use crate::models::chat::{ ChatMessage, Role };
use crate::models::search::SearchResult;
use crate::rag::context::citation_index;
use crate::segment::{ segment_with, Markers, SegmentedContent };
use colored::Colorize;

#[derive(Debug, Clone)]
pub struct Renderer {
    pub color: bool,
    pub show_thinking: bool,
    pub markers: Markers,
}

impl Default for Renderer {
    fn default() -> Self {
        Self { color: true, show_thinking: true, markers: Markers::default() }
    }
}

/// The reasoning region stays up while the stream is open, even if empty.
pub fn shows_thinking(view: &SegmentedContent<'_>) -> bool {
    !view.thinking.is_empty() || !view.is_complete
}

pub fn shows_answer(view: &SegmentedContent<'_>) -> bool {
    view.is_complete && !view.final_response.is_empty()
}

impl Renderer {
    pub fn plain() -> Self {
        Self { color: false, ..Self::default() }
    }

    fn heading(&self, label: &str) -> String {
        if self.color {
            format!("{}\n", label.bold().cyan())
        } else {
            format!("{}\n", label)
        }
    }

    fn dim(&self, text: &str) -> String {
        if self.color { text.dimmed().to_string() } else { text.to_string() }
    }

    pub fn render_user(&self, content: &str) -> String {
        format!("{}{}\n", self.heading("You"), content)
    }

    /// `[n] title (url)` per result, numbered exactly like the injected context.
    pub fn render_results(&self, results: &[SearchResult]) -> String {
        let mut out = String::new();
        for (position, result) in results.iter().enumerate() {
            let label = format!("[{}]", citation_index(position));
            let url = format!("({})", result.url);
            if self.color {
                out.push_str(&format!("{} {} {}\n", label.yellow(), result.title, url.blue().underline()));
            } else {
                out.push_str(&format!("{} {} {}\n", label, result.title, url));
            }
        }
        out
    }

    pub fn render_error(&self, message: &str) -> String {
        if self.color {
            format!("{}\n", message.red())
        } else {
            format!("{}\n", message)
        }
    }

    pub fn render_assistant(&self, content: &str) -> String {
        let view = segment_with(content, &self.markers);
        let mut out = String::new();
        if self.show_thinking && shows_thinking(&view) {
            out.push_str(&self.heading("Thinking"));
            if !view.thinking.is_empty() {
                out.push_str(&self.dim(&view.thinking));
                out.push('\n');
            }
        }
        if shows_answer(&view) {
            out.push_str(&self.heading("Answer"));
            out.push_str(&view.final_response);
            out.push('\n');
        }
        out
    }

    /// Renders the display projection, following each user message with its
    /// result list when the turn had one.
    pub fn render_transcript<F>(&self, visible: &[ChatMessage], results_for: F) -> String
        where F: Fn(&str) -> Option<Vec<SearchResult>>
    {
        let mut out = String::new();
        for message in visible {
            match message.role {
                Role::User => {
                    out.push_str(&self.render_user(&message.content));
                    if let Some(results) = results_for(&message.id).filter(|r| !r.is_empty()) {
                        out.push_str(&self.render_results(&results));
                    }
                }
                Role::Assistant => out.push_str(&self.render_assistant(&message.content)),
                Role::System => {
                    continue;
                }
            }
            out.push('\n');
        }
        out
    }

    pub fn printer(&self) -> AssistantPrinter {
        AssistantPrinter::new(self.clone())
    }
}

/// Turns successive segmentations of a growing buffer into the text that
/// still needs printing.
#[derive(Debug)]
pub struct AssistantPrinter {
    renderer: Renderer,
    thinking_open: bool,
    thinking_printed: usize,
    answer_open: bool,
    answer_printed: usize,
}

impl AssistantPrinter {
    pub fn new(renderer: Renderer) -> Self {
        Self {
            renderer,
            thinking_open: false,
            thinking_printed: 0,
            answer_open: false,
            answer_printed: 0,
        }
    }

    pub fn update(&mut self, raw: &str, view: &SegmentedContent<'_>) -> String {
        let mut out = String::new();
        // `<thi` may still become a start marker.
        if self.renderer.markers.is_partial_start(raw) {
            return out;
        }

        if self.renderer.show_thinking && shows_thinking(view) {
            if !self.thinking_open {
                out.push_str(&self.renderer.heading("Thinking"));
                self.thinking_open = true;
            }
            // Likewise a trailing `</th` until the end marker is whole.
            let held = if view.is_complete {
                0
            } else {
                self.renderer.markers.partial_end_len(&view.thinking)
            };
            let thinking = &view.thinking[..view.thinking.len() - held];
            if let Some(delta) = unprinted(thinking, &mut self.thinking_printed) {
                out.push_str(&self.renderer.dim(delta));
            }
        }

        if shows_answer(view) {
            if !self.answer_open {
                if self.thinking_open {
                    out.push_str("\n\n");
                }
                out.push_str(&self.renderer.heading("Answer"));
                self.answer_open = true;
            }
            if let Some(delta) = unprinted(&view.final_response, &mut self.answer_printed) {
                out.push_str(delta);
            }
        }
        out
    }

    pub fn finish(&mut self) -> String {
        if self.thinking_open || self.answer_open { "\n".to_string() } else { String::new() }
    }
}

fn unprinted<'a>(text: &'a str, printed: &mut usize) -> Option<&'a str> {
    if text.len() <= *printed || !text.is_char_boundary(*printed) {
        return None;
    }
    let delta = &text[*printed..];
    *printed = text.len();
    Some(delta)
}
