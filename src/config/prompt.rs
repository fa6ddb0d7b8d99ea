use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use log::info;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt template '{0}' must not be empty")]
    EmptyTemplate(&'static str),
    #[error("Prompt template '{0}' is missing the '{1}' placeholder")]
    MissingPlaceholder(&'static str, &'static str),
    #[error("Prompt file IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Prompt JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub const DEFAULT_CONTEXT_HEADER: &str =
    "Here are the top search results for the user's latest query:\n\n";

pub const DEFAULT_RESULT_TEMPLATE: &str = "[{index}] {title}\nURL: {url}\n{author_line}{date_line}{text}\n";

pub const DEFAULT_RESULT_SEPARATOR: &str = "\n---\n\n";

pub const DEFAULT_CITATION_INSTRUCTION: &str =
    "Answer the user's question using the search results above. \
Cite every fact you take from a result by its number in square brackets, for example [1] or [2]. \
Use simple vocabulary and short sentences.";

/// Templates used to fold search results into the injected system message.
/// Any field left out of a prompts file keeps its default.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PromptConfig {
    pub context_header: String,
    pub result_template: String,
    pub result_separator: String,
    pub author_template: String,
    pub date_template: String,
    pub citation_instruction: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            context_header: DEFAULT_CONTEXT_HEADER.to_string(),
            result_template: DEFAULT_RESULT_TEMPLATE.to_string(),
            result_separator: DEFAULT_RESULT_SEPARATOR.to_string(),
            author_template: "Author: {author}\n".to_string(),
            date_template: "Published: {date}\n".to_string(),
            citation_instruction: DEFAULT_CITATION_INSTRUCTION.to_string(),
        }
    }
}

impl PromptConfig {
    pub fn validate(&self) -> Result<(), PromptError> {
        if self.citation_instruction.trim().is_empty() {
            return Err(PromptError::EmptyTemplate("citation_instruction"));
        }
        if !self.result_template.contains("{index}") {
            return Err(PromptError::MissingPlaceholder("result_template", "{index}"));
        }
        if !self.author_template.contains("{author}") {
            return Err(PromptError::MissingPlaceholder("author_template", "{author}"));
        }
        if !self.date_template.contains("{date}") {
            return Err(PromptError::MissingPlaceholder("date_template", "{date}"));
        }
        Ok(())
    }
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    let file_content = fs::read_to_string(path.as_ref())?;
    let config: PromptConfig = serde_json::from_str(&file_content)?;
    config.validate()?;
    info!("Loaded prompt templates from: {}", path.as_ref().display());
    Ok(Arc::new(config))
}

/// Loads `path` when given, otherwise falls back to the built-in templates.
pub fn load_prompts_or_default(path: Option<&str>) -> Result<Arc<PromptConfig>, PromptError> {
    match path {
        Some(p) if !p.trim().is_empty() => load_prompts(p),
        _ => Ok(Arc::new(PromptConfig::default())),
    }
}
