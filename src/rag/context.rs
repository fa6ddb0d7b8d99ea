use crate::config::prompt::PromptConfig;
use crate::models::search::SearchResult;
use std::sync::Arc;

/// Folds an ordered result list into the text of the injected system message.
///
/// Result `i` in the input is always cited as `[i + 1]`, which is also the
/// number the renderer prints next to the result link.
#[derive(Clone, Debug, Default)]
pub struct ContextFormatter {
    prompts: Arc<PromptConfig>,
}

impl ContextFormatter {
    pub fn new(prompts: Arc<PromptConfig>) -> Self {
        Self { prompts }
    }

    /// Empty input yields empty text, meaning "do not augment".
    pub fn format(&self, results: &[SearchResult]) -> String {
        if results.is_empty() {
            return String::new();
        }

        let mut context = String::from(&self.prompts.context_header);
        for (position, result) in results.iter().enumerate() {
            context.push_str(&self.format_result(citation_index(position), result));
            context.push_str(&self.prompts.result_separator);
        }
        context.push_str(&self.prompts.citation_instruction);
        context
    }

    fn format_result(&self, index: usize, result: &SearchResult) -> String {
        let author_line = result
            .author()
            .map(|author| fill(&self.prompts.author_template, &[("author", author)]))
            .unwrap_or_default();
        let date_line = result
            .published_date()
            .map(|date| fill(&self.prompts.date_template, &[("date", date)]))
            .unwrap_or_default();
        let index = index.to_string();

        fill(
            &self.prompts.result_template,
            &[
                ("index", &index),
                ("title", &result.title),
                ("url", &result.url),
                ("author_line", &author_line),
                ("date_line", &date_line),
                ("text", &result.text),
            ],
        )
    }
}

pub fn citation_index(position: usize) -> usize {
    position + 1
}

pub fn format_context(results: &[SearchResult]) -> String {
    ContextFormatter::default().format(results)
}

/// Single-pass `{name}` substitution; substituted values are never rescanned.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value, close))
        });
        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
