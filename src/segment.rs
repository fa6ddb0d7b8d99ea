//! Splits a (possibly partial) assistant buffer into its reasoning and
//! final-answer regions.
//!
//! The projection is recomputed from scratch on every streamed chunk, so it
//! holds no state and borrows from the input wherever it can.

use std::borrow::Cow;

pub const THINK_START: &str = "<think>";
pub const THINK_END: &str = "</think>";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Markers {
    pub start: String,
    pub end: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            start: THINK_START.to_string(),
            end: THINK_END.to_string(),
        }
    }
}

impl Markers {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self { start: start.into(), end: end.into() }
    }

    /// True while `content` could still grow into the start marker, e.g. `<thi`.
    pub fn is_partial_start(&self, content: &str) -> bool {
        let head = content.trim_start();
        !head.is_empty() && head.len() < self.start.len() && self.start.starts_with(head)
    }

    /// Length of the trailing part of `content` that could still grow into the
    /// end marker, e.g. `</th`. Zero when there is none.
    pub fn partial_end_len(&self, content: &str) -> usize {
        (1..self.end.len())
            .rev()
            .filter(|&len| self.end.is_char_boundary(len))
            .find(|&len| content.ends_with(&self.end[..len]))
            .unwrap_or(0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentedContent<'a> {
    pub thinking: Cow<'a, str>,
    pub final_response: Cow<'a, str>,
    pub is_complete: bool,
}

impl SegmentedContent<'_> {
    pub fn into_owned(self) -> SegmentedContent<'static> {
        SegmentedContent {
            thinking: Cow::Owned(self.thinking.into_owned()),
            final_response: Cow::Owned(self.final_response.into_owned()),
            is_complete: self.is_complete,
        }
    }
}

pub fn segment(content: &str) -> SegmentedContent<'_> {
    segment_parts(content, THINK_START, THINK_END)
}

pub fn segment_with<'a>(content: &'a str, markers: &Markers) -> SegmentedContent<'a> {
    segment_parts(content, &markers.start, &markers.end)
}

fn segment_parts<'a>(content: &'a str, start: &str, end: &str) -> SegmentedContent<'a> {
    if !end.is_empty() {
        if let Some((before, after)) = content.split_once(end) {
            // Later copies of the end marker stay in the answer verbatim.
            return SegmentedContent {
                thinking: strip_start(before, start),
                final_response: Cow::Borrowed(after.trim()),
                is_complete: true,
            };
        }
    }

    if !start.is_empty() && content.contains(start) {
        return SegmentedContent {
            thinking: strip_start(content, start),
            final_response: Cow::Borrowed(""),
            is_complete: false,
        };
    }

    SegmentedContent {
        thinking: Cow::Borrowed(""),
        final_response: Cow::Borrowed(content),
        is_complete: true,
    }
}

/// Removes the first start marker and trims. Borrows when the marker leads.
fn strip_start<'a>(region: &'a str, start: &str) -> Cow<'a, str> {
    if start.is_empty() {
        return Cow::Borrowed(region.trim());
    }
    let leading = region.trim_start();
    if let Some(rest) = leading.strip_prefix(start) {
        return Cow::Borrowed(rest.trim());
    }
    match region.find(start) {
        Some(_) => Cow::Owned(region.replacen(start, "", 1).trim().to_string()),
        None => Cow::Borrowed(region.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_pair_partitions_around_end_marker() {
        let s = segment("<think>\n  step one\n</think>\n\nThe answer.\n");
        assert_eq!(s.thinking, "step one");
        assert_eq!(s.final_response, "The answer.");
        assert!(s.is_complete);
    }

    #[test]
    fn start_only_is_incomplete() {
        let s = segment("<think>still going ");
        assert_eq!(s.thinking, "still going");
        assert_eq!(s.final_response, "");
        assert!(!s.is_complete);
    }

    #[test]
    fn no_markers_passes_content_through_untouched() {
        let content = "  plain answer with spacing \n";
        let s = segment(content);
        assert_eq!(s.thinking, "");
        assert_eq!(s.final_response, content);
        assert!(s.is_complete);
    }

    #[test]
    fn empty_content_is_complete_and_empty() {
        let s = segment("");
        assert_eq!(s.thinking, "");
        assert_eq!(s.final_response, "");
        assert!(s.is_complete);
    }

    #[test]
    fn end_marker_without_start_still_splits() {
        let s = segment("reasoning</think>answer");
        assert_eq!(s.thinking, "reasoning");
        assert_eq!(s.final_response, "answer");
        assert!(s.is_complete);
    }

    #[test]
    fn recurring_end_marker_is_rejoined_into_answer() {
        let s = segment("<think>a</think>b</think>c");
        assert_eq!(s.thinking, "a");
        assert_eq!(s.final_response, "b</think>c");
    }

    #[test]
    fn start_marker_in_middle_is_removed_once() {
        let s = segment("pre <think>mid</think>post");
        assert_eq!(s.thinking, "pre mid");
        assert!(matches!(s.thinking, Cow::Owned(_)));
        assert_eq!(s.final_response, "post");
    }

    #[test]
    fn leading_marker_borrows() {
        let s = segment("<think>x</think>y");
        assert!(matches!(s.thinking, Cow::Borrowed(_)));
        assert!(matches!(s.final_response, Cow::Borrowed(_)));
    }

    #[test]
    fn is_idempotent() {
        for input in ["", "<think>a", "<think>a</think>b", "plain", "x</think>y</think>z"] {
            assert_eq!(segment(input), segment(input));
        }
    }

    #[test]
    fn streamed_chunks_progress_monotonically() {
        let chunks = [
            "<think>Let me check",
            "<think>Let me check the data</think>",
            "<think>Let me check the data</think>The answer is 42",
        ];

        let first = segment(chunks[0]);
        assert!(!first.is_complete);
        assert_eq!(first.thinking, "Let me check");

        let second = segment(chunks[1]);
        assert!(second.is_complete);
        assert_eq!(second.final_response, "");

        let third = segment(chunks[2]);
        assert!(third.is_complete);
        assert_eq!(third.thinking, "Let me check the data");
        assert_eq!(third.final_response, "The answer is 42");
    }

    #[test]
    fn completeness_never_regresses_once_closed() {
        let full = "<think>abc</think>def ghi";
        let close = full.find(THINK_END).unwrap() + THINK_END.len();
        for cut in close..=full.len() {
            assert!(segment(&full[..cut]).is_complete, "prefix {:?}", &full[..cut]);
        }
    }

    #[test]
    fn custom_markers() {
        let markers = Markers::new("[[r]]", "[[/r]]");
        let s = segment_with("[[r]]why[[/r]]what", &markers);
        assert_eq!(s.thinking, "why");
        assert_eq!(s.final_response, "what");
        assert!(segment_with("<think>a</think>b", &markers).thinking.is_empty());
    }

    #[test]
    fn partial_start_detection() {
        let markers = Markers::default();
        assert!(markers.is_partial_start("<th"));
        assert!(markers.is_partial_start("  <"));
        assert!(!markers.is_partial_start("<think>"));
        assert!(!markers.is_partial_start("hello"));
        assert!(!markers.is_partial_start(""));
    }

    #[test]
    fn partial_end_detection() {
        let markers = Markers::default();
        assert_eq!(markers.partial_end_len("abc</th"), 4);
        assert_eq!(markers.partial_end_len("abc<"), 1);
        assert_eq!(markers.partial_end_len("abc</think>"), 0);
        assert_eq!(markers.partial_end_len("abc"), 0);
        assert_eq!(Markers::new("[[", "]]").partial_end_len("x]"), 1);
    }
}
