//! Reasoning-block handling for chat model output.
//!
//! Reasoning models wrap chain-of-thought in `<think>...</think>`. That
//! scaffolding must never reach product descriptions or customer answers.
//! Tags are matched case-insensitively; an unclosed `<think>` swallows the
//! rest of the response.

use std::sync::OnceLock;

use regex::Regex;

/// Result of splitting a chat response into reasoning and answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThinkingResponse {
    /// Reasoning content, joined with newlines when there were several blocks.
    pub thinking_content: Option<String>,
    /// The final answer with reasoning removed, trimmed.
    pub answer_content: String,
}

fn closed_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<think>(.*?)</think>").expect("valid regex"))
}

fn unclosed_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<think>(.*)$").expect("valid regex"))
}

/// Split a response into reasoning and answer.
///
/// # Examples
///
/// ```
/// use trailmart_inference::thinking::split_thinking;
///
/// let parsed = split_thinking("<think>Weigh the options...</think>Pack a bivy.");
/// assert_eq!(parsed.thinking_content.as_deref(), Some("Weigh the options..."));
/// assert_eq!(parsed.answer_content, "Pack a bivy.");
/// ```
pub fn split_thinking(response: &str) -> ThinkingResponse {
    let mut thinking: Vec<String> = closed_block()
        .captures_iter(response)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .collect();

    let without_closed = closed_block().replace_all(response, "");

    let answer = match unclosed_block().captures(&without_closed) {
        Some(caps) => {
            if let Some(rest) = caps.get(1) {
                thinking.push(rest.as_str().trim().to_string());
            }
            unclosed_block().replace(&without_closed, "").into_owned()
        }
        None => without_closed.into_owned(),
    };

    thinking.retain(|t| !t.is_empty());

    ThinkingResponse {
        thinking_content: if thinking.is_empty() {
            None
        } else {
            Some(thinking.join("\n"))
        },
        answer_content: answer.trim().to_string(),
    }
}

/// Remove all reasoning blocks and trim the remaining answer.
///
/// ```
/// use trailmart_inference::thinking::strip_thinking;
///
/// assert_eq!(strip_thinking("<THINK>hmm</THINK>\n[\"tent\"]"), "[\"tent\"]");
/// ```
pub fn strip_thinking(response: &str) -> String {
    split_thinking(response).answer_content
}
