//! Prompt texts and model-output parsing for catalog enrichment.

use serde_json::Value as JsonValue;

use trailmart_core::defaults::TAG_MAX;
use trailmart_core::Product;
use trailmart_inference::strip_thinking;

pub const TAG_SYSTEM_PROMPT: &str = "\
You are a tagging assistant for an outdoor gear store.
Given a product name and description, produce 3 to 6 short tags.
Tags must be brief, clear, and describe the product's features or uses.
Respond with a JSON array of strings only, for example:
[\"waterproof\", \"lightweight\", \"camping\", \"durable\", \"emergency\"]";

pub const RICH_DESCRIPTION_SYSTEM_PROMPT: &str = "\
You are an e-commerce copywriter writing product detail descriptions.
Follow these rules strictly:
1. Write 2 to 3 paragraphs, roughly 150 to 200 words in total.
2. First paragraph: core function, materials, or design highlights.
3. Second paragraph: how it feels in use, where it fits, and its advantages.
4. Use only the facts provided. Never invent features or specifications.
5. Keep the tone natural and credible, without advertising hyperbole.
6. Output plain text with no Markdown or HTML.";

pub const SUPPORT_SYSTEM_PROMPT: &str = "\
You are an outdoor gear expert assistant.
Answer concisely, in a friendly and lightly playful tone.
If you do not know the answer, reply \"I don't know.\"
Only answer questions about outdoor gear, and after each answer recommend
at least one outdoor product such as a flashlight, tent, trekking pole, or backpack.";

pub fn tag_prompt(product: &Product) -> String {
    format!("Name: {}\nDescription: {}", product.name, product.description)
}

pub fn rich_description_prompt(product: &Product) -> String {
    format!(
        "Write a detail description for this product:\n- Name: {}\n- Brand: {}\n- Description: {}",
        product.name, product.brand, product.description
    )
}

/// Parse a tag list from raw model output.
///
/// Accepts a bare JSON array or an object with a `tags` array, optionally
/// surrounded by reasoning blocks or prose. Tags are trimmed, blanks and
/// exact duplicates dropped, and the list capped at the tag maximum.
/// Returns `None` when no usable tag survives.
pub fn parse_tags(raw: &str) -> Option<Vec<String>> {
    let cleaned = strip_thinking(raw);

    let value: JsonValue = serde_json::from_str(&cleaned)
        .ok()
        .or_else(|| {
            let start = cleaned.find('[')?;
            let end = cleaned.rfind(']')?;
            if end <= start {
                return None;
            }
            serde_json::from_str(&cleaned[start..=end]).ok()
        })?;

    let items = match &value {
        JsonValue::Array(items) => items,
        JsonValue::Object(map) => map.get("tags")?.as_array()?,
        _ => return None,
    };

    let mut tags: Vec<String> = Vec::new();
    for item in items {
        let Some(tag) = item.as_str().map(str::trim) else {
            continue;
        };
        if tag.is_empty() || tags.iter().any(|t| t == tag) {
            continue;
        }
        tags.push(tag.to_string());
        if tags.len() == TAG_MAX {
            break;
        }
    }

    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}
