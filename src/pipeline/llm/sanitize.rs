//! Post-generation cleanup applied before any parsing.

use std::sync::LazyLock;

use regex::Regex;

static THINK_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));

/// Strip reasoning-model artifacts from raw output.
///
/// Removes `<think>...</think>` blocks. Some backends omit the opening tag;
/// a stray `</think>` drops everything before it.
pub fn sanitize_llm_output(raw: &str) -> String {
    let mut text = THINK_BLOCK_RE.replace_all(raw, "").to_string();

    if let Some(idx) = text.find("</think>") {
        text = text[idx + "</think>".len()..].to_string();
    }

    text.trim().to_string()
}
