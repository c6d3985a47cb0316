use super::error::AssistError;
use super::types::ClinicalAssist;

/// Locate the fenced payload in a reply.
///
/// Prefers a ```` ```json ```` fence (tag matched case-insensitively); falls
/// back to the first bare ```` ``` ```` fence, skipping any other info string
/// on the opening line. Returns the trimmed block contents, or `None` when no
/// closed fence exists.
pub fn extract_fenced_block(reply: &str) -> Option<&str> {
    // ASCII lowercasing keeps byte offsets valid for `reply`.
    let lowered = reply.to_ascii_lowercase();
    let content_start = match lowered.find("```json") {
        Some(idx) => idx + "```json".len(),
        None => {
            let after_fence = reply.find("```")? + "```".len();
            after_fence + info_string_len(&reply[after_fence..])
        }
    };

    let content_len = reply[content_start..].find("```")?;
    Some(reply[content_start..content_start + content_len].trim())
}

/// Length of a language tag such as `javascript` directly after an opening fence.
fn info_string_len(rest: &str) -> usize {
    let line = rest.split('\n').next().unwrap_or("");
    let tag = line.trim();
    let is_tag = !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'));
    if is_tag {
        line.len()
    } else {
        0
    }
}

/// Parse a backend reply into a [`ClinicalAssist`].
///
/// The payload must sit inside a fenced block and carry all four keys with
/// non-null values of the right type. A reply without a fence is rejected
/// even if it is valid JSON on its own.
pub fn parse_assist_response(reply: &str) -> Result<ClinicalAssist, AssistError> {
    let block = extract_fenced_block(reply)
        .ok_or_else(|| AssistError::malformed("no fenced JSON block found", reply))?;

    serde_json::from_str::<ClinicalAssist>(block)
        .map_err(|e| AssistError::malformed(format!("payload does not match: {e}"), reply))
}
