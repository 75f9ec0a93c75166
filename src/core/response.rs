//! Best-effort decoding of analysis output.
//!
//! The analysis service is asked for JSON but answers in free text, often
//! wrapped in a Markdown code fence. Decoding never fails the tier: anything we
//! cannot read is kept verbatim so the window is still recorded.

use serde::de::DeserializeOwned;

/// Outcome of decoding one analysis response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse<T> {
    /// The text decoded into the expected structure
    Structured(T),
    /// The text could not be decoded; kept as-is
    Raw(String),
}

impl<T> ParsedResponse<T> {
    pub fn is_structured(&self) -> bool {
        matches!(self, ParsedResponse::Structured(_))
    }
}

/// Decode `text` as `T`, tolerating a surrounding code fence.
///
/// Tries the fence-stripped text first, then the outermost `{...}` span, and
/// falls back to [`ParsedResponse::Raw`] with the original text.
pub fn parse_response<T: DeserializeOwned>(text: &str) -> ParsedResponse<T> {
    let stripped = strip_code_fence(text);
    if let Ok(value) = serde_json::from_str::<T>(stripped) {
        return ParsedResponse::Structured(value);
    }

    if let Some(span) = outermost_object(stripped) {
        if let Ok(value) = serde_json::from_str::<T>(span) {
            return ParsedResponse::Structured(value);
        }
    }

    ParsedResponse::Raw(text.to_string())
}

/// Remove a leading ```` ```lang ```` line and trailing fence, if present.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (e.g. "json") up to the first newline.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
