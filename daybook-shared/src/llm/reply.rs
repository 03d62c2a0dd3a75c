//! Turning model reply text into JSON
//!
//! Models asked for "only JSON" still wrap it in markdown fences or add a
//! sentence before it. Cleanup goes in two steps:
//!
//! 1. strip surrounding whitespace and a ```` ``` ```` / ```` ```json ```` fence;
//! 2. if that still isn't valid JSON, parse the first balanced `{...}` or
//!    `[...]` span in the text.

use serde_json::Value;

use super::client::{LlmError, LlmResult};

/// Removes a surrounding markdown code fence, if any
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (`json`, `JSON`, ...) on the opening line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };

    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parses the JSON payload of a model reply
pub fn parse_json_reply(raw: &str) -> LlmResult<Value> {
    let cleaned = strip_code_fence(raw);
    if cleaned.is_empty() {
        return Err(LlmError::EmptyReply);
    }

    if let Ok(value) = serde_json::from_str(cleaned) {
        return Ok(value);
    }

    let span = first_json_span(cleaned)
        .ok_or_else(|| LlmError::MalformedReply("no JSON found in reply".to_string()))?;

    serde_json::from_str(span).map_err(|e| LlmError::MalformedReply(e.to_string()))
}

/// Finds the first balanced `{...}` or `[...]` span, honouring string literals
fn first_json_span(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c == '{' || c == '[')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("  [1]  "), "[1]");
        assert_eq!(strip_code_fence("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fence("```\n{\"a\": 1}\n```\n"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```json [1]```"), "[1]");
        assert_eq!(strip_code_fence("```JSON\n[]"), "[]");
    }

    #[test]
    fn test_parse_plain_and_fenced() {
        assert_eq!(parse_json_reply("[]").unwrap(), json!([]));
        assert_eq!(
            parse_json_reply("```json\n{\"status\": \"question\"}\n```").unwrap(),
            json!({"status": "question"})
        );
    }

    #[test]
    fn test_parse_extracts_embedded_json() {
        let reply = "Sure! Here is the event:\n{\"title\": \"Gym {legs}\", \"note\": \"a \\\"quoted\\\" ]\"}\nAnything else?";
        let value = parse_json_reply(reply).unwrap();
        assert_eq!(value["title"], "Gym {legs}");
        assert_eq!(value["note"], "a \"quoted\" ]");
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(parse_json_reply("   "), Err(LlmError::EmptyReply)));
        assert!(matches!(
            parse_json_reply("I could not find any events."),
            Err(LlmError::MalformedReply(_))
        ));
        assert!(matches!(
            parse_json_reply("{\"unterminated\": [1, 2"),
            Err(LlmError::MalformedReply(_))
        ));
    }
}
