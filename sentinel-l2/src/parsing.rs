//! Tolerant parsing of the model's response: a bare JSON object, or one
//! embedded in a Markdown code fence, are both accepted; anything else is
//! rejected (the caller then falls back to `unknown`).

use serde::Deserialize;

const MAX_REASONING_CHARS: usize = 280;

#[derive(Debug, Deserialize)]
struct RawVerdict {
    is_injection: bool,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedVerdict {
    pub is_injection: bool,
    pub confidence: f64,
    pub reasoning: String,
}

/// Extracts the JSON object from `text`, stripping a ```json ... ``` or
/// ``` ... ``` fence if present, then tolerant-parses it.
pub fn parse_model_response(text: &str) -> Option<ParsedVerdict> {
    let candidate = extract_json_object(text)?;
    let raw: RawVerdict = serde_json::from_str(&candidate).ok()?;

    let confidence = raw.confidence.clamp(0.0, 1.0);
    let mut reasoning = raw.reasoning;
    if reasoning.len() > MAX_REASONING_CHARS {
        reasoning.truncate(MAX_REASONING_CHARS);
    }

    Some(ParsedVerdict {
        is_injection: raw.is_injection,
        confidence,
        reasoning,
    })
}

fn extract_json_object(text: &str) -> Option<String> {
    let trimmed = text.trim();

    if let Some(fenced) = strip_code_fence(trimmed) {
        return find_braces(&fenced);
    }

    find_braces(trimmed)
}

fn strip_code_fence(text: &str) -> Option<String> {
    let text = text.strip_prefix("```")?;
    let text = text.strip_suffix("```")?.trim();
    let text = text.strip_prefix("json").unwrap_or(text).trim();
    Some(text.to_string())
}

fn find_braces(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(text[start..=end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_bare_json_object() {
        let text = r#"{"is_injection": true, "confidence": 0.92, "reasoning": "classic override attempt"}"#;
        let parsed = parse_model_response(text).unwrap();
        assert!(parsed.is_injection);
        assert_eq!(parsed.confidence, 0.92);
    }

    #[test]
    fn parses_json_embedded_in_a_code_fence() {
        let text = "```json\n{\"is_injection\": false, \"confidence\": 0.1, \"reasoning\": \"benign\"}\n```";
        let parsed = parse_model_response(text).unwrap();
        assert!(!parsed.is_injection);
    }

    #[test]
    fn rejects_prose_with_no_json_object() {
        assert!(parse_model_response("I think this looks fine.").is_none());
    }

    #[test]
    fn clamps_out_of_range_confidence() {
        let text = r#"{"is_injection": true, "confidence": 4.0, "reasoning": "x"}"#;
        let parsed = parse_model_response(text).unwrap();
        assert_eq!(parsed.confidence, 1.0);
    }

    #[test]
    fn truncates_overlong_reasoning() {
        let long_reason = "a".repeat(500);
        let text = format!(r#"{{"is_injection": false, "confidence": 0.0, "reasoning": "{long_reason}"}}"#);
        let parsed = parse_model_response(&text).unwrap();
        assert_eq!(parsed.reasoning.len(), MAX_REASONING_CHARS);
    }
}
