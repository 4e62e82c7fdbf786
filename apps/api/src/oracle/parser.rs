//! Recovery and validation of oracle replies.
//!
//! Model output is not trusted: it may arrive wrapped in code fences, followed by
//! prose, or with fields of the wrong type. Anything that does not validate is
//! reported as `None` so the caller can fall back.

use serde_json::{Map, Value};
use tracing::debug;

use crate::oracle::OracleVerdict;
use crate::scoring::mismatch::categories_from_labels;
use crate::scoring::relevance::clamp_score;

/// Parses raw model text into a verdict, or `None` if no usable object is found.
pub fn parse_verdict(text: &str) -> Option<OracleVerdict> {
    let object = extract_json_object(text)?;
    let verdict = validate(&object);
    if verdict.is_none() {
        debug!("Oracle reply failed schema validation: {}", clip(text));
    }
    verdict
}

/// Locates the first well-formed JSON object in `text`.
///
/// Strategy: the whole text with fences stripped, then the first `{` from which
/// a complete object deserializes.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let stripped = strip_json_fences(text);
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(stripped) {
        return Some(map);
    }

    for (idx, ch) in text.char_indices() {
        if ch != '{' {
            continue;
        }
        let mut stream = serde_json::Deserializer::from_str(&text[idx..]).into_iter::<Value>();
        if let Some(Ok(Value::Object(map))) = stream.next() {
            return Some(map);
        }
    }

    debug!("No JSON object found in oracle reply: {}", clip(text));
    None
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```JSON"))
        .or_else(|| text.strip_prefix("```"));
    match inner {
        Some(stripped) => stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start()),
        None => text,
    }
}

/// Field-level schema check.
///
/// - `mismatches`: list or absent/null (non-string items are skipped)
/// - `summary`: string or absent/null
/// - `question`: string or absent/null; blank means "no further question"
/// - `score`: used when numeric, otherwise derived from the mismatch count
fn validate(object: &Map<String, Value>) -> Option<OracleVerdict> {
    let labels: Vec<&str> = match object.get("mismatches") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        Some(_) => return None,
    };

    let summary = match object.get("summary") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => return None,
    };

    let question = match object.get("question") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.trim().to_string()).filter(|q| !q.is_empty()),
        Some(_) => return None,
    };

    let score = match object.get("score").and_then(Value::as_f64) {
        Some(raw) if raw.is_finite() => clamp_score(raw.round() as i32),
        _ => fallback_score(labels.len()),
    };

    Some(OracleVerdict {
        score,
        mismatches: categories_from_labels(labels),
        summary,
        question,
        candidate_profile: object.get("candidate_profile").cloned(),
    })
}

/// Score used when the oracle omits one: `max(30, 100 - 10 * mismatches)`.
pub fn fallback_score(mismatch_count: usize) -> u8 {
    let penalty = mismatch_count.saturating_mul(10).min(100) as i32;
    clamp_score((100 - penalty).max(30))
}

fn clip(text: &str) -> &str {
    match text.char_indices().nth(2000) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::Mismatch;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_parse_plain_object() {
        let v = parse_verdict(
            r#"{"score": 72.4, "mismatches": ["city"], "summary": "ok", "question": "Relocate?"}"#,
        )
        .unwrap();
        assert_eq!(v.score, 72);
        assert_eq!(v.mismatches, vec![Mismatch::City]);
        assert_eq!(v.summary, "ok");
        assert_eq!(v.question.as_deref(), Some("Relocate?"));
    }

    #[test]
    fn test_parse_recovers_from_trailing_prose() {
        let text = "Sure! Here is the evaluation:\n{\"score\": 55, \"mismatches\": [], \
                    \"summary\": \"fine\", \"question\": null}\nLet me know if you need more.";
        let v = parse_verdict(text).unwrap();
        assert_eq!(v.score, 55);
        assert!(v.question.is_none());
    }

    #[test]
    fn test_parse_skips_broken_leading_brace() {
        let text = "{oops} then {\"score\": 10}";
        assert_eq!(parse_verdict(text).unwrap().score, 10);
    }

    #[test]
    fn test_parse_no_object_is_none() {
        assert!(parse_verdict("I cannot help with that.").is_none());
        assert!(parse_verdict("").is_none());
        assert!(parse_verdict("[1, 2, 3]").is_none());
    }

    #[test]
    fn test_wrong_field_types_are_unusable() {
        assert!(parse_verdict(r#"{"mismatches": "city"}"#).is_none());
        assert!(parse_verdict(r#"{"summary": 5}"#).is_none());
        assert!(parse_verdict(r#"{"question": ["a"]}"#).is_none());
    }

    #[test]
    fn test_non_numeric_score_uses_fallback() {
        let v = parse_verdict(r#"{"score": "high", "mismatches": ["город", "опыт"]}"#).unwrap();
        assert_eq!(v.score, 80);
        assert_eq!(v.mismatches, vec![Mismatch::City, Mismatch::Experience]);
    }

    #[test]
    fn test_score_clamped() {
        assert_eq!(parse_verdict(r#"{"score": 180}"#).unwrap().score, 100);
        assert_eq!(parse_verdict(r#"{"score": -3}"#).unwrap().score, 0);
    }

    #[test]
    fn test_blank_question_means_none() {
        let v = parse_verdict(r#"{"question": "   "}"#).unwrap();
        assert!(v.question.is_none());
    }

    #[test]
    fn test_fallback_score_floor() {
        assert_eq!(fallback_score(0), 100);
        assert_eq!(fallback_score(3), 70);
        assert_eq!(fallback_score(9), 30);
        assert_eq!(fallback_score(usize::MAX), 30);
    }
}
