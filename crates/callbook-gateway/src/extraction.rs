//! Prompts for field extraction and reply generation, and extraction parsing.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use callbook_core::error::{CallbookError, Result};
use callbook_core::session::{BookingField, ExtractedFields};

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```json|```").expect("static regex"));

const REPLY_PERSONA: &str = "You are a friendly multilingual AI for booking dialysis appointments. \
Reply clearly like a booking assistant and keep it short and precise like a human.";

/// Instruction asking the model for the five booking fields as a JSON object.
pub fn extraction_prompt(transcript: &str) -> String {
    format!(
        r#"
You're a helpful booking assistant for a dialysis center.

From the user's message, extract the following fields as JSON object:
- Name
- Date (format YYYY-MM-DD)
- Time (e.g., 3:00 PM)
- Location
- Preferences

If any info is not mentioned, leave it as an empty string. Output ONLY a valid JSON object, no extra words.

User: """{transcript}"""
"#
    )
}

/// System instruction for the spoken reply, given the fields still missing.
pub fn reply_prompt(missing: &[BookingField]) -> String {
    if missing.is_empty() {
        return format!("{REPLY_PERSONA} All details provided. Confirm and thank the user.");
    }
    let labels: Vec<&str> = missing.iter().map(|f| f.label()).collect();
    format!("{REPLY_PERSONA} Ask for missing: {}.", labels.join(", "))
}

fn strip_code_fences(raw: &str) -> String {
    CODE_FENCE.replace_all(raw, "").trim().to_string()
}

/// Parse the model's extraction output.
///
/// Only the five booking field names with string values are kept; anything
/// else in the object is ignored. Output that is not a JSON object is `Parse`.
pub fn parse_extraction(raw: &str) -> Result<ExtractedFields> {
    let cleaned = strip_code_fences(raw);
    let value: Value = serde_json::from_str(&cleaned)
        .map_err(|e| CallbookError::Parse(format!("extraction output is not JSON: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| CallbookError::Parse("extraction output is not a JSON object".into()))?;

    Ok(BookingField::ALL
        .into_iter()
        .filter_map(|field| match object.get(field.as_str()) {
            Some(Value::String(s)) => Some((field, s.clone())),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_prompt_quotes_transcript() {
        let prompt = extraction_prompt("My name is Sam");
        assert!(prompt.contains(r#"User: """My name is Sam""""#));
        assert!(prompt.contains("Date (format YYYY-MM-DD)"));
        assert!(prompt.contains("Output ONLY a valid JSON object"));
    }

    #[test]
    fn test_reply_prompt_lists_missing_fields() {
        let prompt = reply_prompt(&[
            BookingField::Date,
            BookingField::Time,
            BookingField::Location,
            BookingField::Preferences,
        ]);
        assert!(prompt.starts_with("You are a friendly multilingual AI"));
        assert!(prompt.ends_with("Ask for missing: date, time, location, preferences."));
    }

    #[test]
    fn test_reply_prompt_when_complete() {
        assert!(reply_prompt(&[]).ends_with("All details provided. Confirm and thank the user."));
    }

    #[test]
    fn test_parse_plain_object() {
        let fields = parse_extraction(
            r#"{"Name":"Sam","Date":"","Time":"","Location":"","Preferences":""}"#,
        )
        .unwrap();
        assert_eq!(fields.get(&BookingField::Name).map(String::as_str), Some("Sam"));
        assert_eq!(fields.get(&BookingField::Date).map(String::as_str), Some(""));
        assert_eq!(fields.len(), 5);
    }

    #[test]
    fn test_parse_strips_code_fences() {
        let raw = "```json\n{\"Date\": \"2025-03-01\"}\n```";
        let fields = parse_extraction(raw).unwrap();
        assert_eq!(
            fields.get(&BookingField::Date).map(String::as_str),
            Some("2025-03-01")
        );

        let upper = "```JSON\n{\"Time\": \"3:00 PM\"}```";
        assert!(parse_extraction(upper).unwrap().contains_key(&BookingField::Time));
    }

    #[test]
    fn test_parse_ignores_unknown_and_non_string_values() {
        let fields =
            parse_extraction(r#"{"Name": 42, "name": "lower", "Phone": "123", "Location": "North"}"#)
                .unwrap();
        assert_eq!(fields.len(), 1);
        assert!(fields.contains_key(&BookingField::Location));
    }

    #[test]
    fn test_parse_malformed_is_parse_error() {
        assert!(matches!(
            parse_extraction("Sure! The name is Sam."),
            Err(CallbookError::Parse(_))
        ));
        assert!(matches!(
            parse_extraction(r#"["Sam"]"#),
            Err(CallbookError::Parse(_))
        ));
    }
}
