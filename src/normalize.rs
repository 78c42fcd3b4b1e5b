//! Webhook response normalization
//!
//! Summarization webhooks answer in several shapes. The summary is extracted
//! with a fixed precedence:
//!
//! 1. A non-empty top-level array is replaced by its first element (once;
//!    nested arrays are not flattened further).
//! 2. An object yields the first present field among [`SUMMARY_FIELDS`].
//! 3. A bare JSON string yields its contents.
//! 4. Anything else yields the raw response body verbatim, so a plain-text
//!    upstream answer is never discarded.

use serde_json::Value;

use crate::errors::RequestError;

/// Object fields checked for the summary, in order
pub const SUMMARY_FIELDS: [&str; 5] = ["output", "summary", "result", "data", "response"];

/// Parse a response body and extract the summary text
///
/// # Errors
///
/// Returns `MalformedResponse` if the body is not valid JSON. An empty
/// summary is returned as-is; rejecting it is the caller's job.
pub fn normalize_response(body: &str) -> Result<String, RequestError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| RequestError::MalformedResponse(e.to_string()))?;
    Ok(extract_summary(&value, body))
}

/// Apply the precedence table to an already-parsed value
///
/// `raw` is the unparsed body returned when no rule matches.
pub fn extract_summary(value: &Value, raw: &str) -> String {
    let candidate = match value {
        Value::Array(items) if !items.is_empty() => &items[0],
        other => other,
    };

    match candidate {
        Value::Object(map) => SUMMARY_FIELDS
            .iter()
            .find_map(|field| map.get(*field).filter(|v| !v.is_null()))
            .map_or_else(|| raw.to_owned(), field_text),
        Value::String(text) => text.clone(),
        _ => raw.to_owned(),
    }
}

/// Render a matched field as text
///
/// Strings are taken as-is; numbers and booleans use their JSON spelling;
/// nested structures are re-serialized.
fn field_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_response;
    use crate::errors::RequestError;

    #[test]
    fn known_shapes_yield_the_summary() {
        let cases = [
            r#"{"output":"x"}"#,
            r#"{"summary":"x"}"#,
            r#"{"result":"x"}"#,
            r#"{"data":"x"}"#,
            r#"{"response":"x"}"#,
            r#"[{"result":"x"}]"#,
            r#""x""#,
            r#"["x"]"#,
        ];
        for body in cases {
            assert_eq!(normalize_response(body).expect(body), "x", "body: {body}");
        }
    }

    #[test]
    fn field_precedence_is_fixed() {
        let body = r#"{"response":"e","data":"d","result":"c","summary":"b","output":"a"}"#;
        assert_eq!(normalize_response(body).expect("valid json"), "a");

        let body = r#"{"response":"e","data":"d","summary":"b"}"#;
        assert_eq!(normalize_response(body).expect("valid json"), "b");
    }

    #[test]
    fn null_fields_are_skipped() {
        let body = r#"{"output":null,"summary":"b"}"#;
        assert_eq!(normalize_response(body).expect("valid json"), "b");
    }

    #[test]
    fn only_the_first_array_level_is_unwrapped() {
        let body = r#"[[{"output":"x"}]]"#;
        assert_eq!(normalize_response(body).expect("valid json"), body);
    }

    #[test]
    fn unknown_object_returns_raw_body() {
        let body = r#"{ "text": "hello" }"#;
        assert_eq!(normalize_response(body).expect("valid json"), body);
    }

    #[test]
    fn empty_array_returns_raw_body() {
        assert_eq!(normalize_response("[]").expect("valid json"), "[]");
    }

    #[test]
    fn non_string_fields_are_rendered() {
        assert_eq!(normalize_response(r#"{"output":42}"#).expect("valid json"), "42");
        assert_eq!(
            normalize_response(r#"{"data":{"a":1}}"#).expect("valid json"),
            r#"{"a":1}"#
        );
    }

    #[test]
    fn empty_summary_is_passed_through() {
        assert_eq!(normalize_response(r#"{"output":""}"#).expect("valid json"), "");
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = normalize_response("plain text summary").expect_err("must fail");
        assert!(matches!(err, RequestError::MalformedResponse(_)));
    }
}
