//! Response envelopes of the provider's REST API
//!
//! Read responses wrap their payload in `data` envelopes, often nested:
//!
//! ```json
//! { "data": [ { "data": { "id": 1 } }, { "data": { "id": 2 } } ], "pagination": {} }
//! ```
//!
//! [`flatten`] strips those envelopes so callers see `[{ "id": 1 }, { "id": 2 }]`.
//! Error responses carry `{ "error": { "code", "message" } }` (or a list of
//! validation `errors`) and are turned into a [`ProviderError`].

use serde_json::Value;

use crate::error::{ProviderError, ProviderResult};

/// Recursively unwrap `data` envelopes
///
/// An object with a `data` key is replaced by its flattened `data` value
/// (sibling keys such as `pagination` are dropped). Arrays are flattened
/// element-wise. Other objects and scalars are returned unchanged.
pub fn flatten(value: Value) -> Value {
    match value {
        Value::Object(mut fields) => match fields.remove("data") {
            Some(inner) => flatten(inner),
            None => Value::Object(fields),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(flatten).collect()),
        other => other,
    }
}

/// Error described by an error envelope, if the value is one
pub fn envelope_error(value: &Value, status: u16) -> Option<ProviderError> {
    if let Some(error) = value.get("error") {
        let code = error
            .get("code")
            .and_then(code_from_value)
            .unwrap_or_else(|| i64::from(status));
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Some(ProviderError::new(code, message));
    }

    if let Some(errors) = value.get("errors") {
        return Some(ProviderError::new(i64::from(status), errors.to_string()));
    }

    if value.get("success").and_then(Value::as_bool) == Some(false) {
        return Some(ProviderError::new(i64::from(status), value.to_string()));
    }

    None
}

fn code_from_value(code: &Value) -> Option<i64> {
    match code {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Error for a non-success API response
///
/// Uses the envelope when the body has one, otherwise the HTTP status and the
/// raw body.
pub fn error_from_body(status: u16, body: &str) -> ProviderError {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| envelope_error(&value, status))
        .unwrap_or_else(|| ProviderError::new(i64::from(status), body.to_string()))
}

/// Parse a successful API response body into its flattened payload
///
/// Empty bodies (e.g. `204 No Content`) become `Value::Null`.
pub fn parse_body(status: u16, body: &str) -> ProviderResult<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ProviderError::local(format!("Unparsable response body: {}", e)))?;
    if let Some(error) = envelope_error(&value, status) {
        return Err(error);
    }
    Ok(flatten(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_nested_list() {
        let value = json!({ "data": [ { "data": { "id": "123" } }, { "data": { "id": "234" } } ] });
        assert_eq!(flatten(value), json!([ { "id": "123" }, { "id": "234" } ]));
    }

    #[test]
    fn test_flatten_drops_pagination() {
        let value = json!({ "data": [ { "data": { "id": 1 } } ], "pagination": { "offset": 0 } });
        assert_eq!(flatten(value), json!([ { "id": 1 } ]));
    }

    #[test]
    fn test_flatten_single_object() {
        let value = json!({ "data": { "url": "https://example.com" } });
        assert_eq!(flatten(value), json!({ "url": "https://example.com" }));
    }

    #[test]
    fn test_flatten_leaves_plain_objects() {
        let value = json!({ "key1": "val1", "nested": { "data": 1 } });
        assert_eq!(flatten(value.clone()), value);
    }

    #[test]
    fn test_flatten_scalars() {
        assert_eq!(flatten(json!(5)), json!(5));
        assert_eq!(flatten(json!(null)), json!(null));
    }

    #[test]
    fn test_error_from_envelope() {
        let body = r#"{ "error": { "code": 404, "message": "error message" } }"#;
        assert_eq!(error_from_body(404, body).to_string(), "404: error message");
    }

    #[test]
    fn test_error_from_validation_errors() {
        let body = r#"{ "errors": [ { "error": { "key": "name" } } ] }"#;
        let error = error_from_body(400, body);
        assert_eq!(error.code, 400);
        assert!(error.message.contains("name"));
    }

    #[test]
    fn test_error_from_unparsable_body() {
        let error = error_from_body(502, "<html>bad gateway</html>");
        assert_eq!(error.code, 502);
        assert_eq!(error.message, "<html>bad gateway</html>");
    }

    #[test]
    fn test_parse_body_rejects_garbage() {
        let error = parse_body(200, "{ not json").unwrap_err();
        assert_eq!(error.code, -1);
        assert!(error.message.contains("Unparsable"));
    }

    #[test]
    fn test_parse_body_success_false() {
        let error = parse_body(200, r#"{ "success": false }"#).unwrap_err();
        assert_eq!(error.code, 200);
    }

    #[test]
    fn test_parse_body_empty() {
        assert_eq!(parse_body(204, "").unwrap(), Value::Null);
    }
}
