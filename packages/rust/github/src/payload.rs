//! Upstream payload shapes and their normalisation.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use repoquery_shared::{ContextEntry, RepoQueryError, Result};

/// Body of `GET /repos/{repo}/readme`.
#[derive(Debug, Deserialize)]
pub(crate) struct ReadmePayload {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub encoding: Option<String>,
}

impl ReadmePayload {
    /// Decode the base64 body into text. GitHub wraps the encoded body at
    /// 60 columns, so whitespace is stripped before decoding.
    pub(crate) fn decode(self) -> Result<String> {
        match self.encoding.as_deref() {
            None | Some("base64") => {}
            Some(other) => {
                return Err(RepoQueryError::parse(format!(
                    "unsupported README encoding '{other}'"
                )));
            }
        }

        let compact: String = self
            .content
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let bytes = STANDARD
            .decode(compact)
            .map_err(|e| RepoQueryError::parse(format!("README content is not base64: {e}")))?;

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Normalise a context service body into its entry list.
///
/// Accepts a bare JSON array or an object with an `entries` array; any other
/// shape (including a body that is not JSON) yields an empty list. Every
/// element of the list is kept as-is, whatever its shape.
pub(crate) fn normalize_context(body: &str) -> Vec<ContextEntry> {
    let items = match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(items)) => items,
        Ok(Value::Object(mut map)) => match map.remove("entries") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        Ok(_) => Vec::new(),
        Err(e) => {
            debug!(error = %e, "context service body is not JSON");
            Vec::new()
        }
    };

    items.into_iter().map(ContextEntry::from).collect()
}

/// Require a JSON array of records, passed through verbatim.
pub(crate) fn into_records(payload: Value, what: &str) -> Result<Vec<Value>> {
    match payload {
        Value::Array(records) => Ok(records),
        other => Err(RepoQueryError::parse(format!(
            "expected a JSON array of {what}, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_wrapped_base64() {
        let payload = ReadmePayload {
            content: "IyBUZXN0\nIFJlcG8=\n".into(),
            encoding: Some("base64".into()),
        };
        assert_eq!(payload.decode().unwrap(), "# Test Repo");
    }

    #[test]
    fn decode_missing_content_is_empty() {
        let payload: ReadmePayload = serde_json::from_str("{}").unwrap();
        assert_eq!(payload.decode().unwrap(), "");
    }

    #[test]
    fn decode_rejects_garbage() {
        let payload = ReadmePayload {
            content: "!!!not base64!!!".into(),
            encoding: None,
        };
        assert!(matches!(
            payload.decode(),
            Err(RepoQueryError::Parse { .. })
        ));
    }

    #[test]
    fn normalize_bare_list() {
        let entries = normalize_context(r##"[{"type":"readme","content":"# A"}]"##);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_readme());
    }

    #[test]
    fn normalize_wrapped_entries() {
        let entries = normalize_context(r#"{"entries":[{"type":"issue"},{"type":"readme"}]}"#);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].kind(), Some("readme"));
    }

    #[test]
    fn normalize_other_shapes_to_empty() {
        assert!(normalize_context(r#"{"entries":"nope"}"#).is_empty());
        assert!(normalize_context(r#"{"items":[]}"#).is_empty());
        assert!(normalize_context("42").is_empty());
        assert!(normalize_context("<html>oops</html>").is_empty());
    }

    #[test]
    fn normalize_keeps_mixed_shapes() {
        let body = r##"[{"type":"symbol","content":{"lines":3}},{"type":"file","body":42},"note",{"type":"readme","content":"# R"}]"##;
        let entries = normalize_context(body);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].as_value()["content"]["lines"], 3);
        assert_eq!(entries[2].as_value(), "note");
        assert_eq!(entries[3].text(), Some("# R"));

        let round_trip: Value = serde_json::to_value(&entries).unwrap();
        assert_eq!(round_trip, serde_json::from_str::<Value>(body).unwrap());
    }

    #[test]
    fn records_require_array() {
        assert_eq!(
            into_records(serde_json::json!([{"id": 1}]), "issues")
                .unwrap()
                .len(),
            1
        );
        let err = into_records(serde_json::json!({"message": "x"}), "issues").unwrap_err();
        assert!(err.to_string().contains("an object"));
    }
}
