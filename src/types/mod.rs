//! Common types shared by endpoint definitions.

use serde::{Deserialize, Serialize};

/// Unknown fields captured from a response.
///
/// Use with `#[serde(flatten)]` so that fields the declared type does not
/// name are kept instead of dropped.
pub type Extra = serde_json::Map<String, serde_json::Value>;

/// Request type for endpoints that take no payload.
///
/// Serializes to `null`, which the executor sends as no body and no query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyRequest;

/// Response type for endpoints whose body is ignored.
///
/// Accepts any body, including an empty one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ignored;

impl<'de> Deserialize<'de> for Ignored {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        serde::de::IgnoredAny::deserialize(deserializer)?;
        Ok(Ignored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Echo {
        url: String,
        #[serde(flatten)]
        extra: Extra,
    }

    #[test]
    fn test_empty_request_serializes_to_null() {
        assert_eq!(serde_json::to_value(EmptyRequest).unwrap(), json!(null));
    }

    #[test]
    fn test_extra_keeps_unknown_fields() {
        let echo: Echo = serde_json::from_value(json!({
            "url": "http://example.com/get",
            "origin": "127.0.0.1",
            "args": {"a": "1"}
        }))
        .unwrap();
        assert_eq!(echo.url, "http://example.com/get");
        assert_eq!(echo.extra.get("origin"), Some(&json!("127.0.0.1")));
        assert_eq!(echo.extra.len(), 2);
    }

    #[test]
    fn test_ignored_accepts_anything() {
        assert!(serde_json::from_str::<Ignored>(r#"{"a":[1,2,3]}"#).is_ok());
        assert!(serde_json::from_str::<Ignored>("null").is_ok());
    }
}
