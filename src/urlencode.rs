//! Serialize structs to/from HTTP query strings.
//!
//! Top-level string fields are rendered verbatim; object- and array-valued
//! fields are JSON-encoded before percent-encoding, matching the wire shape
//! of `credential_offer` and `presentation_definition` query parameters.

use anyhow::{Result, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Serialize a value to a query string.
///
/// # Errors
///
/// Returns an error if the value does not serialize to a JSON object or
/// cannot be urlencoded.
pub fn to_string<T: Serialize>(value: &T) -> Result<String> {
    let Value::Object(map) = serde_json::to_value(value)? else {
        return Err(anyhow!("expected a JSON object"));
    };

    let mut pairs = vec![];
    for (key, value) in map {
        match value {
            Value::Null => {}
            Value::String(s) => pairs.push((key, s)),
            Value::Bool(b) => pairs.push((key, b.to_string())),
            Value::Number(n) => pairs.push((key, n.to_string())),
            _ => pairs.push((key, serde_json::to_string(&value)?)),
        }
    }

    Ok(serde_urlencoded::to_string(pairs)?)
}

/// Deserialize a value from a query string produced by [`to_string`].
///
/// # Errors
///
/// Returns an error if the string cannot be urldecoded or the resulting
/// fields do not deserialize into `T`.
pub fn from_str<T: DeserializeOwned>(s: &str) -> Result<T> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(s)?;

    let mut map = serde_json::Map::new();
    for (key, value) in pairs {
        // object and array fields are JSON-encoded
        let json = if value.starts_with('{') || value.starts_with('[') {
            serde_json::from_str(&value)?
        } else {
            Value::String(value)
        };
        map.insert(key, json);
    }

    Ok(serde_json::from_value(Value::Object(map))?)
}

#[cfg(test)]
mod test {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
    struct TestData {
        string: String,
        object: Inner,
        array: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        none: Option<String>,
    }

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
    struct Inner {
        n: i32,
    }

    #[test]
    fn round_trip() {
        let data = TestData {
            string: "plain text".to_string(),
            object: Inner { n: 7 },
            array: vec!["a".to_string(), "b".to_string()],
            none: None,
        };

        let encoded = to_string(&data).expect("should encode");
        assert!(encoded.contains("string=plain+text"));

        let decoded: TestData = from_str(&encoded).expect("should decode");
        assert_eq!(data, decoded);
    }
}
