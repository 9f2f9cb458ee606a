//! Handler arguments
//!
//! Query strings, form fields and JSON payloads all decode into `Kwargs`.
//! Repeated keys collapse into a list in arrival order.

use hyper::body::Bytes;
use percent_encoding::percent_decode;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::btree_map::{self, BTreeMap};

/// A file field from a multipart form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub name: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Reference to an upload already stored by the hosting platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobInfo {
    pub blob_key: String,
    pub content_type: String,
    pub filename: String,
    pub size: u64,
    pub md5_hash: Option<String>,
    pub creation: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Key present without a value
    Null,
    Text(String),
    Json(Value),
    File(Upload),
    Blob(BlobInfo),
    List(Vec<Arg>),
}

impl Arg {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Json(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::Json(Value::Null))
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Text(s) => Value::String(s.clone()),
            Self::Json(v) => v.clone(),
            Self::File(upload) => json!({
                "filename": upload.filename,
                "content_type": upload.content_type,
                "size": upload.data.len(),
            }),
            Self::Blob(info) => serde_json::to_value(info).unwrap_or(Value::Null),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Value> for Arg {
    fn from(v: Value) -> Self {
        Self::Json(v)
    }
}

/// Keyword arguments passed to a handler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Kwargs(BTreeMap<String, Arg>);

impl Kwargs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, collapsing repeated keys into a list
    pub fn push(&mut self, key: impl Into<String>, value: Arg) {
        match self.0.entry(key.into()) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(value);
            }
            btree_map::Entry::Occupied(mut slot) => match slot.get_mut() {
                Arg::List(items) => items.push(value),
                existing => {
                    let first = std::mem::replace(existing, Arg::Null);
                    *existing = Arg::List(vec![first, value]);
                }
            },
        }
    }

    /// Set a value, replacing any previous one
    pub fn insert(&mut self, key: impl Into<String>, value: Arg) {
        self.0.insert(key.into(), value);
    }

    /// Merge a decoded JSON object, its keys replacing existing ones
    pub fn merge_json(&mut self, object: Map<String, Value>) {
        for (key, value) in object {
            self.0.insert(key, Arg::Json(value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Arg> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Arg::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Arg> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arg)> {
        self.0.iter()
    }

    pub fn to_json(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, Arg)> for Kwargs {
    fn from_iter<I: IntoIterator<Item = (K, Arg)>>(iter: I) -> Self {
        let mut kwargs = Self::new();
        for (key, value) in iter {
            kwargs.push(key, value);
        }
        kwargs
    }
}

/// Percent-decode a query or form component, `+` meaning space
pub fn decode_component(raw: &str) -> Vec<u8> {
    decode_component_bytes(raw.as_bytes())
}

/// Percent-decode raw bytes, `+` meaning space; other bytes pass through
pub fn decode_component_bytes(raw: &[u8]) -> Vec<u8> {
    let spaced: Vec<u8> = raw
        .iter()
        .map(|&b| if b == b'+' { b' ' } else { b })
        .collect();
    percent_decode(&spaced).collect()
}

/// Decode a query string; parts split on `&` or `;`, empty values are null
pub fn parse_query(query: &str) -> Kwargs {
    let mut kwargs = Kwargs::new();
    for part in query
        .trim_start_matches('?')
        .split(['&', ';'])
        .filter(|p| !p.is_empty())
    {
        let (key, value) = part.split_once('=').unwrap_or((part, ""));
        let key = String::from_utf8_lossy(&decode_component(key)).into_owned();
        let value = if value.is_empty() {
            Arg::Null
        } else {
            Arg::Text(String::from_utf8_lossy(&decode_component(value)).into_owned())
        };
        kwargs.push(key, value);
    }
    kwargs
}

/// Split a raw path into percent-decoded, non-empty segments
pub fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| percent_decode(s.as_bytes()).decode_utf8_lossy().into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_collapses_repeats() {
        let kwargs = parse_query("a=1&b=2;a=3&&a=4");
        assert_eq!(
            kwargs.get("a"),
            Some(&Arg::List(vec!["1".into(), "3".into(), "4".into()]))
        );
        assert_eq!(kwargs.get_str("b"), Some("2"));
        assert_eq!(kwargs.len(), 2);
    }

    #[test]
    fn test_parse_query_nulls_and_decoding() {
        let kwargs = parse_query("?flag&empty=&q=hello+world%21&caf%C3%A9=1");
        assert_eq!(kwargs.get("flag"), Some(&Arg::Null));
        assert_eq!(kwargs.get("empty"), Some(&Arg::Null));
        assert_eq!(kwargs.get_str("q"), Some("hello world!"));
        assert_eq!(kwargs.get_str("café"), Some("1"));
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/"), Vec::<String>::new());
        assert_eq!(split_path("//a/b%20c/"), vec!["a", "b c"]);
    }

    #[test]
    fn test_merge_json_replaces() {
        let mut kwargs = parse_query("a=1&b=2");
        let Value::Object(map) = json!({"a": {"x": 1}, "c": null}) else {
            unreachable!()
        };
        kwargs.merge_json(map);
        assert_eq!(kwargs.get("a"), Some(&Arg::Json(json!({"x": 1}))));
        assert!(kwargs.get("c").is_some_and(Arg::is_null));
        assert_eq!(
            Value::Object(kwargs.to_json()),
            json!({"a": {"x": 1}, "b": "2", "c": null})
        );
    }
}
