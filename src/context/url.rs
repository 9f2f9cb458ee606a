//! URL computation

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;

use crate::handler::{Arg, Kwargs};

/// Everything but unreserved characters and `/`
const QUOTE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Percent-encode for a URL, spaces as `+`
pub fn urlquote(s: &str) -> String {
    utf8_percent_encode(s, QUOTE).to_string().replace("%20", "+")
}

fn push_values<'a>(arg: &'a Arg, out: &mut Vec<std::borrow::Cow<'a, str>>) {
    match arg {
        Arg::Null | Arg::Json(Value::Null) => out.push("".into()),
        Arg::Text(s) | Arg::Json(Value::String(s)) => out.push(s.as_str().into()),
        Arg::Json(Value::Array(items)) => {
            for item in items {
                match item {
                    Value::String(s) => out.push(s.as_str().into()),
                    Value::Null => out.push("".into()),
                    other => out.push(other.to_string().into()),
                }
            }
        }
        Arg::Json(other) => out.push(other.to_string().into()),
        Arg::File(upload) => out.push(upload.filename.as_str().into()),
        Arg::Blob(info) => out.push(info.blob_key.as_str().into()),
        Arg::List(items) => {
            for item in items {
                push_values(item, out);
            }
        }
    }
}

/// `scheme://host/arg1/arg2?key=value&...`; list values repeat the key
pub fn compute_url_for_host(scheme: &str, host: &str, args: &[&str], params: &Kwargs) -> String {
    let path = args
        .iter()
        .map(|a| urlquote(a))
        .collect::<Vec<_>>()
        .join("/");
    let mut out = format!("{scheme}://{host}/{path}");
    if params.is_empty() {
        return out;
    }

    let mut pairs = Vec::new();
    for (key, arg) in params.iter() {
        let key = urlquote(key);
        let mut values = Vec::new();
        push_values(arg, &mut values);
        for value in values {
            pairs.push(format!("{key}={}", urlquote(&value)));
        }
    }
    out.push('?');
    out.push_str(&pairs.join("&"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urlquote() {
        assert_eq!(urlquote("a b/c?d=é"), "a+b/c%3Fd%3D%C3%A9");
    }

    #[test]
    fn test_compute_url_plain() {
        assert_eq!(
            compute_url_for_host("http", "example.com", &[], &Kwargs::new()),
            "http://example.com/"
        );
        assert_eq!(
            compute_url_for_host("https", "example.com", &["a", "b c"], &Kwargs::new()),
            "https://example.com/a/b+c"
        );
    }

    #[test]
    fn test_compute_url_params() {
        let params: Kwargs = [
            ("q", Arg::from("hello world")),
            ("tag", Arg::from("x")),
            ("tag", Arg::from("y")),
            ("empty", Arg::Null),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            compute_url_for_host("http", "h", &["search"], &params),
            "http://h/search?empty=&q=hello+world&tag=x&tag=y"
        );
    }
}
