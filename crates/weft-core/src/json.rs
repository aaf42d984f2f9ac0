//! Helpers for poking at untyped JSON event data.
//!
//! Passive commands select their match target with a dotted path into the
//! event content (`body`, `info.mimetype`, ...). Keys that themselves contain
//! dots are written in brackets: `[m.relates_to].rel_type`.

use serde_json::Value;

/// Splits a dotted path into its segments, honouring bracketed keys.
///
/// ```
/// use weft_core::json::split_path;
///
/// assert_eq!(split_path("a.b"), vec!["a", "b"]);
/// assert_eq!(split_path("[m.relates_to].rel_type"), vec!["m.relates_to", "rel_type"]);
/// ```
pub fn split_path(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut rest = path;

    while !rest.is_empty() {
        if let Some(inner) = rest.strip_prefix('[')
            && let Some(end) = inner.find(']')
        {
            segments.push(&inner[..end]);
            rest = &inner[end + 1..];
            rest = rest.strip_prefix('.').unwrap_or(rest);
            continue;
        }

        match rest.split_once('.') {
            Some((head, tail)) => {
                segments.push(head);
                rest = tail;
            }
            None => {
                segments.push(rest);
                rest = "";
            }
        }
    }

    segments
}

/// Resolves a dotted path against a JSON value.
///
/// Object segments are looked up by key, array segments by numeric index.
/// Returns `None` as soon as a segment is missing.
pub fn resolve<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    split_path(path)
        .into_iter()
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Resolves a path and returns the target only if it is a string.
pub fn resolve_str<'a>(value: &'a Value, path: &str) -> Option<&'a str> {
    resolve(value, path).and_then(Value::as_str)
}

/// Checks whether `left` is a structural subset of `right`.
///
/// Scalars must be equal, arrays must have the same length and be pairwise
/// left-equal, and every key of a left object must exist in the right object
/// with a left-equal value. Extra keys on the right are ignored.
pub fn left_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(l), Value::Bool(r)) => l == r,
        (Value::Number(l), Value::Number(r)) => l.as_f64() == r.as_f64(),
        (Value::String(l), Value::String(r)) => l == r,
        (Value::Array(l), Value::Array(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(l, r)| left_equals(l, r))
        }
        (Value::Object(l), Value::Object(r)) => l
            .iter()
            .all(|(key, lv)| r.get(key).is_some_and(|rv| left_equals(lv, rv))),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_plain_and_bracketed() {
        assert_eq!(split_path("body"), vec!["body"]);
        assert_eq!(split_path("info.mimetype"), vec!["info", "mimetype"]);
        assert_eq!(
            split_path("[m.relates_to].[m.in_reply_to].event_id"),
            vec!["m.relates_to", "m.in_reply_to", "event_id"]
        );
    }

    #[test]
    fn test_resolve_nested() {
        let content = json!({
            "body": "hi",
            "m.relates_to": { "rel_type": "m.thread", "ids": ["$a", "$b"] }
        });

        assert_eq!(resolve_str(&content, "body"), Some("hi"));
        assert_eq!(
            resolve_str(&content, "[m.relates_to].rel_type"),
            Some("m.thread")
        );
        assert_eq!(resolve_str(&content, "[m.relates_to].ids.1"), Some("$b"));
        assert!(resolve(&content, "missing.key").is_none());
        assert!(resolve(&content, "body.deeper").is_none());
    }

    #[test]
    fn test_left_equals_ignores_extra_right_keys() {
        let template = json!({ "content": { "msgtype": "m.notice" } });
        let event = json!({
            "type": "m.room.message",
            "content": { "msgtype": "m.notice", "body": "hello" }
        });
        assert!(left_equals(&template, &event));
    }

    #[test]
    fn test_left_equals_mismatch() {
        assert!(!left_equals(
            &json!({ "content": { "msgtype": "m.text" } }),
            &json!({ "content": { "msgtype": "m.notice" } })
        ));
        assert!(!left_equals(&json!([1, 2]), &json!([1, 2, 3])));
        assert!(!left_equals(&json!(true), &json!(false)));
        assert!(left_equals(&json!(1), &json!(1.0)));
        assert!(!left_equals(&json!({ "a": null }), &json!({})));
    }
}
