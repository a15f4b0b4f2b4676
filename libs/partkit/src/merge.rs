//! Runtime merging of JSON values.
//!
//! Conflict policy is last-write-wins: a value from `source` replaces the value
//! in `target`, except that two objects are merged key by key (deep) or only at
//! the top level (shallow). Arrays are replaced, never concatenated.

use serde_json::Value;

/// Merge `source` into `target`, recursing into nested objects.
pub fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, source) => *target = source,
    }
}

/// Merge `source` into `target`, replacing top-level keys wholesale.
pub fn shallow_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                target.insert(key, value);
            }
        }
        (target, source) => *target = source,
    }
}

/// Deep-merge a sequence of values left to right.
pub fn merged(values: impl IntoIterator<Item = Value>) -> Value {
    let mut out = Value::Null;
    for value in values {
        if out.is_null() {
            out = value;
        } else {
            deep_merge(&mut out, value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_recurses_and_last_write_wins() {
        let mut base = json!({"server": {"host": "127.0.0.1", "port": 8087}, "tags": ["a"]});
        deep_merge(&mut base, json!({"server": {"port": 9000}, "tags": ["b", "c"]}));
        assert_eq!(
            base,
            json!({"server": {"host": "127.0.0.1", "port": 9000}, "tags": ["b", "c"]})
        );
    }

    #[test]
    fn shallow_merge_replaces_nested_objects() {
        let mut base = json!({"server": {"host": "127.0.0.1", "port": 8087}});
        shallow_merge(&mut base, json!({"server": {"port": 9000}}));
        assert_eq!(base, json!({"server": {"port": 9000}}));
    }

    #[test]
    fn non_object_source_replaces_target() {
        let mut base = json!({"a": 1});
        deep_merge(&mut base, json!(null));
        assert_eq!(base, Value::Null);
    }

    #[test]
    fn merged_folds_left_to_right() {
        let v = merged([json!({"a": 1}), json!({"b": 2}), json!({"a": 3})]);
        assert_eq!(v, json!({"a": 3, "b": 2}));
    }
}
