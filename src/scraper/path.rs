use serde_json::Value;

/// Resolve a dot-separated path against a JSON value.
///
/// Only object keys are followed. A missing key, a non-object intermediate
/// (including `null` and arrays) or an empty path yields `None`. A path that
/// lands on an explicit `null` yields `Some(&Value::Null)`.
pub fn resolve<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }

    let mut current = value;
    for key in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(key)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve a path that is expected to name an array of records.
pub fn resolve_array<'a>(value: &'a Value, path: &str) -> Option<&'a Vec<Value>> {
    resolve(value, path).and_then(Value::as_array)
}
