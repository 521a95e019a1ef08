//! Key case conversion for the wire boundary.
//!
//! Backends commonly speak `snake_case` while client code reads `camelCase`.
//! The sync layer converts response keys to camelCase and request keys to
//! snake_case when configured to.

use serde_json::{Map, Value};

/// `not_camel_case` -> `notCamelCase`. Strings without underscores are
/// returned unchanged.
pub fn to_camel_case(s: &str) -> String {
    let mut parts = s.split('_');
    let Some(first) = parts.next() else {
        return String::new();
    };
    if !s.contains('_') {
        return s.to_string();
    }
    let mut out = first.to_lowercase();
    for part in parts {
        let mut chars = part.chars();
        if let Some(c) = chars.next() {
            out.extend(c.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// `notSnakeCasing` -> `not_snake_casing`.
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Renames every object key in `value`, descending into nested objects and
/// arrays.
pub fn rename_keys(value: Value, rename: &impl Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (rename(&k), rename_keys(v, rename)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| rename_keys(v, rename)).collect())
        }
        other => other,
    }
}

/// Deep camelCase conversion of object keys.
pub fn camel_case_keys(value: Value) -> Value {
    rename_keys(value, &to_camel_case)
}

/// Deep snake_case conversion of object keys.
pub fn snake_case_keys(value: Value) -> Value {
    rename_keys(value, &to_snake_case)
}
