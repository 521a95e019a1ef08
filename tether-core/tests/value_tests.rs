use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::cmp::Ordering;
use tether_core::{Attributes, Value};

// ── JSON conversion ─────────────────────────────────────────────

#[test]
fn from_json_maps_every_kind() {
    let value = Value::from(json!({
        "flag": true,
        "count": 3,
        "ratio": 0.5,
        "name": "x",
        "tags": ["a", "b"],
        "nested": {"k": null}
    }));
    let map = value.as_map().unwrap();
    assert_eq!(map["flag"], Value::Bool(true));
    assert_eq!(map["count"], Value::Int(3));
    assert_eq!(map["ratio"], Value::Float(0.5));
    assert_eq!(map["name"], Value::from("x"));
    assert_eq!(map["tags"], Value::List(vec!["a".into(), "b".into()]));
    assert_eq!(map["nested"].get("k"), Some(Value::Null));
}

#[test]
fn to_json_encodes_dates_as_iso_strings() {
    let day = Utc.timestamp_millis_opt(1_523_760_174_833).unwrap();
    assert_eq!(Value::Date(day).to_json(), json!("2018-04-15T02:42:54.833Z"));
}

#[test]
fn json_text_parses() {
    let value = Value::from_json_str(r#"{"id": 7}"#).unwrap();
    assert_eq!(value.get("id"), Some(Value::Int(7)));
    assert!(Value::from_json_str("{").is_err());
}

#[test]
fn serde_uses_json_shape() {
    let mut attrs = Attributes::new();
    attrs.insert("a".into(), Value::Int(1));
    let text = serde_json::to_string(&Value::Map(attrs.clone())).unwrap();
    assert_eq!(text, r#"{"a":1}"#);
    let back: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(back, Value::Map(attrs));
}

// ── Equality ────────────────────────────────────────────────────

#[test]
fn int_and_float_compare_numerically() {
    assert_eq!(Value::Int(2), Value::Float(2.0));
    assert_ne!(Value::Int(2), Value::Float(2.5));
}

#[test]
fn strict_equality_does_not_coerce() {
    assert_ne!(Value::Int(1), Value::from("1"));
    assert_ne!(Value::Bool(true), Value::Int(1));
    assert_ne!(Value::Null, Value::from(""));
}

#[test]
fn loose_equality_coerces_numbers_and_bools() {
    assert!(Value::Int(1).loose_eq(&Value::from("1")));
    assert!(Value::from(" 2.5 ").loose_eq(&Value::Float(2.5)));
    assert!(Value::Bool(true).loose_eq(&Value::Int(1)));
    assert!(Value::Bool(false).loose_eq(&Value::from("0")));
    assert!(!Value::from("abc").loose_eq(&Value::Int(0)));
}

// ── Ordering ────────────────────────────────────────────────────

#[test]
fn compare_orders_like_kinds() {
    assert_eq!(Value::from("Antonette").compare(&Value::from("Bret")), Ordering::Less);
    assert_eq!(Value::Int(10).compare(&Value::Float(2.0)), Ordering::Greater);
    assert_eq!(Value::Null.compare(&Value::Int(0)), Ordering::Less);
    assert_eq!(Value::from("a").compare(&Value::Int(1)), Ordering::Equal);
}

// ── Access helpers ──────────────────────────────────────────────

#[test]
fn get_path_follows_nested_maps() {
    let value = Value::from(json!({"address": {"geo": {"lat": "-37.3"}}}));
    assert_eq!(value.get_path("address.geo.lat"), Some(Value::from("-37.3")));
    assert_eq!(value.get_path("address.zip"), None);
}

#[test]
fn display_prints_whole_floats_without_fraction() {
    assert_eq!(Value::Float(12.0).to_string(), "12");
    assert_eq!(Value::Float(1.5).to_string(), "1.5");
    assert_eq!(Value::Null.to_string(), "");
    assert_eq!(Value::from(vec![Value::Int(1), Value::Int(2)]).to_string(), "1,2");
}

#[test]
fn as_i64_accepts_whole_floats() {
    assert_eq!(Value::Float(3.0).as_i64(), Some(3));
    assert_eq!(Value::Float(3.1).as_i64(), None);
    assert_eq!(Value::from("3").as_i64(), None);
}

#[test]
fn option_converts_to_null() {
    assert_eq!(Value::from(None::<i64>), Value::Null);
    assert_eq!(Value::from(Some("x")), Value::from("x"));
    assert!(Value::from("").is_blank());
}
