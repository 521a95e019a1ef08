use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;
use tether_core::case::{camel_case_keys, snake_case_keys, to_camel_case, to_snake_case};

// ── Single keys ─────────────────────────────────────────────────

#[test]
fn camel_case_conversion() {
    assert_eq!(to_camel_case("not_camel_case"), "notCamelCase");
    assert_eq!(to_camel_case("plain"), "plain");
    assert_eq!(to_camel_case("already_Camel"), "alreadyCamel");
}

#[test]
fn snake_case_conversion() {
    assert_eq!(to_snake_case("notSnakeCasing"), "not_snake_casing");
    assert_eq!(to_snake_case("plain"), "plain");
}

// ── Deep conversion ─────────────────────────────────────────────

#[test]
fn deep_conversion_both_directions() {
    let camel = json!({
        "key": true,
        "camelCase": true,
        "snakeCaseKey": true,
        "subObject": {"key": "value", "keyTest": ""},
        "items": [{"innerKey": 1}]
    });
    let snake = json!({
        "key": true,
        "camel_case": true,
        "snake_case_key": true,
        "sub_object": {"key": "value", "key_test": ""},
        "items": [{"inner_key": 1}]
    });
    assert_eq!(snake_case_keys(camel.clone()), snake);
    assert_eq!(camel_case_keys(snake), camel);
}

#[test]
fn values_are_untouched() {
    let data = json!({"some_key": "some_value"});
    assert_eq!(camel_case_keys(data), json!({"someKey": "some_value"}));
}

proptest! {
    #[test]
    fn camel_then_snake_roundtrips(words in prop::collection::vec("[a-z]{1,8}", 1..5)) {
        let snake = words.join("_");
        prop_assert_eq!(to_snake_case(&to_camel_case(&snake)), snake);
    }
}
