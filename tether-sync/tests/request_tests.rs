use tether_core::CancelToken;
use tether_sync::{cookie_value, is_same_origin, prepare_url, Method, Operation, SyncOptions, SyncRequest};

// ── prepare_url ─────────────────────────────────────────────────

#[test]
fn prepare_url_without_params_is_unchanged() {
    assert_eq!(prepare_url("/users", &[], true), "/users");
}

#[test]
fn prepare_url_appends_query_string() {
    let params = vec![("pageSize".to_string(), "10".to_string())];
    assert_eq!(prepare_url("/users", &params, true), "/users?page_size=10");
    assert_eq!(prepare_url("/users", &params, false), "/users?pageSize=10");
}

#[test]
fn prepare_url_extends_existing_query() {
    let params = vec![("q".to_string(), "a b&c".to_string())];
    assert_eq!(prepare_url("/users?page=2", &params, true), "/users?page=2&q=a%20b%26c");
}

// ── Origin and cookies ──────────────────────────────────────────

#[test]
fn root_relative_urls_are_same_origin() {
    assert!(is_same_origin("/api/users", None));
    assert!(!is_same_origin("//cdn.example.com/x", None));
}

#[test]
fn absolute_urls_compare_against_origin() {
    let origin = Some("https://app.example.com");
    assert!(is_same_origin("https://app.example.com/api", origin));
    assert!(!is_same_origin("https://evil.example.com/api", origin));
    assert!(!is_same_origin("https://app.example.com/api", None));
}

#[test]
fn origin_must_end_at_a_url_boundary() {
    let origin = Some("https://app.example.com");
    assert!(!is_same_origin("https://app.example.com.evil.net/steal", origin));
    assert!(!is_same_origin("https://app.example.com:8443/api", origin));
    assert!(!is_same_origin("https://app.example.community/api", origin));
    assert!(is_same_origin("https://app.example.com", origin));
    assert!(is_same_origin("https://app.example.com?page=2", origin));
    assert!(is_same_origin("https://app.example.com#top", origin));
    assert!(is_same_origin("https://app.example.com/api", Some("https://app.example.com/")));
}

#[test]
fn cookie_value_finds_named_cookie() {
    let cookies = "sessionid=abc; csrftoken=tok123; theme=dark";
    assert_eq!(cookie_value(cookies, "csrftoken").as_deref(), Some("tok123"));
    assert_eq!(cookie_value(cookies, "missing"), None);
}

// ── Options ─────────────────────────────────────────────────────

#[test]
fn method_and_operation_names() {
    assert_eq!(Method::Patch.to_string(), "PATCH");
    assert!(Method::Delete.is_bodiless());
    assert!(!Method::Post.is_bodiless());
    assert_eq!(Operation::Destroy.to_string(), "destroy");
}

#[test]
fn request_from_options_prefers_override_method() {
    let token = CancelToken::new();
    let options = SyncOptions::new()
        .with_method(Method::Patch)
        .with_param("expand", "profile")
        .with_header("X-Trace", "1")
        .with_data(serde_json::json!({"a": 1}))
        .with_token(token.clone())
        .with_reset(true);
    let request = SyncRequest::from_options(Method::Put, "/users/1", &options);

    assert_eq!(request.method, Method::Patch);
    assert_eq!(request.url, "/users/1");
    assert_eq!(request.params, vec![("expand".to_string(), "profile".to_string())]);
    assert_eq!(request.headers.len(), 1);
    assert_eq!(request.data, Some(serde_json::json!({"a": 1})));
    assert!(options.reset);
    assert!(options.token.unwrap().same(&token));
}

#[test]
fn request_from_default_options_uses_default_method() {
    let request = SyncRequest::from_options(Method::Get, "/users", &SyncOptions::default());
    assert_eq!(request.method, Method::Get);
    assert!(request.data.is_none());
}
