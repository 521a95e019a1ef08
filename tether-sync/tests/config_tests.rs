use pretty_assertions::assert_eq;
use std::time::Duration;
use tether_sync::{SaveEncoding, SyncConfig, SyncError};

// ── Defaults ────────────────────────────────────────────────────

#[test]
fn sync_config_defaults() {
    let cfg = SyncConfig::default();
    assert!(cfg.sync_camel_case);
    assert!(cfg.save_snake_case);
    assert!(cfg.query_snake_case);
    assert_eq!(cfg.save_encoding, SaveEncoding::Json);
    assert_eq!(cfg.csrf_cookie_name, "csrftoken");
    assert_eq!(cfg.csrf_header_name.as_deref(), Some("X-CSRFToken"));
    assert_eq!(cfg.origin, None);
    assert_eq!(cfg.timeout(), Duration::from_secs(30));
}

#[test]
fn save_encoding_content_types() {
    assert_eq!(SaveEncoding::Json.content_type(), "application/json");
    assert_eq!(SaveEncoding::Form.content_type(), "application/x-www-form-urlencoded");
    assert_eq!(SaveEncoding::FormJson.content_type(), "application/x-www-form-urlencoded");
}

// ── TOML ────────────────────────────────────────────────────────

#[test]
fn from_toml_fills_missing_keys_with_defaults() {
    let cfg = SyncConfig::from_toml_str(
        r#"
        save_encoding = "form-json"
        origin = "https://app.example.com"
        "#,
    )
    .unwrap();
    assert_eq!(cfg.save_encoding, SaveEncoding::FormJson);
    assert_eq!(cfg.origin.as_deref(), Some("https://app.example.com"));
    assert!(cfg.sync_camel_case);
    assert_eq!(cfg.timeout_ms, 30_000);
}

#[test]
fn from_toml_reads_every_key() {
    let cfg = SyncConfig::from_toml_str(
        r#"
        sync_camel_case = false
        save_snake_case = false
        query_snake_case = false
        save_encoding = "form"
        csrf_cookie_name = "xsrf"
        csrf_header_name = "X-XSRF-Token"
        timeout_ms = 500
        "#,
    )
    .unwrap();
    assert_eq!(
        cfg,
        SyncConfig {
            sync_camel_case: false,
            save_snake_case: false,
            query_snake_case: false,
            save_encoding: SaveEncoding::Form,
            csrf_cookie_name: "xsrf".into(),
            csrf_header_name: Some("X-XSRF-Token".into()),
            origin: None,
            timeout_ms: 500,
        }
    );
}

#[test]
fn from_toml_rejects_unknown_encoding() {
    let err = SyncConfig::from_toml_str(r#"save_encoding = "xml""#).unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}

#[test]
fn sync_config_serde_roundtrip() {
    let cfg = SyncConfig {
        save_encoding: SaveEncoding::FormJson,
        ..Default::default()
    };
    let json = serde_json::to_string(&cfg).unwrap();
    assert!(json.contains("\"form-json\""));
    let back: SyncConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, cfg);
}
