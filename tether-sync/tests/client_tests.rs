use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tether_core::{CancelToken, EventKind, Observable, ObserverHub};
use tether_sync::mock::MockTransport;
use tether_sync::{
    Auth, MetaSink, Method, Operation, ResponseMeta, SaveEncoding, SyncClient, SyncConfig,
    SyncError, SyncRequest, SyncResult, Transport, TransportRequest, TransportResponse,
};

/// Records every event published on it.
#[derive(Default)]
struct Target {
    hub: Mutex<ObserverHub<Target>>,
    events: Arc<Mutex<Vec<String>>>,
}

impl Target {
    fn recording() -> Self {
        let target = Target::default();
        for kind in [EventKind::Request, EventKind::Sync, EventKind::Error] {
            let events = target.events.clone();
            target.on(kind, move |_, event| events.lock().push(event.to_string()));
        }
        target
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl Observable for Target {
    fn observer_hub(&self) -> &Mutex<ObserverHub<Self>> {
        &self.hub
    }
}

#[derive(Debug, Default)]
struct MetaRecorder(Mutex<Option<ResponseMeta>>);

impl MetaSink for MetaRecorder {
    fn apply_meta(&self, meta: &ResponseMeta) {
        *self.0.lock() = Some(meta.clone());
    }
}

/// Cancels the token while the request is in flight, then answers anyway.
struct CancelingTransport;

#[async_trait]
impl Transport for CancelingTransport {
    async fn send(&self, _request: TransportRequest, token: &CancelToken) -> SyncResult<TransportResponse> {
        token.cancel();
        Ok(TransportResponse::json(&json!({"id": 1})))
    }
}

fn client_with(config: SyncConfig) -> (Arc<MockTransport>, SyncClient) {
    let transport = Arc::new(MockTransport::new());
    let client = SyncClient::new(transport.clone(), config);
    (transport, client)
}

fn client() -> (Arc<MockTransport>, SyncClient) {
    client_with(SyncConfig::default())
}

// ── Request preparation ─────────────────────────────────────────

#[test]
fn prepare_snake_cases_json_body_and_sets_content_type() {
    let (_, client) = client();
    let request = SyncRequest::new(Method::Post, "/users").with_data(json!({"firstName": "Ada"}));
    let prepared = client.prepare(&request).unwrap();

    assert_eq!(prepared.body.as_deref(), Some(r#"{"first_name":"Ada"}"#));
    assert_eq!(prepared.header("content-type"), Some("application/json"));
}

#[test]
fn prepare_keeps_caller_content_type() {
    let (_, client) = client();
    let mut request = SyncRequest::new(Method::Post, "/users").with_data(json!({"a": 1}));
    request.headers.push(("Content-Type".into(), "application/vnd.api+json".into()));
    let prepared = client.prepare(&request).unwrap();
    assert_eq!(prepared.header("content-type"), Some("application/vnd.api+json"));
}

#[test]
fn prepare_form_encodings() {
    let data = json!({"name": "A B", "tags": ["x"], "note": null});

    let (_, client) = client_with(SyncConfig {
        save_encoding: SaveEncoding::Form,
        ..Default::default()
    });
    let prepared = client
        .prepare(&SyncRequest::new(Method::Post, "/u").with_data(data.clone()))
        .unwrap();
    assert_eq!(prepared.body.as_deref(), Some("name=A%20B&note=&tags=%5B%22x%22%5D"));
    assert_eq!(prepared.header("content-type"), Some("application/x-www-form-urlencoded"));

    let (_, client) = client_with(SyncConfig {
        save_encoding: SaveEncoding::FormJson,
        ..Default::default()
    });
    let prepared = client
        .prepare(&SyncRequest::new(Method::Post, "/u").with_data(data))
        .unwrap();
    assert_eq!(prepared.body.as_deref(), Some("name=%22A%20B%22&note=null&tags=%5B%22x%22%5D"));
}

#[test]
fn prepare_rejects_form_encoding_of_non_objects() {
    let (_, client) = client_with(SyncConfig {
        save_encoding: SaveEncoding::Form,
        ..Default::default()
    });
    let err = client
        .prepare(&SyncRequest::new(Method::Post, "/u").with_data(json!([1, 2])))
        .unwrap_err();
    assert!(matches!(err, SyncError::Encoding(_)));
}

#[test]
fn prepare_adds_csrf_header_for_same_origin() {
    let (_, client) = client();
    client.set_cookies("sessionid=s; csrftoken=abc123");

    let prepared = client.prepare(&SyncRequest::new(Method::Post, "/users")).unwrap();
    assert_eq!(prepared.header("X-CSRFToken"), Some("abc123"));

    let prepared = client
        .prepare(&SyncRequest::new(Method::Post, "https://other.example.com/users"))
        .unwrap();
    assert_eq!(prepared.header("X-CSRFToken"), None);
}

#[test]
fn prepare_withholds_csrf_from_lookalike_host() {
    let (_, client) = client_with(SyncConfig {
        origin: Some("https://api.example.com".to_string()),
        ..Default::default()
    });
    client.set_cookies("csrftoken=abc123");

    let prepared = client
        .prepare(&SyncRequest::new(Method::Get, "https://api.example.com.evil.net/steal"))
        .unwrap();
    assert_eq!(prepared.header("X-CSRFToken"), None);

    let prepared = client
        .prepare(&SyncRequest::new(Method::Get, "https://api.example.com/users"))
        .unwrap();
    assert_eq!(prepared.header("X-CSRFToken"), Some("abc123"));
}

#[test]
fn prepare_skips_csrf_when_disabled() {
    let (_, client) = client_with(SyncConfig {
        csrf_header_name: None,
        ..Default::default()
    });
    client.set_cookies("csrftoken=abc123");
    let prepared = client.prepare(&SyncRequest::new(Method::Post, "/users")).unwrap();
    assert_eq!(prepared.header("X-CSRFToken"), None);
}

#[test]
fn prepare_applies_auth() {
    let (_, client) = client();
    let client = client.with_auth(Auth::bearer("t"));
    let prepared = client.prepare(&SyncRequest::new(Method::Get, "/users")).unwrap();
    assert_eq!(prepared.header("authorization"), Some("Bearer t"));
}

// ── Exchange ────────────────────────────────────────────────────

#[tokio::test]
async fn exchange_camel_cases_response() {
    let (transport, client) = client();
    transport.push_json(json!({"first_name": "Ada", "home_address": {"zip_code": "1"}}));

    let response = client
        .exchange(&SyncRequest::new(Method::Get, "/users/1"), &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(response.data, json!({"firstName": "Ada", "homeAddress": {"zipCode": "1"}}));
    assert_eq!(transport.last_request().unwrap().url, "/users/1");
}

#[tokio::test]
async fn exchange_empty_body_is_null() {
    let (transport, client) = client();
    transport.push(TransportResponse::new(204, ""));
    let response = client
        .exchange(&SyncRequest::new(Method::Delete, "/users/1"), &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(response.status, 204);
    assert_eq!(response.data, serde_json::Value::Null);
}

#[tokio::test]
async fn exchange_json_error_body_gives_message_and_code() {
    let (transport, client) = client();
    transport.push(
        TransportResponse::new(422, r#"{"message":"name taken","code":"conflict"}"#)
            .with_header("Content-Type", "application/json"),
    );
    let err = client
        .exchange(&SyncRequest::new(Method::Post, "/users"), &CancelToken::new())
        .await
        .unwrap_err();
    match err {
        SyncError::Status { status, code, message } => {
            assert_eq!(status, 422);
            assert_eq!(code.as_deref(), Some("conflict"));
            assert_eq!(message, "name taken");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn exchange_plain_error_uses_status_text() {
    let (transport, client) = client();
    transport.push(TransportResponse::new(500, "boom"));
    let err = client
        .exchange(&SyncRequest::new(Method::Get, "/users"), &CancelToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.to_string(), "request failed with status 500: Internal Server Error");
}

#[tokio::test]
async fn exchange_feeds_meta_sink_and_unwrap_hook() {
    let (transport, client) = client();
    let client = client.with_unwrap(|data, meta| {
        assert_eq!(meta.header("totalCount"), Some("2"));
        data.get("results").cloned().unwrap_or_default()
    });
    transport.push(
        TransportResponse::json(&json!({"results": [{"id": 1}, {"id": 2}]}))
            .with_header("X-Total-Count", "2"),
    );
    let recorder = Arc::new(MetaRecorder::default());
    let mut request = SyncRequest::new(Method::Get, "/users");
    request.meta = Some(recorder.clone());

    let response = client.exchange(&request, &CancelToken::new()).await.unwrap();
    assert_eq!(response.data, json!([{"id": 1}, {"id": 2}]));
    let meta = recorder.0.lock().clone().unwrap();
    assert_eq!(meta.header("totalCount"), Some("2"));
}

#[tokio::test]
async fn exchange_transport_failure_propagates() {
    let (transport, client) = client();
    transport.push_error("connection reset");
    let err = client
        .exchange(&SyncRequest::new(Method::Get, "/users"), &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Transport(ref m) if m == "connection reset"));
}

// ── Cancellation ────────────────────────────────────────────────

#[tokio::test]
async fn exchange_with_canceled_token_never_sends() {
    let (transport, client) = client();
    transport.push_json(json!({}));
    let token = CancelToken::new();
    token.cancel();

    let err = client
        .exchange(&SyncRequest::new(Method::Get, "/users"), &token)
        .await
        .unwrap_err();
    assert!(err.is_canceled());
    assert!(transport.requests().is_empty());
    assert_eq!(transport.pending(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_flight_beats_late_response() {
    let (transport, client) = client();
    transport.push_delayed(TransportResponse::json(&json!({"id": 1})), Duration::from_secs(5));
    let token = CancelToken::new();
    let request = SyncRequest::new(Method::Get, "/users/1");

    let (result, _) = tokio::join!(client.exchange(&request, &token), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
    });
    assert!(result.unwrap_err().is_canceled());
}

#[tokio::test]
async fn response_arriving_after_cancel_is_discarded() {
    let client = SyncClient::new(Arc::new(CancelingTransport), SyncConfig::default());
    let token = CancelToken::new();
    let err = client
        .exchange(&SyncRequest::new(Method::Get, "/users/1"), &token)
        .await
        .unwrap_err();
    assert!(err.is_canceled());
}

// ── Protocol events ─────────────────────────────────────────────

#[tokio::test]
async fn perform_publishes_request_then_sync_and_invalidates() {
    let (transport, client) = client();
    transport.push_json(json!({"id": 7}));
    let target = Target::recording();
    let token = CancelToken::new();
    let mut seen = None;

    let result: Result<(), SyncError> = client
        .perform(&target, Operation::Fetch, SyncRequest::new(Method::Get, "/x"), &token, |response| {
            seen = Some(response.data);
            Ok(())
        })
        .await;

    assert!(result.is_ok());
    assert_eq!(seen, Some(json!({"id": 7})));
    assert_eq!(target.events(), vec!["request:fetch", "sync:fetch"]);
    assert!(!token.is_valid());
    assert!(!token.is_canceled());
}

#[tokio::test]
async fn perform_publishes_error_on_failure() {
    let (transport, client) = client();
    transport.push(TransportResponse::new(404, ""));
    let target = Target::recording();
    let token = CancelToken::new();

    let result: Result<(), SyncError> = client
        .perform(&target, Operation::Save, SyncRequest::new(Method::Put, "/x/1"), &token, |_| {
            panic!("reconcile must not run for a failed exchange")
        })
        .await;

    assert_eq!(result.unwrap_err().status(), Some(404));
    assert_eq!(target.events(), vec!["request:save", "error:save"]);
    assert!(!token.is_valid());
}

#[tokio::test]
async fn perform_reports_reconcile_errors_as_error_event() {
    let (transport, client) = client();
    transport.push_json(json!("not an object"));
    let target = Target::recording();

    let result: Result<(), SyncError> = client
        .perform(
            &target,
            Operation::Fetch,
            SyncRequest::new(Method::Get, "/x"),
            &CancelToken::new(),
            |_| Err(SyncError::Encoding("unexpected payload".into())),
        )
        .await;

    assert!(matches!(result, Err(SyncError::Encoding(_))));
    assert_eq!(target.events(), vec!["request:fetch", "error:fetch"]);
}

#[tokio::test]
async fn perform_canceled_keeps_token_canceled() {
    let client = SyncClient::new(Arc::new(CancelingTransport), SyncConfig::default());
    let target = Target::recording();
    let token = CancelToken::new();

    let result: Result<(), SyncError> = client
        .perform(&target, Operation::Destroy, SyncRequest::new(Method::Delete, "/x/1"), &token, |_| Ok(()))
        .await;

    assert!(result.unwrap_err().is_canceled());
    assert_eq!(target.events(), vec!["request:destroy", "error:destroy"]);
    assert!(token.is_canceled());
}
