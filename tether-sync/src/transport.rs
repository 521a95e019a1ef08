//! Transport abstraction.
//!
//! A [`Transport`] performs one HTTP exchange. It knows nothing about
//! entities, case conversion or authorization; [`SyncClient`](crate::SyncClient)
//! prepares the request and interprets the response.

use crate::error::SyncResult;
use crate::request::{find_header, Method};
use async_trait::async_trait;
use tether_core::CancelToken;

/// A fully prepared wire request.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl TransportRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Sets a header, replacing any existing value under the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }
}

/// A raw wire response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    /// Header pairs in arrival order. Names may repeat.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            status_text: default_status_text(status).to_string(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// A 200 response carrying `body` as JSON.
    pub fn json(body: &serde_json::Value) -> Self {
        Self::new(200, body.to_string()).with_header("content-type", "application/json")
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = text.into();
        self
    }

    /// True for 2xx statuses.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value under `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn text(&self) -> &str {
        &self.body
    }
}

fn default_status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}

/// Performs HTTP exchanges for the sync layer.
///
/// Implementations should abandon the exchange when `token` is canceled,
/// but the caller re-checks the token after `send` resolves, so a transport
/// that ignores it is still correct.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: TransportRequest,
        token: &CancelToken,
    ) -> SyncResult<TransportResponse>;
}

/// A scripted transport for testing.
pub mod mock {
    use super::*;
    use crate::error::SyncError;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    #[derive(Debug)]
    enum Reply {
        Response(TransportResponse),
        Failure(String),
    }

    #[derive(Debug)]
    struct Scripted {
        reply: Reply,
        delay: Option<Duration>,
    }

    /// Replies to requests in FIFO order from a queue of scripted responses,
    /// recording every request it sees.
    ///
    /// An empty queue answers `404 Not Found`.
    #[derive(Debug, Default)]
    pub struct MockTransport {
        replies: Mutex<VecDeque<Scripted>>,
        requests: Mutex<Vec<TransportRequest>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues a response.
        pub fn push(&self, response: TransportResponse) {
            self.enqueue(Reply::Response(response), None);
        }

        /// Queues a 200 JSON response.
        pub fn push_json(&self, body: serde_json::Value) {
            self.push(TransportResponse::json(&body));
        }

        /// Queues a response that arrives after `delay`.
        pub fn push_delayed(&self, response: TransportResponse, delay: Duration) {
            self.enqueue(Reply::Response(response), Some(delay));
        }

        /// Queues a transport-level failure.
        pub fn push_error(&self, message: impl Into<String>) {
            self.enqueue(Reply::Failure(message.into()), None);
        }

        fn enqueue(&self, reply: Reply, delay: Option<Duration>) {
            self.replies.lock().push_back(Scripted { reply, delay });
        }

        /// Every request sent so far.
        pub fn requests(&self) -> Vec<TransportRequest> {
            self.requests.lock().clone()
        }

        pub fn last_request(&self) -> Option<TransportRequest> {
            self.requests.lock().last().cloned()
        }

        /// Number of scripted replies not yet consumed.
        pub fn pending(&self) -> usize {
            self.replies.lock().len()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(
            &self,
            request: TransportRequest,
            _token: &CancelToken,
        ) -> SyncResult<TransportResponse> {
            self.requests.lock().push(request);
            let next = self.replies.lock().pop_front();
            let Some(scripted) = next else {
                return Ok(TransportResponse::new(404, ""));
            };
            // Deliberately ignores the token: the sync client must discard
            // responses that arrive after cancellation on its own.
            if let Some(delay) = scripted.delay {
                tokio::time::sleep(delay).await;
            }
            match scripted.reply {
                Reply::Response(response) => Ok(response),
                Reply::Failure(message) => Err(SyncError::Transport(message)),
            }
        }
    }
}
