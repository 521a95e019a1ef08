//! The sync protocol driver.
//!
//! [`SyncClient::perform`] wraps one logical network operation:
//!
//! 1. publish `request:<op>` on the target
//! 2. encode and authorize the request, hand it to the transport
//! 3. if the token was canceled meanwhile, fail with [`SyncError::Canceled`]
//!    and discard whatever arrived
//! 4. reconcile the decoded response into the target
//! 5. publish `sync:<op>` or `error:<op>`, then invalidate the token

use crate::auth::Auth;
use crate::config::{SaveEncoding, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::http::HttpTransport;
use crate::meta::ResponseMeta;
use crate::request::{cookie_value, is_same_origin, prepare_url, Operation, SyncRequest};
use crate::transport::{Transport, TransportRequest};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tether_core::case::{camel_case_keys, snake_case_keys};
use tether_core::{CancelToken, EventKind, Observable};
use tracing::{debug, warn};

/// Post-processes decoded response data, e.g. to pull records out of an
/// envelope.
pub type UnwrapHook = Arc<dyn Fn(serde_json::Value, &ResponseMeta) -> serde_json::Value + Send + Sync>;

/// A decoded, successful response.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncResponse {
    pub status: u16,
    /// Decoded body. `Null` for an empty body.
    pub data: serde_json::Value,
    pub meta: ResponseMeta,
}

/// Prepares requests, drives a [`Transport`] and decodes responses.
///
/// Cloning shares the transport and the cookie jar.
#[derive(Clone)]
pub struct SyncClient {
    transport: Arc<dyn Transport>,
    config: SyncConfig,
    auth: Option<Auth>,
    cookies: Arc<RwLock<Option<String>>>,
    unwrap: Option<UnwrapHook>,
}

impl SyncClient {
    pub fn new(transport: Arc<dyn Transport>, config: SyncConfig) -> Self {
        Self {
            transport,
            config,
            auth: None,
            cookies: Arc::new(RwLock::new(None)),
            unwrap: None,
        }
    }

    /// A client over [`HttpTransport`].
    pub fn http(config: SyncConfig) -> SyncResult<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_unwrap<F>(mut self, unwrap: F) -> Self
    where
        F: Fn(serde_json::Value, &ResponseMeta) -> serde_json::Value + Send + Sync + 'static,
    {
        self.unwrap = Some(Arc::new(unwrap));
        self
    }

    /// Sets the cookie string the anti-forgery token is read from.
    pub fn set_cookies(&self, cookies: impl Into<String>) {
        *self.cookies.write() = Some(cookies.into());
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn auth(&self) -> Option<&Auth> {
        self.auth.as_ref()
    }

    /// Turns a request descriptor into a wire request: query string, CSRF
    /// header, encoded body, content type and credentials.
    pub fn prepare(&self, request: &SyncRequest) -> SyncResult<TransportRequest> {
        let config = &self.config;
        let mut prepared = TransportRequest::new(
            request.method,
            prepare_url(&request.url, &request.params, config.query_snake_case),
        );
        for (name, value) in &request.headers {
            prepared.set_header(name.clone(), value.clone());
        }

        if let Some(header) = &config.csrf_header_name {
            if is_same_origin(&request.url, config.origin.as_deref()) {
                let token = self
                    .cookies
                    .read()
                    .as_deref()
                    .and_then(|cookies| cookie_value(cookies, &config.csrf_cookie_name));
                if let Some(token) = token {
                    prepared.set_header(header.clone(), token);
                }
            }
        }

        if let Some(data) = &request.data {
            let data = if config.save_snake_case {
                snake_case_keys(data.clone())
            } else {
                data.clone()
            };
            prepared.body = Some(encode_body(&data, config.save_encoding)?);
            if prepared.header("content-type").is_none() {
                prepared.set_header("content-type", config.save_encoding.content_type());
            }
        }

        if let Some(auth) = &self.auth {
            auth.prepare(&mut prepared, config);
        }
        Ok(prepared)
    }

    /// Performs one exchange and decodes the response.
    ///
    /// Fails with [`SyncError::Canceled`] if `token` is canceled at any point
    /// before the response is decoded.
    pub async fn exchange(&self, request: &SyncRequest, token: &CancelToken) -> SyncResult<SyncResponse> {
        if token.is_canceled() {
            return Err(SyncError::Canceled);
        }
        let prepared = self.prepare(request)?;
        debug!(method = %prepared.method, url = %prepared.url, "sync request");

        let sent = tokio::select! {
            biased;
            _ = token.cancelled() => Err(SyncError::Canceled),
            result = self.transport.send(prepared, token) => result,
        };
        // Responses that land after a cancel are discarded.
        if token.is_canceled() {
            debug!(url = %request.url, "sync response discarded after cancel");
            return Err(SyncError::Canceled);
        }
        let response = sent?;

        if !response.ok() {
            let err = SyncError::from_response(&response);
            warn!(status = response.status, url = %request.url, "sync request failed: {err}");
            return Err(err);
        }

        let meta = ResponseMeta::from_response(&response, self.config.sync_camel_case);
        if let Some(sink) = &request.meta {
            sink.apply_meta(&meta);
        }

        let mut data = if response.body.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&response.body)?
        };
        if self.config.sync_camel_case {
            data = camel_case_keys(data);
        }
        if let Some(unwrap) = &self.unwrap {
            data = unwrap(data, &meta);
        }

        Ok(SyncResponse {
            status: response.status,
            data,
            meta,
        })
    }

    /// Runs the full protocol for `operation` against `target`.
    ///
    /// `reconcile` runs only for a successful, uncanceled exchange. The token
    /// is invalidated once the outcome is known.
    pub async fn perform<T, E, F>(
        &self,
        target: &T,
        operation: Operation,
        request: SyncRequest,
        token: &CancelToken,
        reconcile: F,
    ) -> Result<(), E>
    where
        T: Observable,
        E: From<SyncError>,
        F: FnOnce(SyncResponse) -> Result<(), E>,
    {
        target.publish(EventKind::Request, Some(operation.as_str()));
        let outcome = match self.exchange(&request, token).await {
            Ok(response) => reconcile(response),
            Err(err) => {
                if err.is_canceled() {
                    debug!(%operation, "sync canceled");
                }
                Err(E::from(err))
            }
        };
        let kind = if outcome.is_ok() {
            EventKind::Sync
        } else {
            EventKind::Error
        };
        target.publish(kind, Some(operation.as_str()));
        token.invalidate();
        outcome
    }
}

impl fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncClient")
            .field("config", &self.config)
            .field("auth", &self.auth.is_some())
            .field("unwrap", &self.unwrap.is_some())
            .finish()
    }
}

/// Encodes a payload per `encoding`. Form encodings need a JSON object.
pub fn encode_body(data: &serde_json::Value, encoding: SaveEncoding) -> SyncResult<String> {
    match encoding {
        SaveEncoding::Json => Ok(data.to_string()),
        SaveEncoding::Form | SaveEncoding::FormJson => {
            let serde_json::Value::Object(map) = data else {
                return Err(SyncError::Encoding(format!(
                    "form encoding needs an object, got {data}"
                )));
            };
            let pairs = map
                .iter()
                .map(|(key, value)| {
                    let value = match (encoding, value) {
                        (SaveEncoding::FormJson, v) => v.to_string(),
                        (_, serde_json::Value::String(s)) => s.clone(),
                        (_, serde_json::Value::Null) => String::new(),
                        (_, v) => v.to_string(),
                    };
                    format!("{}={}", urlencoding::encode(key), urlencoding::encode(&value))
                })
                .collect::<Vec<_>>();
            Ok(pairs.join("&"))
        }
    }
}
