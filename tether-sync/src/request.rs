//! Request descriptors and per-call sync options.

use crate::meta::MetaSink;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tether_core::case::to_snake_case;
use tether_core::CancelToken;

/// HTTP method of a sync request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl Method {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }

    /// Methods that carry credentials in the query string rather than the body.
    pub const fn is_bodiless(&self) -> bool {
        matches!(self, Method::Get | Method::Head | Method::Delete)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The logical operation a sync request performs. Used as the event path for
/// `request`, `sync` and `error` notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Fetch,
    Save,
    Destroy,
}

impl Operation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Operation::Fetch => "fetch",
            Operation::Save => "save",
            Operation::Destroy => "destroy",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied knobs for one fetch/save/destroy call.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Overrides the operation's default method.
    pub method: Option<Method>,
    /// Overrides the URL the entity or set would compute.
    pub url: Option<String>,
    /// Query parameters appended to the URL.
    pub params: Vec<(String, String)>,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// Explicit request payload, replacing the default body.
    pub data: Option<serde_json::Value>,
    /// Externally owned cancel token to use instead of a fresh one.
    pub token: Option<CancelToken>,
    /// Receives link relations and `X-` headers from the response.
    pub meta: Option<Arc<dyn MetaSink>>,
    /// Entity set fetch: replace the current members instead of merging.
    pub reset: bool,
}

impl SyncOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_token(mut self, token: CancelToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_meta(mut self, meta: Arc<dyn MetaSink>) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }
}

/// A normalized request descriptor, before encoding and authorization.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub method: Method,
    pub url: String,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub data: Option<serde_json::Value>,
    pub meta: Option<Arc<dyn MetaSink>>,
}

impl SyncRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: Vec::new(),
            headers: Vec::new(),
            data: None,
            meta: None,
        }
    }

    /// Builds a descriptor from call options. `options.method` wins over
    /// `default_method`; `options.data` is carried over as the payload.
    pub fn from_options(default_method: Method, url: impl Into<String>, options: &SyncOptions) -> Self {
        Self {
            method: options.method.unwrap_or(default_method),
            url: url.into(),
            params: options.params.clone(),
            headers: options.headers.clone(),
            data: options.data.clone(),
            meta: options.meta.clone(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

// ── URL and header helpers ──────────────────────────────────────

/// Appends query parameters to `url`, snake-casing the keys if asked to.
pub fn prepare_url(url: &str, params: &[(String, String)], snake_case_keys: bool) -> String {
    if params.is_empty() {
        return url.to_string();
    }
    let encoded = params
        .iter()
        .map(|(key, value)| {
            let key = if snake_case_keys {
                to_snake_case(key)
            } else {
                key.clone()
            };
            format!("{}={}", urlencoding::encode(&key), urlencoding::encode(value))
        })
        .collect::<Vec<_>>()
        .join("&");
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{encoded}")
}

/// True if `url` targets the same origin as `origin`. Root-relative paths
/// always do; protocol-relative (`//host`) paths never do. An absolute URL
/// matches only when the origin is followed by a path, query, fragment or
/// nothing at all.
pub fn is_same_origin(url: &str, origin: Option<&str>) -> bool {
    if url.starts_with('/') && !url.starts_with("//") {
        return true;
    }
    let origin = match origin {
        Some(origin) if !origin.is_empty() => origin.trim_end_matches('/'),
        _ => return false,
    };
    match url.strip_prefix(origin) {
        Some(rest) => rest.is_empty() || rest.starts_with(['/', '?', '#']),
        None => false,
    }
}

/// Extracts a cookie's value from a `Cookie` header style string.
pub fn cookie_value(cookies: &str, name: &str) -> Option<String> {
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.trim().to_string())
    })
}

/// Case-insensitive header lookup.
pub fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
