//! Sync configuration.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How request payloads are put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SaveEncoding {
    /// `application/json` body.
    #[default]
    Json,
    /// `application/x-www-form-urlencoded` body with plain values.
    Form,
    /// Form body whose values are individually JSON-encoded.
    FormJson,
}

impl SaveEncoding {
    pub const fn content_type(&self) -> &'static str {
        match self {
            SaveEncoding::Json => "application/json",
            SaveEncoding::Form | SaveEncoding::FormJson => "application/x-www-form-urlencoded",
        }
    }
}

/// Settings shared by every request a [`SyncClient`](crate::SyncClient) makes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Convert response keys to camelCase.
    pub sync_camel_case: bool,
    /// Convert request body keys to snake_case.
    pub save_snake_case: bool,
    /// Convert query parameter keys to snake_case.
    pub query_snake_case: bool,
    pub save_encoding: SaveEncoding,
    /// Cookie holding the anti-forgery token.
    pub csrf_cookie_name: String,
    /// Header the anti-forgery token is sent in. `None` disables it.
    pub csrf_header_name: Option<String>,
    /// Origin (`scheme://host[:port]`) treated as same-origin.
    pub origin: Option<String>,
    /// HTTP timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_camel_case: true,
            save_snake_case: true,
            query_snake_case: true,
            save_encoding: SaveEncoding::Json,
            csrf_cookie_name: "csrftoken".to_string(),
            csrf_header_name: Some("X-CSRFToken".to_string()),
            origin: None,
            timeout_ms: 30_000,
        }
    }
}

impl SyncConfig {
    /// Parses a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> SyncResult<Self> {
        toml::from_str(s).map_err(|e| SyncError::Config(e.to_string()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
