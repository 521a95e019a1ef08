//! Non-cookie request authorization.

use crate::config::{SaveEncoding, SyncConfig};
use crate::request::prepare_url;
use crate::transport::TransportRequest;
use serde::{Deserialize, Serialize};

/// Credentials applied to every outgoing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "auth_type", rename_all = "lowercase")]
pub enum Auth {
    /// `apikey=<key>` in the query string.
    ApiKey { apikey: String },
    /// `Authorization: Bearer <token>` header.
    Bearer { access_token: String },
    /// The token as a query parameter for GET/HEAD/DELETE, otherwise merged
    /// into the request body.
    Token { access_token: String },
}

impl Auth {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Auth::Bearer {
            access_token: access_token.into(),
        }
    }

    pub fn api_key(apikey: impl Into<String>) -> Self {
        Auth::ApiKey {
            apikey: apikey.into(),
        }
    }

    pub fn token(access_token: impl Into<String>) -> Self {
        Auth::Token {
            access_token: access_token.into(),
        }
    }

    /// Adds credentials to an encoded request.
    pub fn prepare(&self, request: &mut TransportRequest, config: &SyncConfig) {
        match self {
            Auth::ApiKey { apikey } => {
                let params = [("apikey".to_string(), apikey.clone())];
                request.url = prepare_url(&request.url, &params, config.query_snake_case);
            }
            Auth::Bearer { access_token } => {
                request.set_header("authorization", format!("Bearer {access_token}"));
            }
            Auth::Token { access_token } if request.method.is_bodiless() => {
                let params = [("accessToken".to_string(), access_token.clone())];
                request.url = prepare_url(&request.url, &params, config.query_snake_case);
            }
            Auth::Token { access_token } => {
                let key = if config.save_snake_case {
                    "access_token"
                } else {
                    "accessToken"
                };
                request.body = Some(merge_token(
                    request.body.take(),
                    key,
                    access_token,
                    config.save_encoding,
                ));
            }
        }
    }
}

fn merge_token(body: Option<String>, key: &str, token: &str, encoding: SaveEncoding) -> String {
    match encoding {
        SaveEncoding::Json => {
            let mut object = body
                .as_deref()
                .and_then(|b| serde_json::from_str::<serde_json::Value>(b).ok())
                .and_then(|v| match v {
                    serde_json::Value::Object(map) => Some(map),
                    _ => None,
                })
                .unwrap_or_default();
            object.insert(key.to_string(), serde_json::Value::String(token.to_string()));
            serde_json::Value::Object(object).to_string()
        }
        SaveEncoding::Form | SaveEncoding::FormJson => {
            let value = if encoding == SaveEncoding::FormJson {
                serde_json::Value::String(token.to_string()).to_string()
            } else {
                token.to_string()
            };
            let pair = format!("{}={}", urlencoding::encode(key), urlencoding::encode(&value));
            match body {
                Some(body) if !body.is_empty() => format!("{body}&{pair}"),
                _ => pair,
            }
        }
    }
}
