//! Response metadata: RFC 5988 link relations and `X-` headers.

use crate::transport::TransportResponse;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tether_core::case::to_camel_case;

/// One entry of a `Link` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel: Option<String>,
    /// Every other parameter, quotes stripped.
    #[serde(flatten)]
    pub params: BTreeMap<String, String>,
}

/// Parses a `Link` header value such as
/// `<https://api/x?page=2>; rel="next", <https://api/x?page=9>; rel="last"`.
///
/// Entries without a closing `>` are skipped.
pub fn parse_links(value: &str) -> Vec<Link> {
    let mut links = Vec::new();
    for segment in value.split('<').skip(1) {
        let Some((url, rest)) = segment.split_once('>') else {
            continue;
        };
        let mut link = Link {
            url: url.trim().to_string(),
            rel: None,
            params: BTreeMap::new(),
        };
        let rest = rest.trim().trim_end_matches(',');
        for pair in rest.split(';') {
            let Some((key, value)) = pair.trim().split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = unquote(value.trim().trim_end_matches(',').trim());
            if key == "rel" {
                link.rel = Some(value.to_string());
            } else {
                link.params.insert(key.to_string(), value.to_string());
            }
        }
        links.push(link);
    }
    links
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

/// Side-channel data extracted from a response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseMeta {
    /// Parsed `Link` header, if present.
    pub links: Option<Vec<Link>>,
    /// `X-` headers keyed by their converted name: `X-Total-Count` becomes
    /// `totalCount` (or `total_count` without camel-casing).
    pub headers: Vec<(String, String)>,
}

impl ResponseMeta {
    pub fn from_response(response: &TransportResponse, camel_case: bool) -> Self {
        let mut meta = ResponseMeta::default();
        for (name, value) in &response.headers {
            if name.eq_ignore_ascii_case("link") {
                meta.links = Some(parse_links(value));
                continue;
            }
            let mut chars = name.chars();
            let is_x_header = matches!(chars.next(), Some('x' | 'X')) && chars.next() == Some('-');
            if !is_x_header {
                continue;
            }
            let snake = name[2..].to_ascii_lowercase().replace('-', "_");
            let key = if camel_case {
                to_camel_case(&snake)
            } else {
                snake
            };
            meta.headers.push((key, value.clone()));
        }
        meta
    }

    /// Looks up a converted header value.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_none() && self.headers.is_empty()
    }

    /// The links as JSON, for storing in an attribute bag.
    pub fn links_json(&self) -> Option<serde_json::Value> {
        self.links
            .as_ref()
            .and_then(|links| serde_json::to_value(links).ok())
    }
}

/// Receives response metadata, typically a dedicated meta entity.
pub trait MetaSink: Send + Sync + fmt::Debug {
    fn apply_meta(&self, meta: &ResponseMeta);
}
