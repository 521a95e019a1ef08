//! Backend synchronization for tether entities.
//!
//! # Architecture
//!
//! - **Transport**: performs one HTTP exchange ([`Transport`]). Ships with a
//!   reqwest-backed [`HttpTransport`] and a scripted [`mock::MockTransport`].
//! - **Request**: a normalized descriptor ([`SyncRequest`]) built from the
//!   caller's [`SyncOptions`].
//! - **Client**: [`SyncClient`] encodes bodies, applies CSRF and [`Auth`],
//!   decodes responses and drives the request/sync/error event sequence
//!   around a [`CancelToken`](tether_core::CancelToken).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tether_sync::{mock::MockTransport, SyncClient, SyncConfig};
//!
//! let transport = Arc::new(MockTransport::new());
//! let client = SyncClient::new(transport, SyncConfig::default());
//! assert!(client.config().sync_camel_case);
//! ```

mod auth;
mod client;
mod config;
mod error;
mod http;
mod meta;
mod request;
pub mod transport;

pub use auth::Auth;
pub use client::{encode_body, SyncClient, SyncResponse, UnwrapHook};
pub use config::{SaveEncoding, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use http::HttpTransport;
pub use meta::{parse_links, Link, MetaSink, ResponseMeta};
pub use request::{cookie_value, is_same_origin, prepare_url, Method, Operation, SyncOptions, SyncRequest};
pub use transport::{mock, Transport, TransportRequest, TransportResponse};
