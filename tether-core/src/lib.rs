//! Core building blocks for tether.
//!
//! This crate defines the pieces every stateful tether object is built from:
//! - [`ClientId`]: process-local identity for entities and entity sets
//! - [`Value`] / [`Attributes`]: the uniform attribute value type
//! - [`ObserverHub`] / [`Observable`]: two-tier event dispatch keyed by
//!   [`EventKind`] and an optional path
//! - [`CancelToken`]: one-shot token representing an in-flight operation
//! - [`case`]: snake_case / camelCase key conversion used at the wire boundary
//!
//! Nothing in here performs I/O. The sync protocol lives in `tether-sync` and
//! the entity model in `tether-model`.

mod cancel;
pub mod case;
mod ids;
mod observer;
mod value;

pub use cancel::CancelToken;
pub use ids::ClientId;
pub use observer::{observer, Event, EventKind, Observable, Observer, ObserverHub};
pub use value::{Attributes, Embedded, EntityRef, Value};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
