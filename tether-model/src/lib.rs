//! Observable entities and entity sets for tether.
//!
//! # Architecture
//!
//! - **Schema**: [`EntitySchema`] declares the id attribute, defaults,
//!   per-field [`FieldSpec`] metadata and the validation policy.
//! - **Entity**: [`Entity`] is a shared attribute bag that tracks pre-edit
//!   values, validates on change and syncs through a
//!   [`SyncClient`](tether_sync::SyncClient).
//! - **Set**: [`EntitySet`] keeps entities ordered by an optional
//!   [`Comparator`] and owns their membership.
//! - **Validation**: rules are evaluated by a [`RuleEvaluator`], by default
//!   the [`StandardEvaluator`].
//!
//! # Example
//!
//! ```
//! use tether_model::{Entity, EntitySchema, FieldSpec};
//!
//! let schema = EntitySchema::new()
//!     .with_field("name", FieldSpec::required_string().title("Name"))
//!     .shared();
//! let entity = Entity::new(schema);
//! assert!(entity.set("name", "").is_ok());
//! assert!(!entity.is_valid());
//! assert_eq!(entity.message("name"), "Name is required");
//! ```

pub mod encoding;
mod entity;
mod error;
mod handler;
mod scheduler;
mod schema;
mod set;
mod validate;

pub use entity::Entity;
pub use error::{ModelError, ModelResult};
pub use handler::EntityHandler;
pub use schema::{Encoding, EntitySchema, Equals, FieldSpec, Format, Rule, RuleType, ValidationPolicy};
pub use set::{Comparator, EntityFactory, EntitySet, Item, Matcher};
pub use validate::{format_error_message, ErrorKind, FormatCheck, Formats, RuleEvaluator, StandardEvaluator};
