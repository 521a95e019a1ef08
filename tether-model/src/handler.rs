use crate::Entity;
use tether_core::Attributes;
use tether_sync::{Operation, SyncOptions};

/// Optional hooks for entity types that need custom parsing or addressing
/// beyond what [`EntitySchema`](crate::EntitySchema) declares.
///
/// Most entity types do NOT need this. Implement it if you need:
/// - Reshaping inbound records (e.g., flattening an envelope)
/// - URLs that do not follow `<set url>/<id>`
pub trait EntityHandler: Send + Sync {
    /// Called on every inbound record: construction data and fetch/save
    /// responses, before field decoding and merging.
    fn parse(&self, data: Attributes) -> Attributes {
        data
    }

    /// URL of `entity` for `operation`. `None` falls back to the default
    /// resolution.
    fn url(&self, entity: &Entity, operation: Operation, options: &SyncOptions) -> Option<String> {
        let _ = (entity, operation, options);
        None
    }
}
