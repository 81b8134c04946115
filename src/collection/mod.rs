/// Collection and repository seams
///
/// The loader never talks to a concrete store. Every persistence operation
/// goes through the `Collection` trait, and cross-collection lookups go
/// through a `Repository`. Implementations can be swapped for a real
/// database backend or the in-memory store in `memory`.

mod memory;

pub use memory::{MemoryCollection, MemoryRepository};

use std::sync::Arc;

use crate::pipeline::LoaderError;
use crate::{Attributes, Entity};

/// A named, queryable store of entities
pub trait Collection: Send + Sync {
    /// Human-readable, pluralized name (e.g. "users")
    fn collection_name(&self) -> &str;

    /// Namespaced identifier used for repository lookups (e.g. "authentication/users")
    fn qualified_name(&self) -> &str;

    /// Find the first entity whose fields equal every criterion
    fn find_matching(&self, criteria: &Attributes) -> Result<Option<Entity>, LoaderError>;

    /// Insert a new entity
    fn insert(&self, entity: Entity) -> Result<Entity, LoaderError>;

    /// Replace the entity identified by `key` with `entity`
    fn update(&self, key: &Attributes, entity: Entity) -> Result<Entity, LoaderError>;
}

/// Registry of collections, keyed by qualified name
pub trait Repository: Send + Sync {
    fn contains(&self, qualified_name: &str) -> bool;

    fn get(&self, qualified_name: &str) -> Option<Arc<dyn Collection>>;

    /// Qualified names of every registered collection
    fn keys(&self) -> Vec<String>;
}

impl std::fmt::Debug for dyn Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("collection_name", &self.collection_name())
            .field("qualified_name", &self.qualified_name())
            .finish()
    }
}

impl std::fmt::Debug for dyn Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository").field("keys", &self.keys()).finish()
    }
}
