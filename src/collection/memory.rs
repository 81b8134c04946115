use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Collection, Repository};
use crate::pipeline::LoaderError;
use crate::{Attributes, Entity};

/// In-memory collection
///
/// Entities are kept in insertion order. Matching is plain equality on every
/// criterion, with `null` also matching a missing field.
#[derive(Debug)]
pub struct MemoryCollection {
    collection_name: String,
    qualified_name: String,
    entities: Mutex<Vec<Entity>>,
}

impl MemoryCollection {
    /// Create an empty collection whose qualified name equals its name
    pub fn new(collection_name: impl Into<String>) -> Self {
        let collection_name = collection_name.into();
        Self {
            qualified_name: collection_name.clone(),
            collection_name,
            entities: Mutex::new(Vec::new()),
        }
    }

    /// Set a namespaced qualified name, e.g. "authentication/users"
    pub fn with_qualified_name(mut self, qualified_name: impl Into<String>) -> Self {
        self.qualified_name = qualified_name.into();
        self
    }

    /// Seed the collection with entities
    pub fn with_entities(self, entities: Vec<Entity>) -> Self {
        *self.entities.lock() = entities;
        self
    }

    /// Snapshot of every entity, in insertion order
    pub fn entities(&self) -> Vec<Entity> {
        self.entities.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entities.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.lock().is_empty()
    }

    fn matches(entity: &Entity, criteria: &Attributes) -> bool {
        criteria.iter().all(|(key, expected)| match (entity.get(key), expected) {
            (Some(actual), expected) => actual == expected,
            (None, Value::Null) => true,
            _ => false,
        })
    }
}

impl Collection for MemoryCollection {
    fn collection_name(&self) -> &str {
        &self.collection_name
    }

    fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    fn find_matching(&self, criteria: &Attributes) -> Result<Option<Entity>, LoaderError> {
        let entities = self.entities.lock();
        Ok(entities
            .iter()
            .find(|entity| Self::matches(entity, criteria))
            .cloned())
    }

    fn insert(&self, entity: Entity) -> Result<Entity, LoaderError> {
        self.entities.lock().push(entity.clone());
        Ok(entity)
    }

    fn update(&self, key: &Attributes, entity: Entity) -> Result<Entity, LoaderError> {
        let mut entities = self.entities.lock();

        match entities.iter_mut().find(|existing| Self::matches(existing, key)) {
            Some(existing) => {
                *existing = entity.clone();
                Ok(entity)
            }
            None => Err(LoaderError::NotFound {
                collection_name: self.collection_name.clone(),
                attributes: key.clone(),
            }),
        }
    }
}

/// In-memory repository
#[derive(Default)]
pub struct MemoryRepository {
    collections: RwLock<BTreeMap<String, Arc<dyn Collection>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collection under its qualified name
    pub fn add(&self, collection: Arc<dyn Collection>) {
        self.collections
            .write()
            .insert(collection.qualified_name().to_string(), collection);
    }

    /// Create, register and return an empty collection
    ///
    /// The collection name is the last segment of the qualified name.
    pub fn build(&self, qualified_name: &str) -> Arc<MemoryCollection> {
        let collection_name = qualified_name
            .rsplit('/')
            .next()
            .unwrap_or(qualified_name);
        let collection = Arc::new(
            MemoryCollection::new(collection_name).with_qualified_name(qualified_name),
        );
        self.add(collection.clone());
        collection
    }
}

impl std::fmt::Debug for MemoryRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRepository")
            .field("collections", &self.keys())
            .finish()
    }
}

impl Repository for MemoryRepository {
    fn contains(&self, qualified_name: &str) -> bool {
        self.collections.read().contains_key(qualified_name)
    }

    fn get(&self, qualified_name: &str) -> Option<Arc<dyn Collection>> {
        self.collections.read().get(qualified_name).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }
}
