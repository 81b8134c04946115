use std::sync::Arc;

use crate::collection::Collection;
use crate::middleware::Command;
use crate::pipeline::{CommandResult, Failure, Outcome, UpsertAction};
use crate::Attributes;

/// Terminal command of every middleware chain: create or update one entity
///
/// The record is matched on `attribute_names`. When an entity matches, the
/// record attributes are merged over it and the result is stored in place;
/// otherwise a new entity is inserted.
#[derive(Debug, Clone)]
pub struct Upsert {
    collection: Arc<dyn Collection>,
    attribute_names: Vec<String>,
}

impl Upsert {
    pub fn new(collection: Arc<dyn Collection>, attribute_names: Vec<String>) -> Self {
        Self {
            collection,
            attribute_names,
        }
    }

    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    /// Criteria built from the record, or `None` if it lacks a key attribute
    fn criteria(&self, attributes: &Attributes) -> Option<Attributes> {
        self.attribute_names
            .iter()
            .map(|name| Some((name.clone(), attributes.get(name)?.clone())))
            .collect()
    }

    fn create(&self, attributes: Attributes) -> CommandResult {
        self.collection
            .insert(attributes)
            .map(|entity| Outcome::new(UpsertAction::Create, entity))
            .map_err(|error| Failure::new(error).with_action(UpsertAction::Create))
    }

    fn update(&self, criteria: &Attributes, entity: Attributes, attributes: Attributes) -> CommandResult {
        let mut merged = entity;
        merged.extend(attributes);

        self.collection
            .update(criteria, merged)
            .map(|entity| Outcome::new(UpsertAction::Update, entity))
            .map_err(|error| Failure::new(error).with_action(UpsertAction::Update))
    }
}

impl Command for Upsert {
    fn call(&self, attributes: Attributes) -> CommandResult {
        let Some(criteria) = self.criteria(&attributes) else {
            return self.create(attributes);
        };

        let existing = self
            .collection
            .find_matching(&criteria)
            .map_err(|error| Failure::new(error).with_action(UpsertAction::CreateOrUpdate))?;

        match existing {
            Some(entity) => self.update(&criteria, entity, attributes),
            None => self.create(attributes),
        }
    }
}
