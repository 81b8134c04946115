use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::debug;

use super::{AttributeScope, Command, Middleware};
use crate::collection::{Collection, Repository};
use crate::options::DEFAULT_FIND_BY;
use crate::pipeline::{CommandResult, Failure, LoaderError};
use crate::text::pluralize;
use crate::{Attributes, Entity};

/// Options accepted by `FindAssociation`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FindAssociationOptions {
    /// Attribute of the associated entity matched against the record value
    pub find_by: String,
    /// When true, a missing association becomes `null` instead of a failure
    pub optional: bool,
    /// Collection to query; defaults to the pluralized attribute name
    pub qualified_name: Option<String>,
}

impl Default for FindAssociationOptions {
    fn default() -> Self {
        Self {
            find_by: DEFAULT_FIND_BY.to_string(),
            optional: false,
            qualified_name: None,
        }
    }
}

/// Replaces an attribute value with the entity it refers to
///
/// ```yaml
/// author:
///   middleware:
///     FindAssociation:
///       find_by: name
///       qualified_name: authors
/// ```
#[derive(Debug)]
pub struct FindAssociation {
    attribute_name: String,
    find_by: String,
    optional: bool,
    qualified_name: String,
    repository: Arc<dyn Repository>,
    collection: OnceLock<Arc<dyn Collection>>,
}

impl FindAssociation {
    pub fn new(scope: AttributeScope) -> Result<Self, String> {
        let repository = scope
            .repository()
            .cloned()
            .ok_or_else(|| "missing keyword: repository".to_string())?;

        let options: FindAssociationOptions =
            serde_json::from_value(Value::Object(scope.options().clone()))
                .map_err(|e| e.to_string())?;

        let qualified_name = options
            .qualified_name
            .unwrap_or_else(|| pluralize(scope.attribute_name()));

        Ok(Self {
            attribute_name: scope.attribute_name().to_string(),
            find_by: options.find_by,
            optional: options.optional,
            qualified_name,
            repository,
            collection: OnceLock::new(),
        })
    }

    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }

    pub fn find_by(&self) -> &str {
        &self.find_by
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    fn collection(&self) -> Result<Arc<dyn Collection>, LoaderError> {
        if let Some(collection) = self.collection.get() {
            return Ok(collection.clone());
        }

        let collection =
            self.repository
                .get(&self.qualified_name)
                .ok_or_else(|| LoaderError::Collection {
                    qualified_name: self.qualified_name.clone(),
                    collections: self.repository.keys(),
                })?;

        Ok(self.collection.get_or_init(|| collection).clone())
    }

    /// Returns `None` only for a missing optional association
    fn find_association(&self, value: Value) -> Result<Option<Entity>, LoaderError> {
        // A missing collection is a configuration error, even when optional.
        let collection = self.collection()?;

        let mut criteria = Attributes::new();
        criteria.insert(self.find_by.clone(), value);

        let found = collection
            .find_matching(&criteria)
            .and_then(|entity| {
                entity.ok_or_else(|| LoaderError::NotFound {
                    collection_name: collection.collection_name().to_string(),
                    attributes: criteria.clone(),
                })
            });

        match found {
            Ok(entity) => Ok(Some(entity)),
            Err(error) if self.optional => {
                debug!(
                    attribute = %self.attribute_name,
                    error = %error,
                    "optional association not found"
                );
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}

impl Middleware for FindAssociation {
    fn call(&self, next: &dyn Command, mut attributes: Attributes) -> CommandResult {
        let value = attributes
            .get(&self.attribute_name)
            .cloned()
            .unwrap_or(Value::Null);

        let association = self.find_association(value).map_err(Failure::new)?;
        attributes.insert(
            self.attribute_name.clone(),
            association.map(Value::Object).unwrap_or(Value::Null),
        );

        next.call(attributes)
    }
}
