/// Middleware wrapping the upsert of a single record
///
/// A middleware receives the record attributes and the next command in the
/// chain. It may rewrite the attributes, short-circuit with a failure, or
/// post-process the outcome returned by `next`.

mod find_association;
mod registry;
mod transform;

pub use find_association::{FindAssociation, FindAssociationOptions};
pub use registry::{MiddlewareKind, MiddlewareRegistry};
pub use transform::{AddDefaults, EncryptPassword, GenerateSlug, Titleize};

use std::fmt;
use std::sync::Arc;

use crate::collection::Repository;
use crate::options::OptionsTree;
use crate::pipeline::CommandResult;
use crate::Attributes;

/// Anything that can be invoked with a record: the terminal upsert or a
/// middleware already wrapping its own next command
pub trait Command {
    fn call(&self, attributes: Attributes) -> CommandResult;
}

impl<F> Command for F
where
    F: Fn(Attributes) -> CommandResult,
{
    fn call(&self, attributes: Attributes) -> CommandResult {
        self(attributes)
    }
}

/// A composable step around the next command
pub trait Middleware: fmt::Debug + Send + Sync {
    /// Name used in logs and diagnostics
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Process a record. The default passes the attributes through unchanged
    /// and returns the next command's result verbatim.
    fn call(&self, next: &dyn Command, attributes: Attributes) -> CommandResult {
        next.call(attributes)
    }
}

/// Constructor arguments for a middleware instance
#[derive(Debug, Clone, Default)]
pub struct MiddlewareArgs {
    pub attribute_name: Option<String>,
    pub options: OptionsTree,
    pub repository: Option<Arc<dyn Repository>>,
}

/// Shared state of entity-scoped middleware: options and repository
#[derive(Debug, Clone, Default)]
pub struct EntityScope {
    options: OptionsTree,
    repository: Option<Arc<dyn Repository>>,
}

impl EntityScope {
    pub fn new(options: OptionsTree, repository: Option<Arc<dyn Repository>>) -> Self {
        Self {
            options,
            repository,
        }
    }

    pub fn options(&self) -> &OptionsTree {
        &self.options
    }

    pub fn repository(&self) -> Option<&Arc<dyn Repository>> {
        self.repository.as_ref()
    }
}

/// Shared state of attribute-scoped middleware
#[derive(Debug, Clone)]
pub struct AttributeScope {
    attribute_name: String,
    entity: EntityScope,
}

impl AttributeScope {
    /// Fails unless the attribute name is a non-empty string
    pub fn new(
        attribute_name: impl Into<String>,
        options: OptionsTree,
        repository: Option<Arc<dyn Repository>>,
    ) -> Result<Self, String> {
        let attribute_name = attribute_name.into();
        if attribute_name.is_empty() {
            return Err(format!("invalid attribute name {attribute_name:?}"));
        }

        Ok(Self {
            attribute_name,
            entity: EntityScope::new(options, repository),
        })
    }

    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }

    pub fn options(&self) -> &OptionsTree {
        self.entity.options()
    }

    pub fn repository(&self) -> Option<&Arc<dyn Repository>> {
        self.entity.repository()
    }
}

struct Link {
    middleware: Arc<dyn Middleware>,
    next: Box<dyn Command>,
}

impl Command for Link {
    fn call(&self, attributes: Attributes) -> CommandResult {
        self.middleware.call(self.next.as_ref(), attributes)
    }
}

/// Wrap `command` in the middleware, first-declared outermost
///
/// The first middleware sees the raw attributes first; the last one calls
/// `command` directly.
pub fn apply(command: Box<dyn Command>, middleware: &[Arc<dyn Middleware>]) -> Box<dyn Command> {
    middleware.iter().rev().fold(command, |next, middleware| {
        Box::new(Link {
            middleware: middleware.clone(),
            next,
        })
    })
}
