use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::{
    AddDefaults, AttributeScope, EncryptPassword, EntityScope, FindAssociation, GenerateSlug,
    Middleware, MiddlewareArgs, Titleize,
};
use crate::collection::Repository;
use crate::options::OptionsTree;
use crate::pipeline::LoaderError;

type Factory = Arc<dyn Fn(MiddlewareArgs) -> Result<Arc<dyn Middleware>, String> + Send + Sync>;

type Installer = Arc<dyn Fn(&MiddlewareRegistry) + Send + Sync>;

/// How a registered middleware expects to be constructed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiddlewareKind {
    /// Constructed without an attribute name
    Entity,
    /// Constructed with an attribute name. `default_attribute` is used when
    /// the middleware is declared at entity level.
    Attribute { default_attribute: Option<String> },
}

#[derive(Clone)]
struct Registration {
    kind: MiddlewareKind,
    factory: Factory,
}

/// Name-to-constructor table for middleware declared in options files
///
/// Libraries are named installers that register more middleware. An options
/// file pulls them in with `require`; each is installed at most once.
pub struct MiddlewareRegistry {
    middleware: RwLock<BTreeMap<String, Registration>>,
    libraries: RwLock<BTreeMap<String, Installer>>,
    required: RwLock<BTreeSet<String>>,
}

impl MiddlewareRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            middleware: RwLock::new(BTreeMap::new()),
            libraries: RwLock::new(BTreeMap::new()),
            required: RwLock::new(BTreeSet::new()),
        }
    }

    /// Create a registry with the bundled middleware
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_attribute("FindAssociation", FindAssociation::new);
        registry.register_attribute("Titleize", Titleize::new);
        registry.register_attribute("GenerateSlug", GenerateSlug::new);
        registry.register_entity("EncryptPassword", EncryptPassword::new);
        registry.register_entity("AddDefaults", AddDefaults::new);
        registry
    }

    /// Register an entity-scoped middleware
    pub fn register_entity<M, F>(&self, name: impl Into<String>, factory: F)
    where
        M: Middleware + 'static,
        F: Fn(EntityScope) -> Result<M, String> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |args: MiddlewareArgs| {
            let middleware = factory(EntityScope::new(args.options, args.repository))?;
            Ok(Arc::new(middleware) as Arc<dyn Middleware>)
        });
        self.insert(name.into(), MiddlewareKind::Entity, factory);
    }

    /// Register an attribute-scoped middleware
    pub fn register_attribute<M, F>(&self, name: impl Into<String>, factory: F)
    where
        M: Middleware + 'static,
        F: Fn(AttributeScope) -> Result<M, String> + Send + Sync + 'static,
    {
        self.insert_attribute(name.into(), None, factory);
    }

    /// Register an attribute-scoped middleware that targets
    /// `default_attribute` when declared at entity level
    pub fn register_attribute_for<M, F>(
        &self,
        name: impl Into<String>,
        default_attribute: impl Into<String>,
        factory: F,
    ) where
        M: Middleware + 'static,
        F: Fn(AttributeScope) -> Result<M, String> + Send + Sync + 'static,
    {
        self.insert_attribute(name.into(), Some(default_attribute.into()), factory);
    }

    /// Register a library that `require` can install
    pub fn register_library<F>(&self, name: impl Into<String>, installer: F)
    where
        F: Fn(&MiddlewareRegistry) + Send + Sync + 'static,
    {
        self.libraries.write().insert(name.into(), Arc::new(installer));
    }

    /// Install a library unless it has already been installed
    pub fn require(&self, library: &str) -> Result<(), LoaderError> {
        if self.required.read().contains(library) {
            return Ok(());
        }

        let installer = self
            .libraries
            .read()
            .get(library)
            .cloned()
            .ok_or_else(|| LoaderError::Require {
                library: library.to_string(),
                message: None,
            })?;

        self.required.write().insert(library.to_string());
        debug!(library, "installing middleware library");
        installer(self);

        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.middleware.read().contains_key(name)
    }

    /// Registered middleware names, sorted
    pub fn names(&self) -> Vec<String> {
        self.middleware.read().keys().cloned().collect()
    }

    pub fn kind(&self, name: &str) -> Option<MiddlewareKind> {
        self.middleware
            .read()
            .get(name)
            .map(|registration| registration.kind.clone())
    }

    /// Construct a middleware instance by name
    ///
    /// The error is the bare reason; callers wrap it with the declaration
    /// that failed.
    pub fn build(
        &self,
        name: &str,
        attribute_name: Option<&str>,
        options: OptionsTree,
        repository: Option<Arc<dyn Repository>>,
    ) -> Result<Arc<dyn Middleware>, String> {
        let Registration { kind, factory } = self
            .middleware
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| format!("unknown middleware {name:?}"))?;

        let attribute_name = match (kind, attribute_name) {
            (MiddlewareKind::Entity, None) => None,
            (MiddlewareKind::Entity, Some(_)) => {
                return Err(arity_message(1, 0));
            }
            (MiddlewareKind::Attribute { .. }, Some(attribute_name)) => {
                Some(attribute_name.to_string())
            }
            (MiddlewareKind::Attribute { default_attribute }, None) => {
                Some(default_attribute.ok_or_else(|| arity_message(0, 1))?)
            }
        };

        factory(MiddlewareArgs {
            attribute_name,
            options,
            repository,
        })
    }

    fn insert_attribute<M, F>(&self, name: String, default_attribute: Option<String>, factory: F)
    where
        M: Middleware + 'static,
        F: Fn(AttributeScope) -> Result<M, String> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |args: MiddlewareArgs| {
            let attribute_name = args.attribute_name.unwrap_or_default();
            let scope = AttributeScope::new(attribute_name, args.options, args.repository)?;
            let middleware = factory(scope)?;
            Ok(Arc::new(middleware) as Arc<dyn Middleware>)
        });
        self.insert(name, MiddlewareKind::Attribute { default_attribute }, factory);
    }

    fn insert(&self, name: String, kind: MiddlewareKind, factory: Factory) {
        self.middleware
            .write()
            .insert(name, Registration { kind, factory });
    }
}

impl Default for MiddlewareRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("middleware", &self.names())
            .field("libraries", &self.libraries.read().keys().collect::<Vec<_>>())
            .field("required", &*self.required.read())
            .finish()
    }
}

fn arity_message(given: usize, expected: usize) -> String {
    format!("wrong number of arguments (given {given}, expected {expected})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::MemoryRepository;
    use crate::middleware::Command;
    use crate::pipeline::{CommandResult, Outcome, UpsertAction};
    use crate::Attributes;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Named {
        attribute_name: Option<String>,
    }

    impl Middleware for Named {}

    fn options(value: serde_json::Value) -> OptionsTree {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = MiddlewareRegistry::with_builtins();

        assert_eq!(
            registry.names(),
            vec!["AddDefaults", "EncryptPassword", "FindAssociation", "GenerateSlug", "Titleize"]
        );
        assert_eq!(registry.kind("AddDefaults"), Some(MiddlewareKind::Entity));
        assert_eq!(
            registry.kind("Titleize"),
            Some(MiddlewareKind::Attribute {
                default_attribute: None
            })
        );
    }

    #[test]
    fn test_build_unknown_middleware() {
        let registry = MiddlewareRegistry::new();
        let result = registry.build("Spec::Missing", None, OptionsTree::new(), None);

        assert_eq!(result.unwrap_err(), "unknown middleware \"Spec::Missing\"");
    }

    #[test]
    fn test_build_checks_arity() {
        let registry = MiddlewareRegistry::with_builtins();

        let result = registry.build("AddDefaults", Some("name"), OptionsTree::new(), None);
        assert_eq!(result.unwrap_err(), "wrong number of arguments (given 1, expected 0)");

        let result = registry.build("Titleize", None, OptionsTree::new(), None);
        assert_eq!(result.unwrap_err(), "wrong number of arguments (given 0, expected 1)");
    }

    #[test]
    fn test_build_rejects_empty_attribute_name() {
        let registry = MiddlewareRegistry::with_builtins();
        let result = registry.build("Titleize", Some(""), OptionsTree::new(), None);

        assert_eq!(result.unwrap_err(), "invalid attribute name \"\"");
    }

    #[test]
    fn test_build_uses_default_attribute() {
        let registry = MiddlewareRegistry::new();
        registry.register_attribute_for("Named", "name", |scope: AttributeScope| {
            Ok(Named {
                attribute_name: Some(scope.attribute_name().to_string()),
            })
        });

        let middleware = registry.build("Named", None, OptionsTree::new(), None).unwrap();
        assert_eq!(
            format!("{middleware:?}"),
            "Named { attribute_name: Some(\"name\") }"
        );

        let middleware = registry.build("Named", Some("title"), OptionsTree::new(), None).unwrap();
        assert_eq!(
            format!("{middleware:?}"),
            "Named { attribute_name: Some(\"title\") }"
        );
    }

    #[test]
    fn test_build_passes_options_and_repository() {
        let registry = MiddlewareRegistry::new();
        registry.register_entity("Checked", |scope: EntityScope| {
            if scope.repository().is_none() {
                return Err("missing keyword: repository".to_string());
            }
            if scope.options().get("flag") != Some(&json!(true)) {
                return Err("missing flag".to_string());
            }
            Ok(Named {
                attribute_name: None,
            })
        });

        let repository: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let result = registry.build(
            "Checked",
            None,
            options(json!({"flag": true})),
            Some(repository),
        );
        assert!(result.is_ok());

        let result = registry.build("Checked", None, options(json!({"flag": true})), None);
        assert_eq!(result.unwrap_err(), "missing keyword: repository");
    }

    #[test]
    fn test_built_middleware_defaults_to_pass_through() {
        let registry = MiddlewareRegistry::new();
        registry.register_entity("Named", |_scope: EntityScope| {
            Ok(Named {
                attribute_name: None,
            })
        });

        let middleware = registry.build("Named", None, OptionsTree::new(), None).unwrap();
        let next = |attributes: Attributes| -> CommandResult {
            Ok(Outcome::new(UpsertAction::Create, attributes))
        };
        let attributes = options(json!({"name": "Red"}));

        let outcome = middleware.call(&next as &dyn Command, attributes.clone()).unwrap();
        assert_eq!(outcome.entity, attributes);
        assert_eq!(middleware.name(), "Named");
    }

    #[test]
    fn test_require_installs_library_once() {
        let registry = MiddlewareRegistry::new();
        let installs = Arc::new(AtomicUsize::new(0));
        let counter = installs.clone();

        registry.register_library("support/middleware", move |registry| {
            counter.fetch_add(1, Ordering::SeqCst);
            registry.register_entity("Spec::Named", |_scope: EntityScope| {
                Ok(Named {
                    attribute_name: None,
                })
            });
        });

        assert!(!registry.contains("Spec::Named"));
        registry.require("support/middleware").unwrap();
        registry.require("support/middleware").unwrap();

        assert!(registry.contains("Spec::Named"));
        assert_eq!(installs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_require_unknown_library() {
        let registry = MiddlewareRegistry::new();
        let result = registry.require("missing/library");

        assert_eq!(
            result,
            Err(LoaderError::Require {
                library: "missing/library".to_string(),
                message: None,
            })
        );
    }
}
