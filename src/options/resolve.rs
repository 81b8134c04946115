use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::spec::MiddlewareSpec;
use super::tree::{AttributeOptions, FindBy, OptionsTree, Require, MIDDLEWARE_KEY, REQUIRE_KEY};
use crate::collection::Repository;
use crate::middleware::{Middleware, MiddlewareRegistry};
use crate::pipeline::LoaderError;

/// Options after middleware resolution
///
/// `options` holds no `middleware` key. The built instances live only in
/// `middleware`, so the tree stays plain data.
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    /// Options with every `middleware` key and the `require` key removed
    pub options: OptionsTree,
    /// Attribute(s) used to match existing entities
    pub find_by: FindBy,
    /// Entity-scoped middleware first, then each attribute group in option order
    pub middleware: Vec<Arc<dyn Middleware>>,
}

impl ResolvedOptions {
    pub fn find_by_keys(&self) -> Vec<String> {
        self.find_by.keys()
    }
}

/// Walks an options tree and instantiates its middleware declarations
pub struct OptionsResolver<'a> {
    registry: &'a MiddlewareRegistry,
    repository: Option<Arc<dyn Repository>>,
}

impl<'a> OptionsResolver<'a> {
    pub fn new(registry: &'a MiddlewareRegistry, repository: Option<Arc<dyn Repository>>) -> Self {
        Self {
            registry,
            repository,
        }
    }

    /// Resolve the options for one load
    ///
    /// `require` is processed first so that required libraries can register
    /// the middleware named later in the same tree.
    pub fn resolve(&self, options: OptionsTree) -> Result<ResolvedOptions, LoaderError> {
        let mut options = options;

        if let Some(require) = options.remove(REQUIRE_KEY) {
            for library in Require::from_value(require)?.libraries() {
                self.registry.require(&library)?;
            }
        }

        let declaration = options.remove(MIDDLEWARE_KEY).unwrap_or(Value::Null);
        let mut middleware = self.build_all(MiddlewareSpec::parse(declaration, None))?;

        let mut resolved = OptionsTree::new();
        for (attribute_name, value) in options {
            let value = match AttributeOptions::from_value(&value) {
                Some(attribute_options) if attribute_options.has_middleware() => {
                    let declaration = attribute_options.middleware.unwrap_or(Value::Null);
                    let specs = MiddlewareSpec::parse(declaration, Some(&attribute_name));
                    middleware.extend(self.build_all(specs)?);
                    Value::Object(attribute_options.extra)
                }
                _ => value,
            };
            resolved.insert(attribute_name, value);
        }

        let find_by = FindBy::from_options(&resolved)?;

        debug!(
            middleware = middleware.len(),
            find_by = ?find_by.keys(),
            "resolved options"
        );

        Ok(ResolvedOptions {
            options: resolved,
            find_by,
            middleware,
        })
    }

    fn build_all(&self, specs: Vec<MiddlewareSpec>) -> Result<Vec<Arc<dyn Middleware>>, LoaderError> {
        specs.into_iter().map(|spec| self.build(spec)).collect()
    }

    fn build(&self, spec: MiddlewareSpec) -> Result<Arc<dyn Middleware>, LoaderError> {
        let MiddlewareSpec {
            class_name,
            options,
            attribute_name,
        } = spec;

        let options = match options {
            None => OptionsTree::new(),
            Some(Value::Object(options)) => options,
            Some(invalid) => {
                return Err(LoaderError::middleware(
                    class_name,
                    attribute_name.as_deref(),
                    Some(invalid),
                    Some("invalid options hash".to_string()),
                ));
            }
        };

        let Some(name) = class_name.as_str() else {
            return Err(LoaderError::middleware(
                class_name,
                attribute_name.as_deref(),
                Some(Value::Object(options)),
                None,
            ));
        };

        self.registry
            .build(name, attribute_name.as_deref(), options.clone(), self.repository.clone())
            .map_err(|message| {
                LoaderError::middleware(
                    class_name.clone(),
                    attribute_name.as_deref(),
                    Some(Value::Object(options)),
                    Some(message),
                )
            })
    }
}
