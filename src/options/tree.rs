use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::pipeline::LoaderError;

/// Raw options as read from `_options.yml` files, in declaration order
pub type OptionsTree = Map<String, Value>;

/// Reserved key holding middleware declarations
pub const MIDDLEWARE_KEY: &str = "middleware";

/// Reserved key naming the attribute(s) used to match existing entities
pub const FIND_BY_KEY: &str = "find_by";

/// Reserved key naming middleware libraries to load first
pub const REQUIRE_KEY: &str = "require";

/// Per-attribute key that disables whitespace collapsing
pub const MULTILINE_KEY: &str = "multiline";

/// Default attribute used to match existing entities
pub const DEFAULT_FIND_BY: &str = "id";

/// Shallow merge of two options layers
///
/// Every top-level key in `local` replaces the value in `global`. Nested
/// attribute options are replaced wholesale, never merged.
pub fn merge(global: OptionsTree, local: OptionsTree) -> OptionsTree {
    let mut merged = global;
    for (key, value) in local {
        merged.insert(key, value);
    }
    merged
}

/// Attribute(s) used to match a record against existing entities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FindBy {
    One(String),
    Many(Vec<String>),
}

impl Default for FindBy {
    fn default() -> Self {
        FindBy::One(DEFAULT_FIND_BY.to_string())
    }
}

impl FindBy {
    /// Read the `find_by` key of an options tree, defaulting to "id"
    pub fn from_options(options: &OptionsTree) -> Result<Self, LoaderError> {
        match options.get(FIND_BY_KEY) {
            None | Some(Value::Null) => Ok(FindBy::default()),
            Some(value) => {
                let find_by: FindBy =
                    serde_json::from_value(value.clone()).map_err(|_| LoaderError::InvalidOption {
                        key: FIND_BY_KEY.to_string(),
                        value: value.clone(),
                        message: "expected an attribute name or a list of attribute names".to_string(),
                    })?;

                if find_by.keys().is_empty() {
                    return Err(LoaderError::InvalidOption {
                        key: FIND_BY_KEY.to_string(),
                        value: value.clone(),
                        message: "expected at least one attribute name".to_string(),
                    });
                }

                Ok(find_by)
            }
        }
    }

    pub fn keys(&self) -> Vec<String> {
        match self {
            FindBy::One(key) => vec![key.clone()],
            FindBy::Many(keys) => keys.clone(),
        }
    }
}

/// Library name(s) listed under `require`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Require {
    One(String),
    Many(Vec<String>),
}

impl Require {
    /// Interpret a raw `require` value
    pub fn from_value(value: Value) -> Result<Self, LoaderError> {
        serde_json::from_value(value.clone()).map_err(|_| LoaderError::InvalidOption {
            key: REQUIRE_KEY.to_string(),
            value,
            message: "expected a library name or a list of library names".to_string(),
        })
    }

    pub fn libraries(&self) -> Vec<String> {
        match self {
            Require::One(library) => vec![library.clone()],
            Require::Many(libraries) => libraries.clone(),
        }
    }
}

/// Typed view of the options for a single attribute
///
/// `extra` holds every key except `middleware`, unchanged, so the attribute
/// options can be handed back to callers with the middleware stripped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeOptions {
    pub multiline: bool,
    pub middleware: Option<Value>,
    pub extra: OptionsTree,
}

impl AttributeOptions {
    /// Returns `None` when the value is not a mapping
    pub fn from_value(value: &Value) -> Option<Self> {
        let mut extra = value.as_object()?.clone();
        let middleware = extra.remove(MIDDLEWARE_KEY);
        let multiline = extra.get(MULTILINE_KEY).is_some_and(is_truthy);

        Some(Self {
            multiline,
            middleware,
            extra,
        })
    }

    /// Whether the attribute declared a `middleware` key (even an empty one)
    pub fn has_middleware(&self) -> bool {
        self.middleware.is_some()
    }
}

/// Whether `attribute_name` is configured with `multiline: true`
pub fn is_multiline(options: &OptionsTree, attribute_name: &str) -> bool {
    options
        .get(attribute_name)
        .and_then(AttributeOptions::from_value)
        .is_some_and(|attribute_options| attribute_options.multiline)
}

fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(value: Value) -> OptionsTree {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_merge_is_shallow_local_over_global() {
        let merged = merge(tree(json!({"a": 1, "b": 2})), tree(json!({"b": 3, "c": 4})));
        assert_eq!(Value::Object(merged), json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn test_merge_does_not_deep_merge_attributes() {
        let global = tree(json!({"title": {"multiline": true, "middleware": "Titleize"}}));
        let local = tree(json!({"title": {"multiline": false}}));

        let merged = merge(global, local);
        assert_eq!(Value::Object(merged), json!({"title": {"multiline": false}}));
    }

    #[test]
    fn test_find_by_defaults_to_id() {
        assert_eq!(FindBy::from_options(&tree(json!({}))).unwrap().keys(), vec!["id"]);
    }

    #[test]
    fn test_find_by_one_or_many() {
        let one = FindBy::from_options(&tree(json!({"find_by": "slug"}))).unwrap();
        assert_eq!(one, FindBy::One("slug".to_string()));

        let many = FindBy::from_options(&tree(json!({"find_by": ["name", "year"]}))).unwrap();
        assert_eq!(many.keys(), vec!["name", "year"]);
    }

    #[test]
    fn test_find_by_invalid() {
        let result = FindBy::from_options(&tree(json!({"find_by": 12})));
        assert!(matches!(result, Err(LoaderError::InvalidOption { .. })));

        let result = FindBy::from_options(&tree(json!({"find_by": []})));
        assert!(matches!(result, Err(LoaderError::InvalidOption { .. })));
    }

    #[test]
    fn test_require_values() {
        assert_eq!(Require::from_value(json!("lib")).unwrap().libraries(), vec!["lib"]);
        assert_eq!(
            Require::from_value(json!(["a", "b"])).unwrap().libraries(),
            vec!["a", "b"]
        );
        assert!(Require::from_value(json!({"a": 1})).is_err());
    }

    #[test]
    fn test_attribute_options() {
        let options = AttributeOptions::from_value(&json!({
            "multiline": true,
            "middleware": "Titleize",
            "label": "Review"
        }))
        .unwrap();

        assert!(options.multiline);
        assert!(options.has_middleware());
        assert_eq!(Value::Object(options.extra), json!({"multiline": true, "label": "Review"}));

        assert!(AttributeOptions::from_value(&json!("plain")).is_none());
    }

    #[test]
    fn test_is_multiline() {
        let options = tree(json!({"review": {"multiline": true}, "title": {"multiline": false}, "name": "x"}));
        assert!(is_multiline(&options, "review"));
        assert!(!is_multiline(&options, "title"));
        assert!(!is_multiline(&options, "name"));
        assert!(!is_multiline(&options, "missing"));
    }
}
