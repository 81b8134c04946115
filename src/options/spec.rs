use serde_json::Value;

/// Declarative description of one middleware instance
///
/// Three declaration shapes are accepted:
///
/// ```yaml
/// middleware: Titleize                 # bare name
/// middleware: [Titleize, GenerateSlug] # several instances, no options
/// middleware:                          # name => options
///   FindAssociation:
///     find_by: name
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MiddlewareSpec {
    /// Registered middleware name; not validated until construction
    pub class_name: Value,
    /// Constructor options; only present for the `name => options` shape
    pub options: Option<Value>,
    /// Target attribute for attribute-scoped declarations
    pub attribute_name: Option<String>,
}

impl MiddlewareSpec {
    /// Parse a `middleware` declaration into specs, in declaration order
    pub fn parse(declaration: Value, attribute_name: Option<&str>) -> Vec<MiddlewareSpec> {
        let spec = |class_name: Value, options: Option<Value>| MiddlewareSpec {
            class_name,
            options,
            attribute_name: attribute_name.map(str::to_string),
        };

        match declaration {
            Value::Null => vec![],
            Value::Array(class_names) => class_names
                .into_iter()
                .map(|class_name| spec(class_name, None))
                .collect(),
            Value::Object(entries) => entries
                .into_iter()
                .map(|(class_name, options)| spec(Value::String(class_name), Some(options)))
                .collect(),
            class_name => vec![spec(class_name, None)],
        }
    }

    /// The class name, when it is a string
    pub fn name(&self) -> Option<&str> {
        self.class_name.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_null() {
        assert!(MiddlewareSpec::parse(Value::Null, None).is_empty());
    }

    #[test]
    fn test_parse_bare_string() {
        let specs = MiddlewareSpec::parse(json!("Titleize"), Some("name"));

        assert_eq!(
            specs,
            vec![MiddlewareSpec {
                class_name: json!("Titleize"),
                options: None,
                attribute_name: Some("name".to_string()),
            }]
        );
    }

    #[test]
    fn test_parse_array() {
        let specs = MiddlewareSpec::parse(json!(["EncryptPassword", "AddDefaults"]), None);

        let names: Vec<_> = specs.iter().filter_map(MiddlewareSpec::name).collect();
        assert_eq!(names, vec!["EncryptPassword", "AddDefaults"]);
        assert!(specs.iter().all(|spec| spec.options.is_none()));
    }

    #[test]
    fn test_parse_mapping_keeps_order_and_options() {
        let specs = MiddlewareSpec::parse(
            json!({"GenerateSlug": {"slug_attribute": "handle"}, "Titleize": {}}),
            Some("title"),
        );

        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name(), Some("GenerateSlug"));
        assert_eq!(specs[0].options, Some(json!({"slug_attribute": "handle"})));
        assert_eq!(specs[1].name(), Some("Titleize"));
        assert_eq!(specs[1].options, Some(json!({})));
    }

    #[test]
    fn test_parse_non_string_name_is_kept_for_validation() {
        let specs = MiddlewareSpec::parse(json!([42]), None);
        assert_eq!(specs[0].class_name, json!(42));
        assert_eq!(specs[0].name(), None);
    }
}
