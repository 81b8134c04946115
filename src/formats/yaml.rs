use serde_json::{Map, Number, Value};
use serde_yaml::Value as YamlValue;
use yaml_rust2::parser::{Event, Parser};

use super::Parsed;
use crate::options::{is_multiline, OptionsTree};
use crate::pipeline::{Format, LoaderError};
use crate::text::collapse_whitespace;
use crate::Attributes;

/// Parses a raw YAML document and cleans up its string values
///
/// Every string is trimmed. Unless the owning attribute is configured with
/// `multiline: true`, internal whitespace runs are also collapsed to a single
/// space.
#[derive(Debug, Clone, Default)]
pub struct ParseYaml {
    options: OptionsTree,
}

impl ParseYaml {
    /// Create a parser with per-attribute options (e.g. `{"review": {"multiline": true}}`)
    pub fn new(options: OptionsTree) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &OptionsTree {
        &self.options
    }

    /// Parse a document into one record or a list of records
    pub fn parse(&self, raw_yaml: &str) -> Result<Parsed, LoaderError> {
        let parsed = parse_value(raw_yaml)?;

        match parsed {
            Value::Array(items) => {
                if !items.iter().all(Value::is_object) {
                    return Err(LoaderError::data(Format::Yaml, raw_yaml, Value::Array(items), None));
                }

                Ok(Parsed::Many(
                    items
                        .into_iter()
                        .filter_map(|item| match item {
                            Value::Object(map) => Some(self.cleanup(map)),
                            _ => None,
                        })
                        .collect(),
                ))
            }
            Value::Object(map) => Ok(Parsed::One(self.cleanup(map))),
            other => Err(LoaderError::data(Format::Yaml, raw_yaml, other, None)),
        }
    }

    fn cleanup(&self, record: Attributes) -> Attributes {
        record
            .into_iter()
            .map(|(key, value)| {
                let multiline = is_multiline(&self.options, &key);
                (key, cleanup_value(value, multiline))
            })
            .collect()
    }
}

/// Parse raw YAML into a JSON value tree
///
/// Used for both data files and options files. Aliases and explicit tags are
/// rejected as unsafe constructs.
pub fn parse_value(raw_yaml: &str) -> Result<Value, LoaderError> {
    if let Some(alias) = find_alias(raw_yaml) {
        return Err(LoaderError::parse(
            Format::Yaml,
            raw_yaml,
            Some(format!("Unknown alias: {alias}")),
        ));
    }

    let yaml: YamlValue = serde_yaml::from_str(raw_yaml)
        .map_err(|e| LoaderError::parse(Format::Yaml, raw_yaml, Some(e.to_string())))?;

    convert(yaml).map_err(|message| LoaderError::parse(Format::Yaml, raw_yaml, Some(message)))
}

/// Name of the first alias (`*name`) in the document, if any
///
/// Scan errors end the search; `serde_yaml` reports them with its own message.
fn find_alias(raw_yaml: &str) -> Option<String> {
    let mut parser = Parser::new_from_str(raw_yaml);

    loop {
        match parser.next_token() {
            Ok((Event::Alias(_), mark)) => return Some(alias_name(raw_yaml, mark.index())),
            Ok((Event::StreamEnd, _)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

/// Reads `*name` at the marker, which counts chars on most lines and bytes on some
fn alias_name(raw_yaml: &str, index: usize) -> String {
    let by_chars: String = raw_yaml.chars().skip(index).collect();
    let tail = match raw_yaml.get(index..) {
        Some(by_bytes) if !by_chars.starts_with('*') => by_bytes,
        _ => by_chars.as_str(),
    };

    tail.trim_start_matches('*')
        .chars()
        .take_while(|c| !c.is_whitespace() && !matches!(c, ',' | '[' | ']' | '{' | '}'))
        .collect()
}

fn convert(yaml: YamlValue) -> Result<Value, String> {
    match yaml {
        YamlValue::Null => Ok(Value::Null),
        YamlValue::Bool(b) => Ok(Value::Bool(b)),
        YamlValue::Number(n) => convert_number(&n),
        YamlValue::String(s) => Ok(Value::String(s)),
        YamlValue::Sequence(items) => items
            .into_iter()
            .map(convert)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        YamlValue::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                map.insert(convert_key(key)?, convert(value)?);
            }
            Ok(Value::Object(map))
        }
        YamlValue::Tagged(tagged) => Err(format!("tried to load unspecified tag {}", tagged.tag)),
    }
}

fn convert_number(n: &serde_yaml::Number) -> Result<Value, String> {
    if let Some(i) = n.as_i64() {
        return Ok(Value::Number(i.into()));
    }
    if let Some(u) = n.as_u64() {
        return Ok(Value::Number(u.into()));
    }

    n.as_f64()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| format!("unsupported number {n}"))
}

fn convert_key(key: YamlValue) -> Result<String, String> {
    match key {
        YamlValue::String(s) => Ok(s),
        YamlValue::Bool(b) => Ok(b.to_string()),
        YamlValue::Number(n) => Ok(n.to_string()),
        YamlValue::Null => Ok(String::new()),
        other => Err(format!("unsupported mapping key {other:?}")),
    }
}

fn cleanup_value(value: Value, multiline: bool) -> Value {
    match value {
        Value::String(text) => {
            let text = text.trim();
            if multiline {
                Value::String(text.to_string())
            } else {
                Value::String(collapse_whitespace(text))
            }
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| cleanup_value(item, multiline))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, item)| (key, cleanup_value(item, multiline)))
                .collect(),
        ),
        other => other,
    }
}
