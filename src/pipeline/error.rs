use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::Attributes;

/// Serialization format of a data or options file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Yaml,
}

impl Format {
    /// File extension used for this format, without the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Yaml => "yml",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Yaml => write!(f, "yaml"),
        }
    }
}

/// Errors that can occur while reading, resolving, or upserting data
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoaderError {
    /// The requested data file or directory does not exist
    #[error("{}", load_message(.file_path, .message.as_deref()))]
    Load {
        file_path: PathBuf,
        message: Option<String>,
    },

    /// Serialized input is not well-formed for its format
    #[error("{}", parse_message(.format, .raw_value, .message.as_deref()))]
    Parse {
        format: Format,
        raw_value: String,
        message: Option<String>,
    },

    /// Input parsed, but does not have the expected shape
    #[error("{}", data_message(.format, .raw_value, .parsed_value, .message.as_deref()))]
    Data {
        format: Format,
        parsed_value: Value,
        raw_value: String,
        message: Option<String>,
    },

    /// A declared middleware could not be constructed
    #[error(
        "{}",
        middleware_message(.middleware, .attribute_name.as_deref(), .options.as_ref(), .message.as_deref())
    )]
    Middleware {
        attribute_name: Option<String>,
        middleware: Value,
        options: Option<Value>,
        message: Option<String>,
    },

    /// No collection is registered under the qualified name
    #[error("collection not found with qualified name {qualified_name:?}")]
    Collection {
        qualified_name: String,
        collections: Vec<String>,
    },

    /// One or more records in a batch failed
    #[error("{}", multiple_message(.errors))]
    Multiple { errors: Vec<LoaderError> },

    /// A find query matched no entity
    #[error("{}", not_found_message(.collection_name, .attributes))]
    NotFound {
        collection_name: String,
        attributes: Attributes,
    },

    /// A `require` directive named a library that is not registered
    #[error("{}", require_message(.library, .message.as_deref()))]
    Require {
        library: String,
        message: Option<String>,
    },

    /// A reserved option key holds a value of the wrong shape
    #[error("invalid option {key:?} with value {value}: {message}")]
    InvalidOption {
        key: String,
        value: Value,
        message: String,
    },

    /// Unexpected I/O failure
    #[error("I/O error for {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    /// Failure reported by a collection implementation
    #[error("Collection error: {message}")]
    Backend { message: String },
}

impl LoaderError {
    /// Create a Load error
    pub fn load(file_path: impl Into<PathBuf>, message: Option<&str>) -> Self {
        Self::Load {
            file_path: file_path.into(),
            message: message.map(str::to_string),
        }
    }

    /// Create a Load error for a missing file or directory
    pub fn not_found_on_disk(file_path: impl Into<PathBuf>) -> Self {
        Self::load(file_path, Some("no such file or directory"))
    }

    /// Create a Parse error
    pub fn parse(format: Format, raw_value: impl Into<String>, message: Option<String>) -> Self {
        Self::Parse {
            format,
            raw_value: raw_value.into(),
            message,
        }
    }

    /// Create a Data error
    pub fn data(
        format: Format,
        raw_value: impl Into<String>,
        parsed_value: Value,
        message: Option<&str>,
    ) -> Self {
        Self::Data {
            format,
            parsed_value,
            raw_value: raw_value.into(),
            message: message.map(str::to_string),
        }
    }

    /// Create a Middleware error
    pub fn middleware(
        middleware: Value,
        attribute_name: Option<&str>,
        options: Option<Value>,
        message: Option<String>,
    ) -> Self {
        Self::Middleware {
            attribute_name: attribute_name.map(str::to_string),
            middleware,
            options,
            message,
        }
    }

    /// Create an Io error from a std::io::Error
    pub fn io(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: error.to_string(),
        }
    }

    /// Create a Backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Short identifier for the error kind, used in structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            LoaderError::Load { .. } => "load_error",
            LoaderError::Parse { .. } => "parse_error",
            LoaderError::Data { .. } => "data_error",
            LoaderError::Middleware { .. } => "middleware_error",
            LoaderError::Collection { .. } => "collection_error",
            LoaderError::Multiple { .. } => "multiple_errors",
            LoaderError::NotFound { .. } => "not_found",
            LoaderError::Require { .. } => "require_error",
            LoaderError::InvalidOption { .. } => "invalid_option",
            LoaderError::Io { .. } => "io_error",
            LoaderError::Backend { .. } => "backend_error",
        }
    }
}

fn load_message(file_path: &Path, message: Option<&str>) -> String {
    match message {
        Some(message) => format!("Unable to load file {}: {}", file_path.display(), message),
        None => format!("Unable to load file {}", file_path.display()),
    }
}

fn parse_message(format: &Format, raw_value: &str, message: Option<&str>) -> String {
    match message {
        Some(message) => message.to_string(),
        None => format!("Unable to parse object as {format}: {raw_value:?}"),
    }
}

fn data_message(format: &Format, raw_value: &str, parsed_value: &Value, message: Option<&str>) -> String {
    if let Some(message) = message {
        return message.to_string();
    }

    format!(
        "Invalid {format} data object:\n\n  raw_value:\n{}\n\n  parsed value:\n{}",
        indent(&format!("{raw_value:?}"), 4),
        indent(&parsed_value.to_string(), 4),
    )
}

fn middleware_message(
    middleware: &Value,
    attribute_name: Option<&str>,
    options: Option<&Value>,
    message: Option<&str>,
) -> String {
    let name = match middleware {
        Value::String(name) => name.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    let mut text = format!("unable to generate middleware {name}");

    if let Some(attribute_name) = attribute_name.filter(|name| !name.is_empty()) {
        text.push_str(&format!(" for attribute {attribute_name:?}"));
    }

    if let Some(options) = options.filter(|options| !is_empty_value(options)) {
        text.push_str(&format!(" with options {options}"));
    }

    if let Some(message) = message.filter(|message| !message.is_empty()) {
        text.push_str(&format!(": {message}"));
    }

    text
}

fn require_message(library: &str, message: Option<&str>) -> String {
    match message {
        Some(message) => format!("cannot load such library -- {library}: {message}"),
        None => format!("cannot load such library -- {library}"),
    }
}

fn not_found_message(collection_name: &str, attributes: &Attributes) -> String {
    format!(
        "{collection_name} not found with attributes {}",
        Value::Object(attributes.clone())
    )
}

fn multiple_message(errors: &[LoaderError]) -> String {
    let mut text = format!("{} error(s) occurred", errors.len());
    for error in errors {
        text.push_str(&format!("\n  - {error}"));
    }
    text
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

fn indent(text: &str, width: usize) -> String {
    let padding = " ".repeat(width);
    text.lines()
        .map(|line| format!("{padding}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
