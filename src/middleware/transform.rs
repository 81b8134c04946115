use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{AttributeScope, Command, EntityScope, Middleware};
use crate::options::OptionsTree;
use crate::pipeline::CommandResult;
use crate::text::{slugify, titleize};
use crate::Attributes;

fn string_value(attributes: &Attributes, key: &str) -> String {
    match attributes.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn parse_options<T>(options: &OptionsTree) -> Result<T, String>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(Value::Object(options.clone())).map_err(|e| e.to_string())
}

/// Capitalizes every word of an attribute, e.g. "pyra mania" -> "Pyra Mania"
#[derive(Debug, Clone)]
pub struct Titleize {
    attribute_name: String,
}

impl Titleize {
    pub fn new(scope: AttributeScope) -> Result<Self, String> {
        Ok(Self {
            attribute_name: scope.attribute_name().to_string(),
        })
    }
}

impl Middleware for Titleize {
    fn call(&self, next: &dyn Command, mut attributes: Attributes) -> CommandResult {
        let title = titleize(&string_value(&attributes, &self.attribute_name));
        attributes.insert(self.attribute_name.clone(), Value::String(title));

        next.call(attributes)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SlugOptions {
    slug_attribute: String,
}

impl Default for SlugOptions {
    fn default() -> Self {
        Self {
            slug_attribute: "slug".to_string(),
        }
    }
}

/// Derives a slug from an attribute unless the record already has one
#[derive(Debug, Clone)]
pub struct GenerateSlug {
    attribute_name: String,
    slug_attribute: String,
}

impl GenerateSlug {
    pub fn new(scope: AttributeScope) -> Result<Self, String> {
        let options: SlugOptions = parse_options(scope.options())?;

        Ok(Self {
            attribute_name: scope.attribute_name().to_string(),
            slug_attribute: options.slug_attribute,
        })
    }
}

impl Middleware for GenerateSlug {
    fn call(&self, next: &dyn Command, mut attributes: Attributes) -> CommandResult {
        let has_slug = attributes
            .get(&self.slug_attribute)
            .is_some_and(|slug| !slug.is_null());

        if !has_slug {
            let slug = slugify(&string_value(&attributes, &self.attribute_name));
            attributes.insert(self.slug_attribute.clone(), Value::String(slug));
        }

        next.call(attributes)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct PasswordOptions {
    attribute: String,
    target: String,
    salt: String,
}

impl Default for PasswordOptions {
    fn default() -> Self {
        Self {
            attribute: "password".to_string(),
            target: "encrypted_password".to_string(),
            salt: String::new(),
        }
    }
}

/// Replaces a plaintext password with its salted SHA-256 digest
#[derive(Clone)]
pub struct EncryptPassword {
    attribute: String,
    target: String,
    salt: String,
}

impl EncryptPassword {
    pub fn new(scope: EntityScope) -> Result<Self, String> {
        let options: PasswordOptions = parse_options(scope.options())?;

        Ok(Self {
            attribute: options.attribute,
            target: options.target,
            salt: options.salt,
        })
    }

    /// Hex digest of `salt + password`
    pub fn digest(&self, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Debug for EncryptPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptPassword")
            .field("attribute", &self.attribute)
            .field("target", &self.target)
            .field("salt", &"[redacted]")
            .finish()
    }
}

impl Middleware for EncryptPassword {
    fn call(&self, next: &dyn Command, mut attributes: Attributes) -> CommandResult {
        let password = match attributes.shift_remove(&self.attribute) {
            Some(Value::String(password)) => password,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        attributes.insert(self.target.clone(), Value::String(self.digest(&password)));

        next.call(attributes)
    }
}

/// Fills in attributes the record does not set
///
/// The middleware options are the defaults:
///
/// ```yaml
/// middleware:
///   AddDefaults:
///     publisher: Ace Books
/// ```
#[derive(Debug, Clone)]
pub struct AddDefaults {
    defaults: OptionsTree,
}

impl AddDefaults {
    pub fn new(scope: EntityScope) -> Result<Self, String> {
        Ok(Self {
            defaults: scope.options().clone(),
        })
    }
}

impl Middleware for AddDefaults {
    fn call(&self, next: &dyn Command, mut attributes: Attributes) -> CommandResult {
        for (key, value) in &self.defaults {
            attributes.entry(key.clone()).or_insert_with(|| value.clone());
        }

        next.call(attributes)
    }
}
