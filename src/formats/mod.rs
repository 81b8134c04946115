/// Format-specific parsers for data files
///
/// A parser turns raw text into records and applies the format's cleanup
/// rules. YAML is the only supported format.

mod yaml;

pub use yaml::{parse_value, ParseYaml};

use crate::Attributes;

/// Records produced by parsing one data file
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    /// The document was a single mapping
    One(Attributes),
    /// The document was a sequence of mappings
    Many(Vec<Attributes>),
}

impl Parsed {
    /// Flatten into a list of records
    pub fn into_records(self) -> Vec<Attributes> {
        match self {
            Parsed::One(record) => vec![record],
            Parsed::Many(records) => records,
        }
    }
}
