/// String helpers for collection names and attribute values
///
/// The inflection rules are intentionally small: they cover regular English
/// nouns and the handful of irregular forms that show up in collection names.
use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

static NON_SLUG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("man", "men"),
    ("woman", "women"),
    ("child", "children"),
    ("mouse", "mice"),
    ("goose", "geese"),
];

const UNCOUNTABLE: &[&str] = &["data", "equipment", "information", "metadata", "series", "sheep", "species"];

/// Collapse every whitespace run (including newlines) into a single space
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").into_owned()
}

/// Capitalize every whitespace-separated word, e.g. "pyra mania" -> "Pyra Mania"
pub fn titleize(text: &str) -> String {
    text.split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Uppercase the first character and lowercase the rest
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// URL-safe slug, e.g. "Publisher 1!" -> "publisher-1"
pub fn slugify(text: &str) -> String {
    let lower = text.to_lowercase();
    NON_SLUG.replace_all(&lower, "-").trim_matches('-').to_string()
}

/// Plural form of the last segment of a (possibly qualified) name
pub fn pluralize(word: &str) -> String {
    inflect_last_segment(word, pluralize_word)
}

/// Singular form of the last segment of a (possibly qualified) name
pub fn singularize(word: &str) -> String {
    inflect_last_segment(word, singularize_word)
}

fn inflect_last_segment(word: &str, inflect: fn(&str) -> String) -> String {
    match word.rsplit_once('/') {
        Some((namespace, last)) => format!("{namespace}/{}", inflect(last)),
        None => inflect(word),
    }
}

fn pluralize_word(word: &str) -> String {
    let lower = word.to_lowercase();

    if word.is_empty() || UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }

    if let Some((_, plural)) = IRREGULAR.iter().find(|(singular, _)| *singular == lower) {
        return plural.to_string();
    }

    if IRREGULAR.iter().any(|(_, plural)| *plural == lower) {
        return word.to_string();
    }

    if ["s", "x", "z", "ch", "sh"].iter().any(|suffix| lower.ends_with(suffix)) {
        if lower.ends_with("ss") || !lower.ends_with('s') {
            return format!("{word}es");
        }
        // Already plural.
        return word.to_string();
    }

    if let Some(stem) = word.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{stem}ies");
        }
    }

    format!("{word}s")
}

fn singularize_word(word: &str) -> String {
    let lower = word.to_lowercase();

    if word.is_empty() || UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }

    if let Some((singular, _)) = IRREGULAR.iter().find(|(_, plural)| *plural == lower) {
        return singular.to_string();
    }

    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }

    for suffix in ["sses", "ches", "shes", "xes", "zes"] {
        if lower.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }

    if lower.ends_with("ss") {
        return word.to_string();
    }

    match word.strip_suffix('s') {
        Some(stem) => stem.to_string(),
        None => word.to_string(),
    }
}
