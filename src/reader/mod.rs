/// Reading collection data and options from disk
///
/// A collection named `books` lives either in a directory `<data_path>/books/`
/// of `*.yml` files or in a single file `<data_path>/books.yml`. Options are
/// layered from `<data_path>/_options.yml` and the collection's own options
/// file.

mod fs;

pub use fs::{FileSystem, MemoryFileSystem, OsFileSystem};

use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::formats::{parse_value, ParseYaml};
use crate::options::{merge, OptionsTree};
use crate::pipeline::{Format, LoaderError};
use crate::Attributes;

/// Name of the options file at the data root and inside collection directories
pub const OPTIONS_FILE: &str = "_options.yml";

/// Reads raw records and merged options for a collection
#[derive(Debug, Clone)]
pub struct Reader<F = OsFileSystem> {
    data_path: PathBuf,
    fs: F,
}

impl Reader<OsFileSystem> {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self::with_file_system(data_path, OsFileSystem)
    }
}

impl<F: FileSystem> Reader<F> {
    pub fn with_file_system(data_path: impl Into<PathBuf>, fs: F) -> Self {
        Self {
            data_path: data_path.into(),
            fs,
        }
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn file_system(&self) -> &F {
        &self.fs
    }

    /// Read every record of the collection at `relative_path`
    ///
    /// Returns the records in file order together with the merged options.
    pub fn read(&self, relative_path: &str) -> Result<(Vec<Attributes>, OptionsTree), LoaderError> {
        let qualified_path = self
            .data_path
            .join(relative_path.trim_start_matches('/'));

        if self.fs.is_dir(&qualified_path) {
            debug!(path = %qualified_path.display(), "reading collection directory");
            return self.read_directory(&qualified_path);
        }

        let data_file = with_suffix(&qualified_path, ".yml");
        if self.fs.is_file(&data_file) {
            debug!(path = %data_file.display(), "reading collection file");
            return self.read_file(&qualified_path, &data_file);
        }

        Err(LoaderError::not_found_on_disk(qualified_path))
    }

    fn read_directory(&self, qualified_path: &Path) -> Result<(Vec<Attributes>, OptionsTree), LoaderError> {
        let options = self.load_options(&qualified_path.join(OPTIONS_FILE))?;
        let parser = ParseYaml::new(options);

        let mut records = Vec::new();
        for file_path in self.data_files(qualified_path)? {
            let raw_data = self.read_to_string(&file_path)?;
            records.extend(parser.parse(&raw_data)?.into_records());
        }

        Ok((records, parser.options().clone()))
    }

    fn read_file(
        &self,
        qualified_path: &Path,
        data_file: &Path,
    ) -> Result<(Vec<Attributes>, OptionsTree), LoaderError> {
        let options = self.load_options(&with_suffix(qualified_path, "_options.yml"))?;
        let raw_data = self.read_to_string(data_file)?;
        let parser = ParseYaml::new(options);
        let records = parser.parse(&raw_data)?.into_records();

        Ok((records, parser.options().clone()))
    }

    /// `*.yml` files directly inside the directory, sorted, skipping names
    /// that start with `_` or `.`
    fn data_files(&self, directory: &Path) -> Result<Vec<PathBuf>, LoaderError> {
        let mut files: Vec<PathBuf> = self
            .fs
            .read_dir(directory)
            .map_err(|e| LoaderError::io(directory, &e))?
            .into_iter()
            .filter(|path| {
                let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                    return false;
                };
                let extension = Format::Yaml.extension();

                !name.starts_with('_')
                    && !name.starts_with('.')
                    && path.extension().is_some_and(|ext| ext == extension)
                    && self.fs.is_file(path)
            })
            .collect();
        files.sort();

        Ok(files)
    }

    /// Global options merged with the options file at `local_path`
    fn load_options(&self, local_path: &Path) -> Result<OptionsTree, LoaderError> {
        let global = self.load_options_file(&self.data_path.join(OPTIONS_FILE))?;
        let local = self.load_options_file(local_path)?;

        Ok(merge(global, local))
    }

    fn load_options_file(&self, path: &Path) -> Result<OptionsTree, LoaderError> {
        if !self.fs.is_file(path) {
            return Ok(OptionsTree::new());
        }

        debug!(path = %path.display(), "loading options file");
        let raw_options = self.read_to_string(path)?;

        match parse_value(&raw_options)? {
            Value::Object(options) => Ok(options),
            other => Err(LoaderError::data(
                Format::Yaml,
                raw_options,
                other,
                Some("options must be a Hash"),
            )),
        }
    }

    fn read_to_string(&self, path: &Path) -> Result<String, LoaderError> {
        self.fs
            .read_to_string(path)
            .map_err(|e| LoaderError::io(path, &e))
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    fn reader(fs: MemoryFileSystem) -> Reader<MemoryFileSystem> {
        Reader::with_file_system("/data", fs)
    }

    #[test]
    fn test_read_directory() {
        let fs = MemoryFileSystem::new().with_file("/data/books/gen1.yml", "- name: Red\n  generation: 1\n");

        let (records, options) = reader(fs).read("books").unwrap();

        assert_eq!(records, vec![attrs(json!({"name": "Red", "generation": 1}))]);
        assert!(options.is_empty());
    }

    #[test]
    fn test_read_directory_sorted_and_filtered() {
        let fs = MemoryFileSystem::new()
            .with_file("/data/books/b.yml", "title: Beta\n")
            .with_file("/data/books/a.yml", "title: Alpha\n")
            .with_file("/data/books/_draft.yml", "title: Draft\n")
            .with_file("/data/books/.hidden.yml", "title: Hidden\n")
            .with_file("/data/books/notes.txt", "title: Notes\n")
            .with_file("/data/books/c.yml", "- title: Gamma\n- title: Delta\n");

        let (records, _) = reader(fs).read("books").unwrap();
        let titles: Vec<&Value> = records.iter().map(|record| &record["title"]).collect();

        assert_eq!(titles, vec!["Alpha", "Beta", "Gamma", "Delta"]);
    }

    #[test]
    fn test_read_single_file() {
        let fs = MemoryFileSystem::new()
            .with_file("/data/authentication/users.yml", "- username: alan.bradley\n")
            .with_file("/data/authentication/users_options.yml", "find_by: username\n");

        let (records, options) = reader(fs).read("authentication/users").unwrap();

        assert_eq!(records, vec![attrs(json!({"username": "alan.bradley"}))]);
        assert_eq!(options, attrs(json!({"find_by": "username"})));
    }

    #[test]
    fn test_read_strips_leading_slash() {
        let fs = MemoryFileSystem::new().with_file("/data/books.yml", "title: Dune\n");

        let (records, _) = reader(fs).read("/books").unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_read_merges_options_shallowly() {
        let fs = MemoryFileSystem::new()
            .with_file("/data/_options.yml", "a: 1\nb: 2\nreview:\n  multiline: true\n")
            .with_file("/data/books/_options.yml", "b: 3\nc: 4\nreview:\n  middleware: Titleize\n")
            .with_file("/data/books/dune.yml", "review: |\n  Spice\n  must flow\n");

        let (records, options) = reader(fs).read("books").unwrap();

        assert_eq!(
            options,
            attrs(json!({"a": 1, "b": 3, "review": {"middleware": "Titleize"}, "c": 4}))
        );
        // local options replaced the multiline flag
        assert_eq!(records[0]["review"], json!("Spice must flow"));
    }

    #[test]
    fn test_read_applies_multiline_option() {
        let fs = MemoryFileSystem::new()
            .with_file("/data/books/_options.yml", "review:\n  multiline: true\n")
            .with_file("/data/books/dune.yml", "review: |\n  Spice\n  must flow\n");

        let (records, _) = reader(fs).read("books").unwrap();
        assert_eq!(records[0]["review"], json!("Spice\nmust flow"));
    }

    #[test]
    fn test_read_missing_collection() {
        let result = reader(MemoryFileSystem::new()).read("books");

        assert_eq!(result, Err(LoaderError::not_found_on_disk("/data/books")));
    }

    #[test]
    fn test_read_malformed_options() {
        let fs = MemoryFileSystem::new()
            .with_file("/data/books/_options.yml", "- middleware\n")
            .with_file("/data/books/gen1.yml", "name: Red\n");

        let result = reader(fs).read("books");

        match result {
            Err(err @ LoaderError::Data { .. }) => {
                assert_eq!(err.to_string(), "options must be a Hash");
            }
            other => panic!("expected data error, got {:?}", other),
        }
    }

    #[test]
    fn test_read_unparseable_global_options() {
        let fs = MemoryFileSystem::new()
            .with_file("/data/_options.yml", "find_by: [id\n")
            .with_file("/data/books.yml", "name: Red\n");

        let result = reader(fs).read("books");
        assert!(matches!(result, Err(LoaderError::Parse { .. })));
    }

    #[test]
    fn test_read_data_file_with_alias() {
        let fs = MemoryFileSystem::new().with_file(
            "/data/books/gen1.yml",
            "- name: &red Red\n- name: *red\n",
        );

        match reader(fs).read("books") {
            Err(err @ LoaderError::Parse { .. }) => {
                assert_eq!(err.to_string(), "Unknown alias: red");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_read_options_file_with_alias() {
        let fs = MemoryFileSystem::new()
            .with_file("/data/books/_options.yml", "base: &b\n  multiline: true\nreview: *b\n")
            .with_file("/data/books/gen1.yml", "name: Red\n");

        let result = reader(fs).read("books");
        assert!(matches!(result, Err(LoaderError::Parse { .. })));
    }

    #[test]
    fn test_read_invalid_data_file() {
        let fs = MemoryFileSystem::new().with_file("/data/books.yml", "- 1\n- 2\n");

        let result = reader(fs).read("books");
        assert!(matches!(result, Err(LoaderError::Data { .. })));
    }
}
