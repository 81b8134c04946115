/// Loading collections from data files
///
/// A load reads the records and options of one collection, resolves the
/// declared middleware, and runs every record through the middleware chain
/// into an upsert. Observers are notified as the load progresses.

mod observer;
mod upsert;

pub use observer::{render, ConsoleObserver, Notification, Observer};
pub use upsert::Upsert;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::collection::{Collection, Repository};
use crate::middleware::{self, MiddlewareRegistry};
use crate::options::{merge, OptionsResolver, OptionsTree, ResolvedOptions};
use crate::pipeline::{LoaderError, ResultList};
use crate::reader::{FileSystem, OsFileSystem, Reader};
use crate::Attributes;

/// Stages of a single load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Reading,
    ParsingOptions,
    Upserting,
    Done,
    Error,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Reading => "reading",
            Stage::ParsingOptions => "parsing-options",
            Stage::Upserting => "upserting",
            Stage::Done => "done",
            Stage::Error => "error",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Prepared {
    data: Vec<Attributes>,
    options: OptionsTree,
    resolved: ResolvedOptions,
}

/// Reads data files and upserts their records into collections
pub struct Loader<F = OsFileSystem> {
    reader: Reader<F>,
    registry: Arc<MiddlewareRegistry>,
    repository: Option<Arc<dyn Repository>>,
    overrides: OptionsTree,
    observers: Vec<Box<dyn Observer>>,
}

impl Loader<OsFileSystem> {
    /// Create a loader for the data files under `data_path`
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self::with_file_system(data_path, OsFileSystem)
    }
}

impl<F: FileSystem> Loader<F> {
    pub fn with_file_system(data_path: impl Into<PathBuf>, fs: F) -> Self {
        Self {
            reader: Reader::with_file_system(data_path, fs),
            registry: Arc::new(MiddlewareRegistry::with_builtins()),
            repository: None,
            overrides: OptionsTree::new(),
            observers: Vec::new(),
        }
    }

    /// Options applied over every options file, e.g. a `find_by` override
    pub fn with_overrides(mut self, overrides: OptionsTree) -> Self {
        self.overrides = overrides;
        self
    }

    /// Use a custom middleware registry instead of the builtins
    pub fn with_registry(mut self, registry: Arc<MiddlewareRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Repository handed to middleware, e.g. for association lookups
    pub fn with_repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn add_observer(&mut self, observer: impl Observer + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn data_path(&self) -> &Path {
        self.reader.data_path()
    }

    pub fn registry(&self) -> &MiddlewareRegistry {
        &self.registry
    }

    /// Load the collection from the path matching its collection name
    pub fn load(&self, collection: Arc<dyn Collection>) -> Result<ResultList, LoaderError> {
        let relative_path = collection.collection_name().to_string();
        self.load_from(collection, &relative_path)
    }

    /// Load the collection from `relative_path` under the data path
    ///
    /// Reading and resolving errors fail the whole load. Per-record failures
    /// are collected into the returned list instead.
    pub fn load_from(
        &self,
        collection: Arc<dyn Collection>,
        relative_path: &str,
    ) -> Result<ResultList, LoaderError> {
        let collection_name = collection.collection_name().to_string();

        let Prepared {
            data,
            options,
            resolved,
        } = match self.prepare(&collection_name, relative_path) {
            Ok(prepared) => prepared,
            Err(error) => {
                warn!(
                    collection = %collection_name,
                    stage = %Stage::Error,
                    kind = error.kind(),
                    error = %error,
                    "load failed"
                );
                self.notify(&Notification::Error {
                    collection_name: &collection_name,
                    error: &error,
                    relative_path,
                });
                return Err(error);
            }
        };

        self.notify(&Notification::Start {
            collection_name: &collection_name,
            data: &data,
            data_path: self.data_path(),
            options: &options,
            relative_path,
        });

        debug!(collection = %collection_name, stage = %Stage::Upserting, records = data.len());
        let upsert = Upsert::new(collection, resolved.find_by_keys());
        let command = middleware::apply(Box::new(upsert), &resolved.middleware);

        let results: ResultList = data
            .iter()
            .map(|attributes| {
                let result = command.call(attributes.clone());
                match &result {
                    Ok(outcome) => self.notify(&Notification::Success {
                        attributes,
                        collection_name: &collection_name,
                        options: &resolved.options,
                        outcome,
                    }),
                    Err(failure) => self.notify(&Notification::Failure {
                        attributes,
                        collection_name: &collection_name,
                        options: &resolved.options,
                        failure,
                    }),
                }
                result
            })
            .collect();

        self.notify(&Notification::Finish {
            collection_name: &collection_name,
            results: &results,
        });

        info!(
            collection = %collection_name,
            stage = %Stage::Done,
            succeeded = results.success_count(),
            failed = results.len() - results.success_count(),
            "load finished"
        );

        Ok(results)
    }

    fn prepare(&self, collection_name: &str, relative_path: &str) -> Result<Prepared, LoaderError> {
        debug!(collection = %collection_name, stage = %Stage::Reading, relative_path);
        let (data, options) = self.reader.read(relative_path)?;
        let options = merge(options, self.overrides.clone());

        debug!(collection = %collection_name, stage = %Stage::ParsingOptions);
        let resolved = OptionsResolver::new(&self.registry, self.repository.clone())
            .resolve(options.clone())?;

        Ok(Prepared {
            data,
            options,
            resolved,
        })
    }

    fn notify(&self, notification: &Notification<'_>) {
        for observer in &self.observers {
            observer.update(notification);
        }
    }
}

impl<F: fmt::Debug> fmt::Debug for Loader<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("reader", &self.reader)
            .field("registry", &self.registry)
            .field("repository", &self.repository)
            .field("overrides", &self.overrides)
            .field("observers", &self.observers.len())
            .finish()
    }
}
