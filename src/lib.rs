/// collection-loader - Seed collections from YAML data files
///
/// This library reads collection data and layered options files from a data
/// directory, runs each record through a configurable middleware chain, and
/// creates or updates the matching entities in a collection.

pub mod collection;
pub mod formats;
pub mod loader;
pub mod middleware;
pub mod options;
pub mod pipeline;
pub mod reader;
pub mod text;

/// Attributes of a record, in file order
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// A stored entity
pub type Entity = Attributes;

// Re-export commonly used types
pub use collection::{Collection, MemoryCollection, MemoryRepository, Repository};
pub use loader::{ConsoleObserver, Loader, Notification, Observer};
pub use middleware::{Command, Middleware, MiddlewareRegistry};
pub use pipeline::{CommandResult, Failure, LoaderError, Outcome, ResultList, UpsertAction};
pub use reader::Reader;
