use parking_lot::Mutex;
use serde_json::Value;
use std::io::{self, Write};
use std::path::Path;
use tracing::warn;

use crate::options::{FindBy, OptionsTree};
use crate::pipeline::{Failure, LoaderError, Outcome, ResultList, UpsertAction};
use crate::text::singularize;
use crate::Attributes;

/// Progress events published while loading a collection
#[derive(Debug, Clone, Copy)]
pub enum Notification<'a> {
    /// Data and options were read and resolved; upserting begins
    Start {
        collection_name: &'a str,
        data: &'a [Attributes],
        data_path: &'a Path,
        options: &'a OptionsTree,
        relative_path: &'a str,
    },
    /// Reading or resolving failed; nothing was upserted
    Error {
        collection_name: &'a str,
        error: &'a LoaderError,
        relative_path: &'a str,
    },
    /// One record was upserted
    Success {
        attributes: &'a Attributes,
        collection_name: &'a str,
        options: &'a OptionsTree,
        outcome: &'a Outcome,
    },
    /// One record failed in the middleware chain or the upsert
    Failure {
        attributes: &'a Attributes,
        collection_name: &'a str,
        options: &'a OptionsTree,
        failure: &'a Failure,
    },
    /// Every record was processed
    Finish {
        collection_name: &'a str,
        results: &'a ResultList,
    },
}

impl Notification<'_> {
    /// Event name: start, error, success, failure or finish
    pub fn action(&self) -> &'static str {
        match self {
            Notification::Start { .. } => "start",
            Notification::Error { .. } => "error",
            Notification::Success { .. } => "success",
            Notification::Failure { .. } => "failure",
            Notification::Finish { .. } => "finish",
        }
    }

    pub fn collection_name(&self) -> &str {
        match self {
            Notification::Start { collection_name, .. }
            | Notification::Error { collection_name, .. }
            | Notification::Success { collection_name, .. }
            | Notification::Failure { collection_name, .. }
            | Notification::Finish { collection_name, .. } => collection_name,
        }
    }
}

/// Receives load notifications
pub trait Observer: Send + Sync {
    fn update(&self, notification: &Notification<'_>);
}

impl<F> Observer for F
where
    F: Fn(&Notification<'_>) + Send + Sync,
{
    fn update(&self, notification: &Notification<'_>) {
        self(notification)
    }
}

/// Renders notifications as human-readable progress lines
///
/// ```text
/// Loading 3 books from data/books
/// - Successfully created book with id 0
/// - Unable to create book with id 1: Collection error: disk full
/// ```
#[derive(Debug)]
pub struct ConsoleObserver<W> {
    writer: Mutex<W>,
}

impl ConsoleObserver<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleObserver<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> Observer for ConsoleObserver<W> {
    fn update(&self, notification: &Notification<'_>) {
        let Some(line) = render(notification) else {
            return;
        };

        let mut writer = self.writer.lock();
        if let Err(e) = writeln!(writer, "{line}") {
            warn!(error = %e, "failed to write load notification");
        }
    }
}

/// The line for a notification, or `None` if it prints nothing
pub fn render(notification: &Notification<'_>) -> Option<String> {
    match *notification {
        Notification::Start {
            collection_name,
            data,
            data_path,
            relative_path,
            ..
        } => {
            let name = if data.len() == 1 {
                singularize(collection_name)
            } else {
                collection_name.to_string()
            };

            Some(format!(
                "Loading {} {name} from {}",
                data.len(),
                data_path.join(relative_path).display()
            ))
        }
        Notification::Error {
            collection_name,
            error,
            relative_path,
        } => {
            let mut message = format!("[Error] An error occurred when loading {collection_name}");
            if collection_name != relative_path {
                message.push_str(&format!(" ({relative_path})"));
            }

            Some(format!("{message}: {error}"))
        }
        Notification::Success {
            attributes,
            collection_name,
            options,
            outcome,
        } => Some(format!(
            "- Successfully {} {} {}",
            outcome.action.past_tense(),
            singularize(collection_name),
            filters(options, attributes, Some(&outcome.entity)),
        )),
        Notification::Failure {
            attributes,
            collection_name,
            options,
            failure,
        } => Some(format!(
            "- Unable to {} {} {}: {}",
            failure.action.as_ref().map_or("process", UpsertAction::as_str),
            singularize(collection_name),
            filters(options, attributes, None),
            failure.error,
        )),
        Notification::Finish { .. } => None,
    }
}

/// "with id 0, title \"Dune\"" built from the find_by attributes
fn filters(options: &OptionsTree, attributes: &Attributes, entity: Option<&Attributes>) -> String {
    let keys = FindBy::from_options(options).unwrap_or_default().keys();

    let pairs: Vec<String> = keys
        .iter()
        .map(|key| {
            let value = entity
                .and_then(|entity| entity.get(key))
                .filter(|value| is_present(value))
                .or_else(|| attributes.get(key))
                .unwrap_or(&Value::Null);
            format!("{key} {value}")
        })
        .collect();

    format!("with {}", pairs.join(", "))
}

fn is_present(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    fn output(notification: Notification<'_>) -> String {
        let observer = ConsoleObserver::new(Vec::new());
        observer.update(&notification);
        String::from_utf8(observer.into_inner()).unwrap()
    }

    #[test]
    fn test_start() {
        let data = vec![attrs(json!({"id": 0})), attrs(json!({"id": 1}))];
        let options = OptionsTree::new();

        let line = output(Notification::Start {
            collection_name: "books",
            data: &data,
            data_path: Path::new("data"),
            options: &options,
            relative_path: "books",
        });
        assert_eq!(line, "Loading 2 books from data/books\n");

        let line = output(Notification::Start {
            collection_name: "books",
            data: &data[..1],
            data_path: Path::new("data"),
            options: &options,
            relative_path: "fiction/books",
        });
        assert_eq!(line, "Loading 1 book from data/fiction/books\n");
    }

    #[test]
    fn test_error() {
        let error = LoaderError::not_found_on_disk("data/books");

        let line = output(Notification::Error {
            collection_name: "books",
            error: &error,
            relative_path: "books",
        });
        assert_eq!(
            line,
            "[Error] An error occurred when loading books: \
             Unable to load file data/books: no such file or directory\n"
        );

        let line = output(Notification::Error {
            collection_name: "books",
            error: &error,
            relative_path: "library/books",
        });
        assert!(line.starts_with("[Error] An error occurred when loading books (library/books): "));
    }

    #[test]
    fn test_success_prefers_entity_values() {
        let options = attrs(json!({"find_by": ["id", "title"]}));
        let attributes = attrs(json!({"title": "Gideon the Ninth"}));
        let outcome = Outcome::new(
            UpsertAction::Update,
            attrs(json!({"id": 0, "title": "GIDEON THE NINTH"})),
        );

        let line = output(Notification::Success {
            attributes: &attributes,
            collection_name: "books",
            options: &options,
            outcome: &outcome,
        });

        assert_eq!(
            line,
            "- Successfully updated book with id 0, title \"GIDEON THE NINTH\"\n"
        );
    }

    #[test]
    fn test_success_falls_back_to_attributes() {
        let options = OptionsTree::new();
        let attributes = attrs(json!({"id": 0}));
        let outcome = Outcome::new(UpsertAction::Create, attrs(json!({"title": "Untitled"})));

        let line = output(Notification::Success {
            attributes: &attributes,
            collection_name: "authentication/users",
            options: &options,
            outcome: &outcome,
        });

        assert_eq!(line, "- Successfully created authentication/user with id 0\n");
    }

    #[test]
    fn test_failure() {
        let options = attrs(json!({"find_by": "title"}));
        let attributes = attrs(json!({"title": "Gideon the Ninth"}));
        let failure = Failure::new(LoaderError::backend("something went wrong"))
            .with_action(UpsertAction::Create);

        let line = output(Notification::Failure {
            attributes: &attributes,
            collection_name: "books",
            options: &options,
            failure: &failure,
        });
        assert_eq!(
            line,
            "- Unable to create book with title \"Gideon the Ninth\": \
             Collection error: something went wrong\n"
        );

        let failure = Failure::new(LoaderError::backend("something went wrong"));
        let line = output(Notification::Failure {
            attributes: &attributes,
            collection_name: "books",
            options: &options,
            failure: &failure,
        });
        assert!(line.starts_with("- Unable to process book with title"));
    }

    #[test]
    fn test_finish_prints_nothing() {
        let results = ResultList::default();
        let notification = Notification::Finish {
            collection_name: "books",
            results: &results,
        };

        assert_eq!(notification.action(), "finish");
        assert_eq!(output(notification), "");
    }

    #[test]
    fn test_closure_observer() {
        let seen = Mutex::new(Vec::new());
        let observer = |notification: &Notification<'_>| {
            seen.lock().push(notification.action().to_string());
        };
        let results = ResultList::default();

        Observer::update(
            &observer,
            &Notification::Finish {
                collection_name: "books",
                results: &results,
            },
        );

        assert_eq!(*seen.lock(), vec!["finish"]);
    }
}
