use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::LoaderError;
use crate::Entity;

/// The action an upsert performed (or attempted)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpsertAction {
    #[serde(rename = "create")]
    Create,
    #[serde(rename = "update")]
    Update,
    /// The lookup for an existing entity failed, so it is unknown which
    /// action would have been taken
    #[serde(rename = "create or update")]
    CreateOrUpdate,
}

impl UpsertAction {
    /// Verb form used in reports, e.g. "create"
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertAction::Create => "create",
            UpsertAction::Update => "update",
            UpsertAction::CreateOrUpdate => "create or update",
        }
    }

    /// Past tense used in reports, e.g. "created"
    pub fn past_tense(&self) -> &'static str {
        match self {
            UpsertAction::Create => "created",
            UpsertAction::Update => "updated",
            UpsertAction::CreateOrUpdate => "created or updated",
        }
    }
}

impl fmt::Display for UpsertAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful value of a command in the middleware chain
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub action: UpsertAction,
    pub entity: Entity,
}

impl Outcome {
    pub fn new(action: UpsertAction, entity: Entity) -> Self {
        Self { action, entity }
    }
}

/// Failed value of a command in the middleware chain
///
/// Besides the error, a failure keeps the action that was being attempted
/// when it is known, so reports can say "Unable to create book".
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub error: LoaderError,
    pub action: Option<UpsertAction>,
}

impl Failure {
    pub fn new(error: LoaderError) -> Self {
        Self {
            error,
            action: None,
        }
    }

    /// Tag the failure with the attempted action
    pub fn with_action(mut self, action: UpsertAction) -> Self {
        self.action = Some(action);
        self
    }
}

impl From<LoaderError> for Failure {
    fn from(error: LoaderError) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Result of running one record through the middleware chain
pub type CommandResult = Result<Outcome, Failure>;

/// Aggregate of per-record results
///
/// The list is a success only when every member succeeded. Values are kept
/// for every record even when the aggregate fails.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultList {
    results: Vec<CommandResult>,
}

impl ResultList {
    pub fn new(results: Vec<CommandResult>) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &[CommandResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.results.iter().all(Result::is_ok)
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// One entry per record; failures have no value
    pub fn values(&self) -> Vec<Option<&Outcome>> {
        self.results.iter().map(|result| result.as_ref().ok()).collect()
    }

    /// Errors of the failed records, in record order
    pub fn errors(&self) -> Vec<&LoaderError> {
        self.results
            .iter()
            .filter_map(|result| result.as_ref().err())
            .map(|failure| &failure.error)
            .collect()
    }

    /// Number of successful records
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|result| result.is_ok()).count()
    }

    /// The aggregate error, if any record failed
    pub fn error(&self) -> Option<LoaderError> {
        if self.is_success() {
            return None;
        }

        Some(LoaderError::Multiple {
            errors: self.errors().into_iter().cloned().collect(),
        })
    }

    /// Convert into a plain result, discarding partial values on failure
    pub fn into_result(self) -> Result<Vec<Outcome>, LoaderError> {
        if let Some(error) = self.error() {
            return Err(error);
        }

        Ok(self.results.into_iter().filter_map(Result::ok).collect())
    }
}

impl FromIterator<CommandResult> for ResultList {
    fn from_iter<I: IntoIterator<Item = CommandResult>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
