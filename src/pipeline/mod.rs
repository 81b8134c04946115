/// Error and result types shared by every stage of a load
///
/// Reading, options resolution and the middleware chain all report
/// through these types.

mod error;
mod result;

pub use error::{Format, LoaderError};
pub use result::{CommandResult, Failure, Outcome, ResultList, UpsertAction};
