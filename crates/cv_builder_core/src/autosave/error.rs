//! crates/cv_builder_core/src/autosave/error.rs

use std::time::Duration;
use uuid::Uuid;

use crate::ports::PortError;

/// Why a save cycle did not reach the backend. None of these are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The primary name field is empty.
    MissingName,
    /// Nothing changed since the last successful write.
    Unchanged,
    /// Another flush for this session has not resolved yet.
    InFlight,
    /// The editor session has been torn down.
    Closed,
}

/// The result of a save cycle that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(Uuid),
    Skipped(SkipReason),
}

/// Errors produced on the flush path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SaveError {
    #[error("Please log in to save")]
    AuthRequired,

    #[error("Could not encode the profile image: {0}")]
    Encoding(String),

    #[error("Could not save to the database: {0}")]
    Storage(#[from] PortError),

    #[error("Saving timed out after {0:?}")]
    Timeout(Duration),
}

pub type SaveResult = Result<SaveOutcome, SaveError>;
