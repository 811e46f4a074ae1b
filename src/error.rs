// Rotation errors - every failure a user action can hit
//
// All kinds are recoverable: the action is aborted, in-memory state is left
// untouched, and the caller may retry with corrected input.

use crate::driver::DriverId;
use crate::ledger::EntryId;
use thiserror::Error;

/// What an operation referenced that does not exist
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Driver(DriverId),
    Entry { driver: DriverId, entry: EntryId },
    Name(String),
}

impl std::fmt::Display for Missing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Missing::Driver(id) => write!(f, "driver {}", id),
            Missing::Entry { driver, entry } => write!(f, "entry {} of driver {}", entry, driver),
            Missing::Name(name) => write!(f, "driver named '{}'", name),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RotationError {
    /// Non-numeric, non-finite or non-positive monetary input
    #[error("Invalid freight value: {0}")]
    InvalidValue(String),

    #[error("Driver name must not be empty")]
    EmptyName,

    /// Case-insensitive collision on driver creation
    #[error("A driver named '{0}' already exists")]
    DuplicateName(String),

    #[error("Not found: {0}")]
    NotFound(Missing),

    /// Penalty and refusal entries can only be deleted
    #[error("Entry {0} is a penalty and cannot be edited")]
    Immutable(EntryId),

    #[error("Driver '{0}' is paused")]
    DriverPaused(String),

    /// Serialization or storage write failure
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
}

impl RotationError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RotationError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, RotationError>;
