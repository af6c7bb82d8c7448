//! Core error taxonomy for content, versioning and fan-out operations.
//!
//! # Invariants
//! - Every variant aborts the enclosing unit of work; nothing is swallowed.
//! - `ForkNotAllowed` carries enough context to render the 400 response.

use crate::db::DbError;
use crate::model::resource::{PathError, ResourcePath};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CoreResult<T> = Result<T, CoreError>;

/// Auto-update would fork a version reachable from a caller-supplied root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkNotAllowedError {
    /// Resource whose reference could not be updated.
    pub resource: ResourcePath,
    pub sheet: String,
    pub field: String,
    pub old_version: ResourcePath,
    pub new_version: ResourcePath,
}

impl Display for ForkNotAllowedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "auto update would fork {} ({}.{}: {} -> {})",
            self.resource, self.sheet, self.field, self.old_version, self.new_version
        )
    }
}

impl Error for ForkNotAllowedError {}

#[derive(Debug)]
pub enum CoreError {
    /// Lookup failure; `entity` names what was looked up.
    NotFound {
        entity: &'static str,
        path: ResourcePath,
    },
    ForkNotAllowed(ForkNotAllowedError),
    /// Caller input is inconsistent; `name` is the offending field.
    Validation { name: String, message: String },
    Path(PathError),
    Db(DbError),
    /// Persisted rows cannot be read back into the model.
    InvalidData(String),
    /// A subscribed handler failed for a reason of its own.
    Handler { handler: String, message: String },
}

impl CoreError {
    pub fn not_found(entity: &'static str, path: &ResourcePath) -> Self {
        Self::NotFound {
            entity,
            path: path.clone(),
        }
    }

    pub fn validation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn handler(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            handler: handler.into(),
            message: message.into(),
        }
    }

    pub fn is_fork(&self) -> bool {
        matches!(self, Self::ForkNotAllowed(_))
    }

    /// Short, stable error code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::ForkNotAllowed(_) => "fork_not_allowed",
            Self::Validation { .. } => "validation",
            Self::Path(_) => "invalid_path",
            Self::Db(_) => "db",
            Self::InvalidData(_) => "invalid_data",
            Self::Handler { .. } => "handler",
        }
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { entity, path } => write!(f, "{entity} not found: {path}"),
            Self::ForkNotAllowed(err) => write!(f, "{err}"),
            Self::Validation { name, message } => write!(f, "invalid `{name}`: {message}"),
            Self::Path(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted content data: {message}"),
            Self::Handler { handler, message } => write!(f, "handler `{handler}` failed: {message}"),
        }
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ForkNotAllowed(err) => Some(err),
            Self::Path(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound { .. } | Self::Validation { .. }
            | Self::InvalidData(_)
            | Self::Handler { .. } => None,
        }
    }
}

impl From<ForkNotAllowedError> for CoreError {
    fn from(value: ForkNotAllowedError) -> Self {
        Self::ForkNotAllowed(value)
    }
}

impl From<PathError> for CoreError {
    fn from(value: PathError) -> Self {
        Self::Path(value)
    }
}

impl From<DbError> for CoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
