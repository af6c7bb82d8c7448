//! Content events raised by the version coordinator and the dispatcher.
//!
//! # Responsibility
//! - Define the payloads handlers receive.
//! - Define the handler callback signature.
//!
//! # Invariants
//! - Events are plain data; raising one has no side effect beyond the
//!   registered handlers.

use crate::error::CoreResult;
use crate::model::resource::ResourcePath;
use crate::registry::VERSIONABLE_SHEET;
use crate::service::version_service::VersionCoordinator;
use std::sync::Arc;

/// Discriminant used to key handler subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewVersionAdded,
    ReferenceTargetReplaced,
}

/// An item gained `new_version`; `old_version` is `None` for the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVersionAdded {
    pub item: ResourcePath,
    pub old_version: Option<ResourcePath>,
    pub new_version: ResourcePath,
    pub creator: Option<String>,
    pub autoupdated: bool,
}

/// `source.sheet.field` points at `old_version`, which now has `new_version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTargetReplaced {
    pub source: ResourcePath,
    pub sheet: String,
    pub field: String,
    pub old_version: ResourcePath,
    pub new_version: ResourcePath,
    pub creator: Option<String>,
    pub root_versions: Vec<ResourcePath>,
    pub is_batchmode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEvent {
    NewVersionAdded(NewVersionAdded),
    ReferenceTargetReplaced(ReferenceTargetReplaced),
}

impl ContentEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::NewVersionAdded(_) => EventKind::NewVersionAdded,
            Self::ReferenceTargetReplaced(_) => EventKind::ReferenceTargetReplaced,
        }
    }

    /// Sheet the event is about, used to match sheet-scoped subscriptions.
    pub fn sheet(&self) -> &str {
        match self {
            Self::NewVersionAdded(_) => VERSIONABLE_SHEET,
            Self::ReferenceTargetReplaced(event) => event.sheet.as_str(),
        }
    }
}

/// Handler callback. Receives the coordinator of the running unit of work so
/// policies can write through the same transaction.
pub type EventHandler =
    Arc<dyn Fn(&VersionCoordinator<'_>, &ContentEvent) -> CoreResult<()> + Send + Sync>;

/// Wraps a closure as an [`EventHandler`].
pub fn handler<F>(callback: F) -> EventHandler
where
    F: Fn(&VersionCoordinator<'_>, &ContentEvent) -> CoreResult<()> + Send + Sync + 'static,
{
    Arc::new(callback)
}
