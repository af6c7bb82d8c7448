//! Content versioning core for adhocracy.
//!
//! Items own a chain of immutable versions. Creating a version moves the
//! item's `LAST` tag, tells subscribers about the new version, and lets the
//! auto-update policy carry references that pointed at the predecessor over
//! to the successor. Failures render as JSON HTTP errors, and committed
//! changes are pushed to a websocket subscriber.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod logging;
pub mod model;
pub mod registry;
pub mod repo;
pub mod rest;
pub mod service;
pub mod websocket;

pub use config::{ConfigError, Settings};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use error::{CoreError, CoreResult, ForkNotAllowedError};
pub use events::{handler, ContentEvent, EventHandler, EventKind};
pub use logging::{
    default_log_level, init_from_settings, init_logging, logging_status, LogTarget,
};
pub use model::changelog::{ChangeEvent, Changelog, ChangelogEntry};
pub use model::reference::{Reference, SheetReferences};
pub use model::resource::{PathError, Resource, ResourceKind, ResourcePath};
pub use registry::{ContentRegistry, ReferenceField, RegistryError};
pub use repo::reference_repo::ReferenceGraph;
pub use repo::resource_repo::{Item, NewResource, ResourceRepository};
pub use repo::tag_repo::{TagRegistry, LAST_TAG};
pub use rest::error::{guard, render, ApiError, ErrorBody, ErrorEntry, JsonHttpError};
pub use service::autoupdate::registry_with_defaults;
pub use service::version_service::{
    CommittedWork, CreationOptions, NewVersion, Phase, VersionCoordinator, VersionService,
};
pub use websocket::{ChangeNotificationClient, NotifierError};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
