//! Versioning use-case services.
//!
//! # Responsibility
//! - Run version creation inside one caller-owned unit of work
//!   (`version_service`).
//! - Fan new versions out to referencing resources (`dispatcher`).
//! - Provide the default auto-update policy handler (`autoupdate`).
//!
//! # Invariants
//! - The `LAST` tag moves before any event about the new version is raised.
//! - Any error rolls back every tag, reference and resource write of the
//!   unit of work.

pub mod autoupdate;
pub mod dispatcher;
pub mod version_service;
