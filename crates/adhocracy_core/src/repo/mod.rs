//! Repository layer over the content store schema.
//!
//! # Responsibility
//! - Resource tree persistence (`resource_repo`).
//! - Reference graph with indexed back-reference lookup (`reference_repo`).
//! - Per-item tag registry (`tag_repo`).
//!
//! # Invariants
//! - Repositories borrow a connection; they never open or commit
//!   transactions themselves, so every write joins the caller's unit of work.
//! - Read paths reject invalid persisted state instead of masking it.

pub mod reference_repo;
pub mod resource_repo;
pub mod tag_repo;
