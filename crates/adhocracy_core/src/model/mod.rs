//! Content domain model.
//!
//! # Responsibility
//! - Define resource identity (`ResourcePath`) and resource kinds.
//! - Define reference edges and per-request changelog records.
//!
//! # Invariants
//! - A resource is identified by its absolute path; paths are never reused.
//! - Item versions are append-only; nothing in the model deletes them.

pub mod changelog;
pub mod reference;
pub mod resource;
