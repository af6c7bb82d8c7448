//! REST error contract.
//!
//! # Responsibility
//! - Render core and HTTP failures as structured JSON error bodies
//!   (`error`).
//! - Redact secrets from request data before it reaches the logs
//!   (`redact`).
//!
//! # Invariants
//! - Rendering never fails and never panics; unknown failures become 500.
//! - Passwords, user tokens and cookies are never written to the log.

pub mod error;
pub mod redact;
