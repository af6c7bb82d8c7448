//! Outbound change notifications over websocket.
//!
//! # Responsibility
//! - Turn committed changelog entries into `{"event", "resource"}` messages.
//! - Keep one persistent connection to the subscriber service and deliver
//!   messages in the background.
//!
//! # Invariants
//! - Sending never blocks and never fails the caller.
//! - Undelivered messages stay pending until a later attempt succeeds.

pub mod client;
pub mod message;

use std::error::Error;
use std::fmt::{Display, Formatter};

pub use client::{ChangeNotificationClient, RECONNECT_DELAY};
pub use message::{messages_for, ServerMessage};

#[derive(Debug)]
pub enum NotifierError {
    /// `start` was called outside a tokio runtime.
    NoRuntime,
    Encode(serde_json::Error),
    /// The background task panicked or was aborted.
    Worker(String),
}

impl Display for NotifierError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoRuntime => write!(f, "change notification client needs a tokio runtime"),
            Self::Encode(err) => write!(f, "failed to encode notification: {err}"),
            Self::Worker(message) => write!(f, "notification worker failed: {message}"),
        }
    }
}

impl Error for NotifierError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Encode(err) => Some(err),
            Self::NoRuntime | Self::Worker(_) => None,
        }
    }
}

impl From<serde_json::Error> for NotifierError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encode(value)
    }
}
