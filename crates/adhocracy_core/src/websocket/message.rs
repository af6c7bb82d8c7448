use crate::model::changelog::ChangelogEntry;
use crate::websocket::NotifierError;
use serde::{Deserialize, Serialize};

/// Wire message: one resource event.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerMessage {
    pub event: String,
    pub resource: String,
}

impl ServerMessage {
    pub fn encode(&self) -> Result<String, NotifierError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Messages for one changelog entry, in created/modified/removed order.
pub fn messages_for(entry: &ChangelogEntry) -> Vec<ServerMessage> {
    entry
        .events()
        .into_iter()
        .map(|event| ServerMessage {
            event: event.as_str().to_string(),
            resource: entry.resource.as_str().to_string(),
        })
        .collect()
}
