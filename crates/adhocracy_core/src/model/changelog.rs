//! Per-request changelog of touched resources.
//!
//! # Invariants
//! - One entry per resource path; later marks merge into the same entry.
//! - Entries live only as long as the unit of work; they are handed to the
//!   change notification client after commit and dropped on rollback.

use crate::model::resource::ResourcePath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resource event names sent to websocket subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeEvent {
    Created,
    Modified,
    Removed,
}

impl ChangeEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Removed => "removed",
        }
    }
}

/// Pending change record for one resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub resource: ResourcePath,
    pub created: bool,
    pub modified: bool,
    pub removed: bool,
    /// Set on a version once a successor was created in the same request.
    pub followed_by: Option<ResourcePath>,
    /// Set on an item when its `LAST` tag moved in the same request.
    pub last_version: Option<ResourcePath>,
}

impl ChangelogEntry {
    pub fn new(resource: ResourcePath) -> Self {
        Self {
            resource,
            created: false,
            modified: false,
            removed: false,
            followed_by: None,
            last_version: None,
        }
    }

    /// Events in emission order: created, modified, removed.
    pub fn events(&self) -> Vec<ChangeEvent> {
        let mut events = Vec::with_capacity(3);
        if self.created {
            events.push(ChangeEvent::Created);
        }
        if self.modified {
            events.push(ChangeEvent::Modified);
        }
        if self.removed {
            events.push(ChangeEvent::Removed);
        }
        events
    }
}

/// Changelog owned by one unit of work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changelog {
    entries: BTreeMap<ResourcePath, ChangelogEntry>,
}

impl Changelog {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, resource: &ResourcePath) -> &mut ChangelogEntry {
        self.entries
            .entry(resource.clone())
            .or_insert_with(|| ChangelogEntry::new(resource.clone()))
    }

    pub fn mark_created(&mut self, resource: &ResourcePath) {
        self.entry(resource).created = true;
    }

    /// Marks a modification; no-op for resources created in this changelog.
    pub fn mark_modified(&mut self, resource: &ResourcePath) {
        let entry = self.entry(resource);
        if !entry.created {
            entry.modified = true;
        }
    }

    pub fn mark_removed(&mut self, resource: &ResourcePath) {
        self.entry(resource).removed = true;
    }

    pub fn set_followed_by(&mut self, version: &ResourcePath, successor: &ResourcePath) {
        self.entry(version).followed_by = Some(successor.clone());
    }

    pub fn set_last_version(&mut self, item: &ResourcePath, version: &ResourcePath) {
        self.entry(item).last_version = Some(version.clone());
    }

    pub fn get(&self, resource: &ResourcePath) -> Option<&ChangelogEntry> {
        self.entries.get(resource)
    }

    pub fn was_created(&self, resource: &ResourcePath) -> bool {
        self.get(resource).is_some_and(|entry| entry.created)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by resource path.
    pub fn entries(&self) -> impl Iterator<Item = &ChangelogEntry> {
        self.entries.values()
    }

    pub fn into_entries(self) -> Vec<ChangelogEntry> {
        self.entries.into_values().collect()
    }
}
