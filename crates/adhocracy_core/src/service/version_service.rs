//! Version creation coordinator and unit-of-work runner.
//!
//! # Responsibility
//! - Create items, resources and item versions through one transaction.
//! - After a version exists: rebind `LAST`, notify per predecessor and
//!   trigger the reference fan-out.
//! - Track the unit-of-work phase and its changelog.
//!
//! # Invariants
//! - `LAST` is rebound before the first `NewVersionAdded` is raised.
//! - Committed item versions are never rewritten; only versions created in
//!   the running unit of work may be changed in place.
//! - A failed or fork-rejected unit of work leaves no persisted trace.

use crate::error::{CoreError, CoreResult};
use crate::events::{ContentEvent, NewVersionAdded};
use crate::model::changelog::Changelog;
use crate::model::reference::{Reference, SheetReferences};
use crate::model::resource::{version_name, Resource, ResourceKind, ResourcePath};
use crate::registry::{ContentRegistry, FOLLOWS_FIELD, VERSIONABLE_SHEET};
use crate::repo::reference_repo::{ReferenceGraph, SqliteReferenceGraph};
use crate::repo::resource_repo::{NewResource, ResourceRepository, SqliteResourceRepository};
use crate::repo::tag_repo::{SqliteTagRegistry, TagRegistry, LAST_TAG};
use crate::service::dispatcher::notify_referencing_resources;
use crate::websocket::ChangeNotificationClient;
use log::{debug, error, info, warn};
use rusqlite::{Connection, TransactionBehavior};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

/// Lifecycle of one version-creation unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pending,
    LastTagUpdated,
    NotifyingPredecessors,
    FanningOutReferences,
    Committed,
    ForkRejected,
    Failed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::LastTagUpdated => "last_tag_updated",
            Self::NotifyingPredecessors => "notifying_predecessors",
            Self::FanningOutReferences => "fanning_out_references",
            Self::Committed => "committed",
            Self::ForkRejected => "fork_rejected",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::ForkRejected | Self::Failed)
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options passed along with a freshly created version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreationOptions {
    /// Versions the caller edits from; auto-updating them would fork.
    pub root_versions: Vec<ResourcePath>,
    /// Principal path recorded as creator and forwarded to events.
    pub creator: Option<String>,
    /// Several versions of the same item may be created in this unit of work.
    pub is_batchmode: bool,
    /// The version is created by the auto-update policy, not by the caller.
    pub autoupdated: bool,
}

/// Content of a new item version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewVersion {
    pub content_type: String,
    /// Predecessor versions; empty only for the first version of an item.
    pub follows: Vec<ResourcePath>,
    /// Sheet reference fields of the new version.
    pub references: Vec<SheetReferences>,
}

/// Result of a committed unit of work.
#[derive(Debug)]
pub struct CommittedWork<T> {
    pub unit_id: Uuid,
    pub value: T,
    /// Changes to forward to the change notification client.
    pub changelog: Changelog,
}

type VisitKey = (ResourcePath, ResourcePath, String, String);

/// Coordinates version creation and fan-out inside one transaction.
pub struct VersionCoordinator<'tx> {
    unit_id: Uuid,
    registry: &'tx ContentRegistry,
    resources: SqliteResourceRepository<'tx>,
    graph: SqliteReferenceGraph<'tx>,
    tags: SqliteTagRegistry<'tx>,
    phase: Cell<Phase>,
    visited: RefCell<HashSet<VisitKey>>,
    changelog: RefCell<Changelog>,
}

impl<'tx> VersionCoordinator<'tx> {
    /// Builds a coordinator over an open transaction (or plain connection).
    pub fn try_new(conn: &'tx Connection, registry: &'tx ContentRegistry) -> CoreResult<Self> {
        Ok(Self {
            unit_id: Uuid::new_v4(),
            registry,
            resources: SqliteResourceRepository::try_new(conn)?,
            graph: SqliteReferenceGraph::try_new(conn, registry)?,
            tags: SqliteTagRegistry::try_new(conn)?,
            phase: Cell::new(Phase::Pending),
            visited: RefCell::new(HashSet::new()),
            changelog: RefCell::new(Changelog::new()),
        })
    }

    pub fn unit_id(&self) -> Uuid {
        self.unit_id
    }

    pub fn registry(&self) -> &'tx ContentRegistry {
        self.registry
    }

    pub fn resources(&self) -> &SqliteResourceRepository<'tx> {
        &self.resources
    }

    pub fn graph(&self) -> &SqliteReferenceGraph<'tx> {
        &self.graph
    }

    pub fn tags(&self) -> &SqliteTagRegistry<'tx> {
        &self.tags
    }

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    /// Snapshot of the changelog collected so far.
    pub fn changelog(&self) -> Changelog {
        self.changelog.borrow().clone()
    }

    /// Whether `resource` was created by this unit of work.
    pub fn was_created_in_unit(&self, resource: &ResourcePath) -> bool {
        self.changelog.borrow().was_created(resource)
    }

    /// Whether `version` may still be changed in place: only versions
    /// created by this unit of work are.
    pub fn is_mutable_version(&self, version: &ResourcePath) -> bool {
        self.was_created_in_unit(version)
    }

    /// Ends the unit of work with a terminal phase and releases the
    /// transaction borrow.
    pub fn finish(self, phase: Phase) -> Changelog {
        self.advance(phase);
        self.changelog.into_inner()
    }

    pub(crate) fn advance(&self, phase: Phase) {
        let previous = self.phase.replace(phase);
        if previous != phase {
            debug!(
                "event=unit_phase module=version unit_id={} from={} to={}",
                self.unit_id, previous, phase
            );
        }
    }

    /// Records `(old_version, source, sheet, field)` as visited.
    ///
    /// Returns `false` when the edge was already visited in this unit.
    pub(crate) fn mark_visited(&self, reference: &Reference) -> bool {
        self.visited.borrow_mut().insert((
            reference.target.clone(),
            reference.source.clone(),
            reference.sheet.clone(),
            reference.field.clone(),
        ))
    }

    /// Creates a non-versioned resource (pool or simple leaf).
    pub fn create_resource(
        &self,
        parent: &ResourcePath,
        name: &str,
        kind: ResourceKind,
        content_type: &str,
        creator: Option<&str>,
    ) -> CoreResult<Resource> {
        if matches!(kind, ResourceKind::Item | ResourceKind::ItemVersion) {
            return Err(CoreError::validation(
                "kind",
                "use create_item / create_item_version for versioned content",
            ));
        }
        self.insert_resource(parent, name, kind, content_type, creator)
    }

    /// Creates an empty item; its first version is added separately.
    pub fn create_item(
        &self,
        parent: &ResourcePath,
        name: &str,
        content_type: &str,
        creator: Option<&str>,
    ) -> CoreResult<Resource> {
        self.insert_resource(parent, name, ResourceKind::Item, content_type, creator)
    }

    fn insert_resource(
        &self,
        parent: &ResourcePath,
        name: &str,
        kind: ResourceKind,
        content_type: &str,
        creator: Option<&str>,
    ) -> CoreResult<Resource> {
        let resource = self.resources.create_resource(&NewResource {
            parent,
            name,
            kind,
            content_type,
            creator,
        })?;
        let mut changelog = self.changelog.borrow_mut();
        changelog.mark_created(&resource.path);
        changelog.mark_modified(parent);
        Ok(resource)
    }

    /// Writes a reference field of a non-versioned resource, or of a version
    /// that is still mutable in this unit of work.
    pub fn set_references(
        &self,
        source: &ResourcePath,
        sheet: &str,
        field: &str,
        targets: &[ResourcePath],
    ) -> CoreResult<()> {
        self.ensure_writable(source)?;
        if sheet == VERSIONABLE_SHEET && field == FOLLOWS_FIELD {
            return Err(CoreError::validation(
                FOLLOWS_FIELD,
                "predecessors are fixed at version creation",
            ));
        }
        self.graph.set_references(source, sheet, field, targets)?;
        self.record_modified(source)
    }

    /// Rewrites `source.sheet.field: old -> new` without creating a version.
    pub fn rewrite_reference(
        &self,
        source: &ResourcePath,
        sheet: &str,
        field: &str,
        old: &ResourcePath,
        new: &ResourcePath,
    ) -> CoreResult<usize> {
        self.ensure_writable(source)?;
        let changed = self.graph.replace_target(source, sheet, field, old, new)?;
        if changed > 0 {
            self.record_modified(source)?;
        }
        Ok(changed)
    }

    fn ensure_writable(&self, source: &ResourcePath) -> CoreResult<()> {
        let resource = self.resources.require_resource(source)?;
        if resource.is_item_version()
            && !self.is_mutable_version(source)
            && self.resources.find_item(source)?.is_some()
        {
            return Err(CoreError::validation(
                "resource",
                format!("{source} is a committed item version and cannot change"),
            ));
        }
        Ok(())
    }

    fn record_modified(&self, resource: &ResourcePath) -> CoreResult<()> {
        self.resources.touch(resource)?;
        self.changelog.borrow_mut().mark_modified(resource);
        Ok(())
    }

    /// Creates the next version of `item` and runs the after-creation steps.
    pub fn create_item_version(
        &self,
        item: &ResourcePath,
        version: NewVersion,
        options: &CreationOptions,
    ) -> CoreResult<ResourcePath> {
        let item_resource = self.resources.require_resource(item)?;
        if item_resource.kind != ResourceKind::Item {
            return Err(CoreError::validation(
                "item",
                format!("{item} is not an item"),
            ));
        }
        for predecessor in &version.follows {
            let found = self.resources.find_item(predecessor)?;
            let belongs = found.is_some_and(|found| &found.path == item);
            if !belongs || !self.resources.require_resource(predecessor)?.is_item_version() {
                return Err(CoreError::validation(
                    FOLLOWS_FIELD,
                    format!("{predecessor} is not a version of {item}"),
                ));
            }
        }
        if version
            .references
            .iter()
            .any(|refs| refs.sheet == VERSIONABLE_SHEET && refs.field == FOLLOWS_FIELD)
        {
            return Err(CoreError::validation(
                FOLLOWS_FIELD,
                "pass predecessors through `follows`, not as sheet references",
            ));
        }

        let number = self
            .resources
            .count_children(item, ResourceKind::ItemVersion)?;
        let name = version_name(number);
        let created = self.insert_resource(
            item,
            &name,
            ResourceKind::ItemVersion,
            &version.content_type,
            options.creator.as_deref(),
        )?;
        let new_version = created.path;

        self.graph
            .set_references(&new_version, VERSIONABLE_SHEET, FOLLOWS_FIELD, &version.follows)?;
        for refs in &version.references {
            self.graph
                .set_references(&new_version, &refs.sheet, &refs.field, &refs.targets)?;
        }
        {
            let mut changelog = self.changelog.borrow_mut();
            for predecessor in &version.follows {
                changelog.set_followed_by(predecessor, &new_version);
            }
        }

        info!(
            "event=version_create module=version status=ok unit_id={} item={} version={} follows={} autoupdated={}",
            self.unit_id,
            item,
            new_version,
            version.follows.len(),
            options.autoupdated
        );

        self.after_version_created(&new_version, options)?;
        Ok(new_version)
    }

    /// After-creation steps for an existing item version.
    ///
    /// 1. Find the enclosing item; a detached version is a no-op.
    /// 2. Rebind `LAST`.
    /// 3. Notify per predecessor and fan out, or notify once with no
    ///    predecessor for the first version.
    pub fn after_version_created(
        &self,
        new_version: &ResourcePath,
        options: &CreationOptions,
    ) -> CoreResult<()> {
        let Some(item) = self.resources.find_item(new_version)? else {
            debug!(
                "event=version_after_create module=version status=skipped unit_id={} version={} reason=no_item",
                self.unit_id, new_version
            );
            return Ok(());
        };

        self.tags.set_tag(&item.path, LAST_TAG, new_version)?;
        {
            let mut changelog = self.changelog.borrow_mut();
            changelog.set_last_version(&item.path, new_version);
            changelog.mark_modified(&item.path);
        }
        self.advance(Phase::LastTagUpdated);

        let follows = self
            .graph
            .get_references(new_version, VERSIONABLE_SHEET, FOLLOWS_FIELD)?;
        if follows.is_empty() {
            self.advance(Phase::NotifyingPredecessors);
            return self.notify(&ContentEvent::NewVersionAdded(NewVersionAdded {
                item: item.path,
                old_version: None,
                new_version: new_version.clone(),
                creator: options.creator.clone(),
                autoupdated: options.autoupdated,
            }));
        }

        for old_version in &follows {
            self.advance(Phase::NotifyingPredecessors);
            self.notify(&ContentEvent::NewVersionAdded(NewVersionAdded {
                item: item.path.clone(),
                old_version: Some(old_version.clone()),
                new_version: new_version.clone(),
                creator: options.creator.clone(),
                autoupdated: options.autoupdated,
            }))?;
            self.advance(Phase::FanningOutReferences);
            notify_referencing_resources(self, old_version, new_version, options)?;
        }
        Ok(())
    }

    /// Invokes every matching handler in registration order.
    ///
    /// Stops at and returns the first handler error.
    pub fn notify(&self, event: &ContentEvent) -> CoreResult<()> {
        for (name, handler) in self.registry.handlers_for(event) {
            debug!(
                "event=notify module=version unit_id={} kind={:?} sheet={} handler={}",
                self.unit_id,
                event.kind(),
                event.sheet(),
                name
            );
            handler(self, event)?;
        }
        Ok(())
    }
}

/// Runs units of work against a connection with a shared registry.
#[derive(Debug, Clone, Copy)]
pub struct VersionService<'reg> {
    registry: &'reg ContentRegistry,
    notifier: Option<&'reg ChangeNotificationClient>,
}

impl<'reg> VersionService<'reg> {
    pub fn new(registry: &'reg ContentRegistry) -> Self {
        Self {
            registry,
            notifier: None,
        }
    }

    /// Forwards the changelog of every committed unit to `notifier`.
    pub fn with_notifier(mut self, notifier: &'reg ChangeNotificationClient) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn registry(&self) -> &'reg ContentRegistry {
        self.registry
    }

    /// Runs `work` in one immediate transaction.
    ///
    /// Commits, hands the changelog to the notifier (if any) and returns it
    /// when `work` succeeds; otherwise rolls back, notifies nobody and
    /// returns the error unchanged.
    pub fn run<T, F>(&self, conn: &mut Connection, work: F) -> CoreResult<CommittedWork<T>>
    where
        F: FnOnce(&VersionCoordinator<'_>) -> CoreResult<T>,
    {
        let started_at = Instant::now();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let coordinator = VersionCoordinator::try_new(&tx, self.registry)?;
        let unit_id = coordinator.unit_id();

        match work(&coordinator) {
            Ok(value) => {
                let changelog = coordinator.finish(Phase::Committed);
                tx.commit()?;
                if let Some(notifier) = self.notifier {
                    notifier.send_messages(changelog.entries());
                }
                info!(
                    "event=unit_of_work module=version status=ok unit_id={} phase={} changes={} duration_ms={}",
                    unit_id,
                    Phase::Committed,
                    changelog.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(CommittedWork {
                    unit_id,
                    value,
                    changelog,
                })
            }
            Err(err) => {
                let phase = if err.is_fork() {
                    Phase::ForkRejected
                } else {
                    Phase::Failed
                };
                let reached = coordinator.phase();
                drop(coordinator.finish(phase));
                if let Err(rollback_err) = tx.rollback() {
                    error!(
                        "event=unit_of_work module=version status=error unit_id={} error_code=rollback_failed error={}",
                        unit_id, rollback_err
                    );
                }
                warn!(
                    "event=unit_of_work module=version status=error unit_id={} phase={} reached={} duration_ms={} error_code={} error={}",
                    unit_id,
                    phase,
                    reached,
                    started_at.elapsed().as_millis(),
                    err.code(),
                    err
                );
                Err(err)
            }
        }
    }
}
