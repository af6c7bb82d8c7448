//! Default auto-update policy for references to superseded versions.
//!
//! # Responsibility
//! - Decide per `ReferenceTargetReplaced` whether to ignore the reference,
//!   rewrite it in place, create a new version of the referencing resource
//!   or refuse with a fork error.
//!
//! # Invariants
//! - A resource that is, or is a tree ancestor of, a root version is never
//!   auto-updated; the unit of work fails with `ForkNotAllowed` instead.
//! - Committed versions are never changed in place.
//! - Once an item has a version created in this unit of work, later updates
//!   for that item rewrite the version in place. At most one auto-updated
//!   version per item and unit of work bounds recursion on reference cycles.

use crate::error::{CoreResult, ForkNotAllowedError};
use crate::events::{handler, ContentEvent, EventKind, ReferenceTargetReplaced};
use crate::model::reference::SheetReferences;
use crate::model::resource::ResourcePath;
use crate::registry::{ContentRegistry, FOLLOWS_FIELD, VERSIONABLE_SHEET};
use crate::repo::reference_repo::ReferenceGraph;
use crate::repo::resource_repo::ResourceRepository;
use crate::repo::tag_repo::{TagRegistry, LAST_TAG};
use crate::service::version_service::{CreationOptions, NewVersion, VersionCoordinator};
use log::info;

/// Subscription name of the default policy.
pub const AUTOUPDATE_HANDLER: &str = "autoupdate_references";

/// Outcome of the policy for one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoUpdateDecision {
    /// Leave the reference untouched.
    Ignore(&'static str),
    /// Rewrite the reference on `target` without a new version.
    RewriteInPlace { target: ResourcePath },
    /// Create a new version of `item` following the referencing version.
    NewVersion { item: ResourcePath },
}

/// Subscribes the default policy to every sheet.
pub fn register(registry: &mut ContentRegistry) {
    registry.subscribe(
        EventKind::ReferenceTargetReplaced,
        None,
        AUTOUPDATE_HANDLER,
        handler(autoupdate_reference),
    );
}

/// Registry with built-in types and the default policy subscribed.
pub fn registry_with_defaults() -> ContentRegistry {
    let mut registry = ContentRegistry::new();
    register(&mut registry);
    registry
}

fn autoupdate_reference(
    coordinator: &VersionCoordinator<'_>,
    event: &ContentEvent,
) -> CoreResult<()> {
    let ContentEvent::ReferenceTargetReplaced(event) = event else {
        return Ok(());
    };
    let decision = decide(coordinator, event)?;
    info!(
        "event=autoupdate module=autoupdate unit_id={} source={} sheet={} field={} old={} new={} decision={:?}",
        coordinator.unit_id(),
        event.source,
        event.sheet,
        event.field,
        event.old_version,
        event.new_version,
        decision
    );
    apply(coordinator, event, decision)
}

/// Evaluates the policy without writing anything.
pub fn decide(
    coordinator: &VersionCoordinator<'_>,
    event: &ReferenceTargetReplaced,
) -> CoreResult<AutoUpdateDecision> {
    let follows_new_versions = coordinator
        .registry()
        .reference_field(&event.sheet, &event.field)
        .is_some_and(|declared| declared.autoupdate);
    if !follows_new_versions {
        return Ok(AutoUpdateDecision::Ignore("field_not_autoupdated"));
    }

    let current = coordinator
        .graph()
        .get_references(&event.source, &event.sheet, &event.field)?;
    if !current.contains(&event.old_version) {
        return Ok(AutoUpdateDecision::Ignore("reference_already_moved"));
    }

    let forks_root = event
        .root_versions
        .iter()
        .any(|root| *root == event.source || event.source.is_ancestor_of(root));
    if forks_root {
        return Err(ForkNotAllowedError {
            resource: event.source.clone(),
            sheet: event.sheet.clone(),
            field: event.field.clone(),
            old_version: event.old_version.clone(),
            new_version: event.new_version.clone(),
        }
        .into());
    }

    let source = coordinator.resources().require_resource(&event.source)?;
    if !source.is_item_version() {
        return Ok(AutoUpdateDecision::RewriteInPlace {
            target: event.source.clone(),
        });
    }
    let Some(item) = coordinator.resources().find_item(&event.source)? else {
        return Ok(AutoUpdateDecision::RewriteInPlace {
            target: event.source.clone(),
        });
    };

    let last = coordinator.tags().get_tag(&item.path, LAST_TAG)?;
    match last {
        Some(last) if coordinator.is_mutable_version(&last) => {
            Ok(AutoUpdateDecision::RewriteInPlace { target: last })
        }
        Some(last) if last == event.source => {
            Ok(AutoUpdateDecision::NewVersion { item: item.path })
        }
        _ => Ok(AutoUpdateDecision::Ignore("historical_version")),
    }
}

fn apply(
    coordinator: &VersionCoordinator<'_>,
    event: &ReferenceTargetReplaced,
    decision: AutoUpdateDecision,
) -> CoreResult<()> {
    match decision {
        AutoUpdateDecision::Ignore(_) => Ok(()),
        AutoUpdateDecision::RewriteInPlace { target } => {
            coordinator.rewrite_reference(
                &target,
                &event.sheet,
                &event.field,
                &event.old_version,
                &event.new_version,
            )?;
            Ok(())
        }
        AutoUpdateDecision::NewVersion { item } => {
            let source = coordinator.resources().require_resource(&event.source)?;
            let references = coordinator
                .graph()
                .get_sheet_references(&event.source)?
                .into_iter()
                .filter(|(sheet, field, _)| !(sheet == VERSIONABLE_SHEET && field == FOLLOWS_FIELD))
                .map(|(sheet, field, targets)| {
                    let targets = if sheet == event.sheet && field == event.field {
                        replace_target(targets, &event.old_version, &event.new_version)
                    } else {
                        targets
                    };
                    SheetReferences::new(sheet, field, targets)
                })
                .collect();

            coordinator.create_item_version(
                &item,
                NewVersion {
                    content_type: source.content_type,
                    follows: vec![event.source.clone()],
                    references,
                },
                &CreationOptions {
                    root_versions: event.root_versions.clone(),
                    creator: event.creator.clone(),
                    is_batchmode: event.is_batchmode,
                    autoupdated: true,
                },
            )?;
            Ok(())
        }
    }
}

fn replace_target(
    targets: Vec<ResourcePath>,
    old: &ResourcePath,
    new: &ResourcePath,
) -> Vec<ResourcePath> {
    let mut replaced: Vec<ResourcePath> = Vec::with_capacity(targets.len());
    for target in targets {
        let target = if &target == old { new.clone() } else { target };
        if !replaced.contains(&target) {
            replaced.push(target);
        }
    }
    replaced
}
