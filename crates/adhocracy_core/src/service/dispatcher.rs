//! Reference fan-out for new versions.
//!
//! The dispatcher holds no policy: it finds every sheet-to-sheet back
//! reference of the predecessor and raises one `ReferenceTargetReplaced`
//! per edge. Handlers decide whether to update, ignore or refuse.
//!
//! # Invariants
//! - Each `(old_version, source, sheet, field)` is notified at most once
//!   per unit of work, across all predecessors and recursion levels.
//! - The first handler error stops the fan-out and propagates.

use crate::error::CoreResult;
use crate::events::{ContentEvent, ReferenceTargetReplaced};
use crate::model::resource::ResourcePath;
use crate::registry::SHEET_TO_SHEET;
use crate::repo::reference_repo::ReferenceGraph;
use crate::service::version_service::{CreationOptions, VersionCoordinator};
use log::debug;

/// Notifies every resource referencing `old_version` about `new_version`.
///
/// Returns the number of raised notifications.
pub fn notify_referencing_resources(
    coordinator: &VersionCoordinator<'_>,
    old_version: &ResourcePath,
    new_version: &ResourcePath,
    options: &CreationOptions,
) -> CoreResult<usize> {
    let references = coordinator
        .graph()
        .get_back_references(old_version, SHEET_TO_SHEET)?;
    let mut notified = 0;

    for reference in references {
        if !coordinator.mark_visited(&reference) {
            debug!(
                "event=fanout module=dispatcher status=skipped unit_id={} source={} sheet={} field={} old={} reason=visited",
                coordinator.unit_id(),
                reference.source,
                reference.sheet,
                reference.field,
                old_version
            );
            continue;
        }

        let event = ContentEvent::ReferenceTargetReplaced(ReferenceTargetReplaced {
            source: reference.source,
            sheet: reference.sheet,
            field: reference.field,
            old_version: old_version.clone(),
            new_version: new_version.clone(),
            creator: options.creator.clone(),
            root_versions: options.root_versions.clone(),
            is_batchmode: options.is_batchmode,
        });
        coordinator.notify(&event)?;
        notified += 1;
    }

    debug!(
        "event=fanout module=dispatcher status=ok unit_id={} old={} new={} notified={}",
        coordinator.unit_id(),
        old_version,
        new_version,
        notified
    );
    Ok(notified)
}
