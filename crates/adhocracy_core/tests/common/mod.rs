#![allow(dead_code)]

use adhocracy_core::registry::SHEET_TO_SHEET;
use adhocracy_core::repo::tag_repo::SqliteTagRegistry;
use adhocracy_core::{
    handler, registry_with_defaults, ContentEvent, ContentRegistry, CoreResult, CreationOptions,
    EventKind, NewVersion, ReferenceField, ResourceKind, ResourcePath, SheetReferences,
    TagRegistry, VersionCoordinator, LAST_TAG,
};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

pub const DOCUMENT_SHEET: &str = "adhocracy_core.sheets.document.IDocument";
pub const ELEMENTS_FIELD: &str = "elements";
pub const ELEMENTS_REFTYPE: &str = "adhocracy_core.sheets.document.DocumentElementsReference";

pub const COMMENT_SHEET: &str = "adhocracy_core.sheets.comment.IComment";
pub const REFERS_TO_FIELD: &str = "refers_to";
pub const COMMENT_REFTYPE: &str = "adhocracy_core.sheets.comment.CommentRefersToReference";

pub const POOL_TYPE: &str = "adhocracy_core.resources.pool.IBasicPool";
pub const PARAGRAPH_TYPE: &str = "adhocracy_core.resources.paragraph.IParagraph";
pub const PARAGRAPH_VERSION_TYPE: &str = "adhocracy_core.resources.paragraph.IParagraphVersion";
pub const DOCUMENT_TYPE: &str = "adhocracy_core.resources.document.IDocument";
pub const DOCUMENT_VERSION_TYPE: &str = "adhocracy_core.resources.document.IDocumentVersion";
pub const COMMENT_TYPE: &str = "adhocracy_core.resources.comment.IComment";

pub type Recorded = Arc<Mutex<Vec<ContentEvent>>>;

pub fn path(value: &str) -> ResourcePath {
    ResourcePath::parse(value).unwrap()
}

/// Registers the document elements field (auto-updated) and the comment
/// `refers_to` field (not auto-updated).
pub fn declare_fields(registry: &mut ContentRegistry) {
    registry
        .register_reference_type(ELEMENTS_REFTYPE, SHEET_TO_SHEET)
        .unwrap();
    registry
        .register_reference_type(COMMENT_REFTYPE, SHEET_TO_SHEET)
        .unwrap();
    registry
        .register_reference_field(ReferenceField::new(
            DOCUMENT_SHEET,
            ELEMENTS_FIELD,
            ELEMENTS_REFTYPE,
            true,
        ))
        .unwrap();
    registry
        .register_reference_field(ReferenceField::new(
            COMMENT_SHEET,
            REFERS_TO_FIELD,
            COMMENT_REFTYPE,
            false,
        ))
        .unwrap();
}

/// Registry with declared fields and no handlers.
pub fn bare_registry() -> ContentRegistry {
    let mut registry = ContentRegistry::new();
    declare_fields(&mut registry);
    registry
}

/// Registry with declared fields and the default auto-update policy.
pub fn autoupdate_registry() -> ContentRegistry {
    let mut registry = registry_with_defaults();
    declare_fields(&mut registry);
    registry
}

/// Subscribes a recorder for both event kinds on every sheet.
pub fn record_events(registry: &mut ContentRegistry) -> Recorded {
    let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
    for kind in [EventKind::NewVersionAdded, EventKind::ReferenceTargetReplaced] {
        let sink = Arc::clone(&recorded);
        registry.subscribe(
            kind,
            None,
            "recorder",
            handler(move |_, event| {
                sink.lock().unwrap().push(event.clone());
                Ok(())
            }),
        );
    }
    recorded
}

pub fn pool(coordinator: &VersionCoordinator<'_>, name: &str) -> ResourcePath {
    coordinator
        .create_resource(&ResourcePath::root(), name, ResourceKind::Pool, POOL_TYPE, None)
        .unwrap()
        .path
}

/// Creates an item and its first version.
pub fn item_with_first_version(
    coordinator: &VersionCoordinator<'_>,
    parent: &ResourcePath,
    name: &str,
    item_type: &str,
    version_type: &str,
    references: Vec<SheetReferences>,
) -> CoreResult<(ResourcePath, ResourcePath)> {
    let item = coordinator.create_item(parent, name, item_type, None)?.path;
    let version = coordinator.create_item_version(
        &item,
        NewVersion {
            content_type: version_type.to_string(),
            follows: Vec::new(),
            references,
        },
        &CreationOptions::default(),
    )?;
    Ok((item, version))
}

pub fn elements(targets: &[&ResourcePath]) -> Vec<SheetReferences> {
    vec![SheetReferences::new(
        DOCUMENT_SHEET,
        ELEMENTS_FIELD,
        targets.iter().map(|target| (*target).clone()).collect(),
    )]
}

pub fn last_of(conn: &Connection, item: &ResourcePath) -> Option<ResourcePath> {
    SqliteTagRegistry::try_new(conn)
        .unwrap()
        .get_tag(item, LAST_TAG)
        .unwrap()
}
