mod common;

use adhocracy_core::repo::reference_repo::SqliteReferenceGraph;
use adhocracy_core::repo::resource_repo::SqliteResourceRepository;
use adhocracy_core::{
    handler, open_db_in_memory, ContentEvent, CoreError, CreationOptions, EventKind, NewResource,
    NewVersion, Phase, ReferenceGraph, ResourceKind, ResourceRepository, TagRegistry,
    VersionCoordinator, VersionService, LAST_TAG,
};
use adhocracy_core::registry::{FOLLOWS_FIELD, VERSIONABLE_SHEET};
use common::{
    bare_registry, elements, item_with_first_version, last_of, path, pool, record_events,
    COMMENT_SHEET, COMMENT_TYPE, PARAGRAPH_TYPE, PARAGRAPH_VERSION_TYPE, REFERS_TO_FIELD,
};
use adhocracy_core::SheetReferences;
use std::sync::{Arc, Mutex};

fn paragraph_version(follows: Vec<adhocracy_core::ResourcePath>) -> NewVersion {
    NewVersion {
        content_type: PARAGRAPH_VERSION_TYPE.to_string(),
        follows,
        references: Vec::new(),
    }
}

#[test]
fn first_version_notifies_once_without_predecessor() {
    let mut registry = bare_registry();
    let recorded = record_events(&mut registry);
    let mut conn = open_db_in_memory().unwrap();

    let committed = VersionService::new(&registry)
        .run(&mut conn, |coordinator| {
            let organisation = pool(coordinator, "organisation");
            item_with_first_version(
                coordinator,
                &organisation,
                "paragraph",
                PARAGRAPH_TYPE,
                PARAGRAPH_VERSION_TYPE,
                Vec::new(),
            )
        })
        .unwrap();
    let (item, version) = committed.value;

    assert_eq!(version, path("/organisation/paragraph/VERSION_0000000/"));
    assert_eq!(last_of(&conn, &item), Some(version.clone()));

    let events = recorded.lock().unwrap();
    assert_eq!(events.len(), 1);
    match &events[0] {
        ContentEvent::NewVersionAdded(event) => {
            assert_eq!(event.item, item);
            assert_eq!(event.old_version, None);
            assert_eq!(event.new_version, version);
            assert!(!event.autoupdated);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let entry = committed.changelog.get(&version).unwrap();
    assert!(entry.created);
    assert_eq!(
        committed.changelog.get(&item).unwrap().last_version,
        Some(version)
    );
}

#[test]
fn last_tag_is_rebound_before_new_version_handlers_run() {
    let mut registry = bare_registry();
    let seen_last = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen_last);
    registry.subscribe(
        EventKind::NewVersionAdded,
        None,
        "read_last",
        handler(move |coordinator, event| {
            if let ContentEvent::NewVersionAdded(event) = event {
                let last = coordinator.tags().get_tag(&event.item, LAST_TAG)?;
                sink.lock()
                    .unwrap()
                    .push((last, event.new_version.clone()));
            }
            Ok(())
        }),
    );
    let mut conn = open_db_in_memory().unwrap();
    let service = VersionService::new(&registry);

    let (item, first) = service
        .run(&mut conn, |coordinator| {
            let organisation = pool(coordinator, "organisation");
            item_with_first_version(
                coordinator,
                &organisation,
                "paragraph",
                PARAGRAPH_TYPE,
                PARAGRAPH_VERSION_TYPE,
                Vec::new(),
            )
        })
        .unwrap()
        .value;
    service
        .run(&mut conn, |coordinator| {
            coordinator.create_item_version(
                &item,
                paragraph_version(vec![first.clone()]),
                &CreationOptions::default(),
            )
        })
        .unwrap();

    let seen = seen_last.lock().unwrap();
    assert_eq!(seen.len(), 2);
    for (last, new_version) in seen.iter() {
        assert_eq!(last.as_ref(), Some(new_version));
    }
}

#[test]
fn two_predecessors_notify_and_fan_out_per_predecessor() {
    let mut registry = bare_registry();
    let mut conn = open_db_in_memory().unwrap();

    let (item, v0, v1, comment) = {
        let setup = VersionService::new(&registry);
        setup
            .run(&mut conn, |coordinator| {
                let organisation = pool(coordinator, "organisation");
                let (item, v0) = item_with_first_version(
                    coordinator,
                    &organisation,
                    "paragraph",
                    PARAGRAPH_TYPE,
                    PARAGRAPH_VERSION_TYPE,
                    Vec::new(),
                )?;
                let v1 = coordinator.create_item_version(
                    &item,
                    paragraph_version(vec![v0.clone()]),
                    &CreationOptions {
                        is_batchmode: true,
                        ..CreationOptions::default()
                    },
                )?;
                let comment = coordinator
                    .create_resource(
                        &organisation,
                        "comment",
                        ResourceKind::Simple,
                        COMMENT_TYPE,
                        None,
                    )?
                    .path;
                coordinator.set_references(
                    &comment,
                    COMMENT_SHEET,
                    REFERS_TO_FIELD,
                    &[v0.clone(), v1.clone()],
                )?;
                Ok((item, v0, v1, comment))
            })
            .unwrap()
            .value
    };

    let recorded = record_events(&mut registry);
    let v2 = VersionService::new(&registry)
        .run(&mut conn, |coordinator| {
            coordinator.create_item_version(
                &item,
                paragraph_version(vec![v0.clone(), v1.clone()]),
                &CreationOptions::default(),
            )
        })
        .unwrap()
        .value;

    let events = recorded.lock().unwrap();
    assert_eq!(events.len(), 4);
    let summary: Vec<(EventKind, Option<adhocracy_core::ResourcePath>)> = events
        .iter()
        .map(|event| match event {
            ContentEvent::NewVersionAdded(event) => {
                assert_eq!(event.new_version, v2);
                (EventKind::NewVersionAdded, event.old_version.clone())
            }
            ContentEvent::ReferenceTargetReplaced(event) => {
                assert_eq!(event.source, comment);
                assert_eq!(event.new_version, v2);
                (EventKind::ReferenceTargetReplaced, Some(event.old_version.clone()))
            }
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            (EventKind::NewVersionAdded, Some(v0.clone())),
            (EventKind::ReferenceTargetReplaced, Some(v0)),
            (EventKind::NewVersionAdded, Some(v1.clone())),
            (EventKind::ReferenceTargetReplaced, Some(v1)),
        ]
    );
    assert_eq!(last_of(&conn, &item), Some(v2));
}

#[test]
fn overlapping_fan_out_notifies_each_edge_once_per_unit() {
    let mut registry = bare_registry();
    let mut conn = open_db_in_memory().unwrap();

    let (item, v0) = VersionService::new(&registry)
        .run(&mut conn, |coordinator| {
            let organisation = pool(coordinator, "organisation");
            let (item, v0) = item_with_first_version(
                coordinator,
                &organisation,
                "paragraph",
                PARAGRAPH_TYPE,
                PARAGRAPH_VERSION_TYPE,
                Vec::new(),
            )?;
            let comment = coordinator
                .create_resource(&organisation, "comment", ResourceKind::Simple, COMMENT_TYPE, None)?
                .path;
            coordinator.set_references(&comment, COMMENT_SHEET, REFERS_TO_FIELD, &[v0.clone()])?;
            Ok((item, v0))
        })
        .unwrap()
        .value;

    let recorded = record_events(&mut registry);
    VersionService::new(&registry)
        .run(&mut conn, |coordinator| {
            let batch = CreationOptions {
                is_batchmode: true,
                ..CreationOptions::default()
            };
            coordinator.create_item_version(&item, paragraph_version(vec![v0.clone()]), &batch)?;
            coordinator.create_item_version(&item, paragraph_version(vec![v0.clone()]), &batch)
        })
        .unwrap();

    let replaced = recorded
        .lock()
        .unwrap()
        .iter()
        .filter(|event| event.kind() == EventKind::ReferenceTargetReplaced)
        .count();
    assert_eq!(replaced, 1);
    assert_eq!(
        last_of(&conn, &item),
        Some(path("/organisation/paragraph/VERSION_0000002/"))
    );
}

#[test]
fn last_always_points_at_the_newest_version() {
    let registry = bare_registry();
    let mut conn = open_db_in_memory().unwrap();
    let service = VersionService::new(&registry);

    let (item, mut previous) = service
        .run(&mut conn, |coordinator| {
            let organisation = pool(coordinator, "organisation");
            item_with_first_version(
                coordinator,
                &organisation,
                "paragraph",
                PARAGRAPH_TYPE,
                PARAGRAPH_VERSION_TYPE,
                Vec::new(),
            )
        })
        .unwrap()
        .value;

    for _ in 0..3 {
        let next = service
            .run(&mut conn, |coordinator| {
                coordinator.create_item_version(
                    &item,
                    paragraph_version(vec![previous.clone()]),
                    &CreationOptions::default(),
                )
            })
            .unwrap()
            .value;
        assert_eq!(last_of(&conn, &item), Some(next.clone()));
        previous = next;
    }
    assert_eq!(previous, path("/organisation/paragraph/VERSION_0000003/"));

    let graph_registry = bare_registry();
    let graph = SqliteReferenceGraph::try_new(&conn, &graph_registry).unwrap();
    assert_eq!(
        graph
            .get_references(&previous, VERSIONABLE_SHEET, FOLLOWS_FIELD)
            .unwrap(),
        vec![path("/organisation/paragraph/VERSION_0000002/")]
    );
}

#[test]
fn detached_version_is_a_no_op() {
    let mut registry = bare_registry();
    let recorded = record_events(&mut registry);
    let conn = open_db_in_memory().unwrap();

    let resources = SqliteResourceRepository::try_new(&conn).unwrap();
    let root = adhocracy_core::ResourcePath::root();
    let detached = resources
        .create_resource(&NewResource {
            parent: &root,
            name: "VERSION_0000000",
            kind: ResourceKind::ItemVersion,
            content_type: PARAGRAPH_VERSION_TYPE,
            creator: None,
        })
        .unwrap()
        .path;

    let coordinator = VersionCoordinator::try_new(&conn, &registry).unwrap();
    coordinator
        .after_version_created(&detached, &CreationOptions::default())
        .unwrap();

    assert!(recorded.lock().unwrap().is_empty());
    assert_eq!(coordinator.phase(), Phase::Pending);
    assert!(coordinator.changelog().is_empty());
}

#[test]
fn handler_failure_rolls_back_the_unit_of_work() {
    let mut registry = bare_registry();
    registry.subscribe(
        EventKind::NewVersionAdded,
        None,
        "always_fails",
        handler(|_, _| Err(CoreError::handler("always_fails", "refused"))),
    );
    let mut conn = open_db_in_memory().unwrap();

    let err = VersionService::new(&registry)
        .run(&mut conn, |coordinator| {
            let organisation = pool(coordinator, "organisation");
            item_with_first_version(
                coordinator,
                &organisation,
                "paragraph",
                PARAGRAPH_TYPE,
                PARAGRAPH_VERSION_TYPE,
                Vec::new(),
            )
        })
        .unwrap_err();
    assert!(matches!(err, CoreError::Handler { .. }));

    let resources = SqliteResourceRepository::try_new(&conn).unwrap();
    assert!(resources
        .get_resource(&path("/organisation/"))
        .unwrap()
        .is_none());
}

#[test]
fn committed_versions_cannot_be_rewritten() {
    let registry = bare_registry();
    let mut conn = open_db_in_memory().unwrap();
    let service = VersionService::new(&registry);

    let (first, other) = service
        .run(&mut conn, |coordinator| {
            let organisation = pool(coordinator, "organisation");
            let (_, first) = item_with_first_version(
                coordinator,
                &organisation,
                "paragraph",
                PARAGRAPH_TYPE,
                PARAGRAPH_VERSION_TYPE,
                Vec::new(),
            )?;
            let (_, other) = item_with_first_version(
                coordinator,
                &organisation,
                "other",
                PARAGRAPH_TYPE,
                PARAGRAPH_VERSION_TYPE,
                Vec::new(),
            )?;
            Ok((first, other))
        })
        .unwrap()
        .value;

    let err = service
        .run(&mut conn, |coordinator| {
            coordinator.set_references(
                &first,
                common::DOCUMENT_SHEET,
                common::ELEMENTS_FIELD,
                &[other.clone()],
            )
        })
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));
}

#[test]
fn follows_must_name_versions_of_the_same_item() {
    let registry = bare_registry();
    let mut conn = open_db_in_memory().unwrap();

    let err = VersionService::new(&registry)
        .run(&mut conn, |coordinator| {
            let organisation = pool(coordinator, "organisation");
            let (item, _) = item_with_first_version(
                coordinator,
                &organisation,
                "paragraph",
                PARAGRAPH_TYPE,
                PARAGRAPH_VERSION_TYPE,
                Vec::new(),
            )?;
            let (_, foreign) = item_with_first_version(
                coordinator,
                &organisation,
                "other",
                PARAGRAPH_TYPE,
                PARAGRAPH_VERSION_TYPE,
                elements(&[]),
            )?;
            coordinator.create_item_version(
                &item,
                NewVersion {
                    content_type: PARAGRAPH_VERSION_TYPE.to_string(),
                    follows: vec![foreign],
                    references: vec![SheetReferences::new(COMMENT_SHEET, REFERS_TO_FIELD, Vec::new())],
                },
                &CreationOptions::default(),
            )
        })
        .unwrap_err();
    match err {
        CoreError::Validation { name, .. } => assert_eq!(name, FOLLOWS_FIELD),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn phase_reaches_fan_out_inside_the_unit() {
    let registry = bare_registry();
    let mut conn = open_db_in_memory().unwrap();
    let service = VersionService::new(&registry);

    let (item, first) = service
        .run(&mut conn, |coordinator| {
            assert_eq!(coordinator.phase(), Phase::Pending);
            let organisation = pool(coordinator, "organisation");
            let created = item_with_first_version(
                coordinator,
                &organisation,
                "paragraph",
                PARAGRAPH_TYPE,
                PARAGRAPH_VERSION_TYPE,
                Vec::new(),
            )?;
            assert_eq!(coordinator.phase(), Phase::NotifyingPredecessors);
            Ok(created)
        })
        .unwrap()
        .value;

    service
        .run(&mut conn, |coordinator| {
            coordinator.create_item_version(
                &item,
                paragraph_version(vec![first.clone()]),
                &CreationOptions::default(),
            )?;
            assert_eq!(coordinator.phase(), Phase::FanningOutReferences);
            Ok(())
        })
        .unwrap();
}
