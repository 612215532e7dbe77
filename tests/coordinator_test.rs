//! Tests for [`HierarchyCoordinator`]: write-then-cache ordering, error reporting, recovery from an
//! inconsistent cache, and events.

use std::{
    sync::mpsc,
    time::{Duration, Instant},
};

use log::LevelFilter;

use hierarchy_rs::{
    config::Configuration,
    coordinator::{ErrorKind, HierarchyCoordinator, HierarchyError, Operation},
    entity_store::store::{EntityStore, KVEntityStore, StoreError},
    events::{InconsistentStateEvent, PersistenceFailureEvent},
    tree_cache::{invariants, Tree, TreeError},
    types::{Height, Node},
};

mod common;

use common::{fixtures::*, logging::setup_logger, mem_db::MemDB};

fn org_chart() -> (MemDB, TestCoordinator) {
    setup_logger(LevelFilter::Debug);
    let db = MemDB::new();
    let hierarchy = coordinator(&db);
    for (node, parent) in ORG_CHART {
        hierarchy
            .emplace(id(node), parent.map(|parent| id(parent)))
            .unwrap();
    }
    (db, hierarchy)
}

/// The tree that a freshly started coordinator would build from `db`.
fn rebuilt_from(db: &MemDB) -> Tree {
    Tree::construct(KVEntityStore::new(db.clone()).list_all_nodes().unwrap())
}

#[test]
fn bootstraps_from_existing_store() {
    setup_logger(LevelFilter::Debug);
    let db = MemDB::new();
    seed_store(&mut KVEntityStore::new(db.clone()), ORG_CHART);

    let hierarchy = coordinator(&db);
    assert_eq!(hierarchy.len(), ORG_CHART.len());
    assert_eq!(hierarchy.root(), Some(id("ceo")));
    assert_eq!(
        sorted_nodes(&hierarchy.snapshot()),
        sorted_nodes(&tree_from(ORG_CHART))
    );
}

#[test]
fn emplace_writes_store_then_cache() {
    let (db, hierarchy) = org_chart();

    let node = hierarchy.emplace(id("payroll"), Some(id("accounting"))).unwrap();
    assert_eq!(node.height, Height::new(3));
    assert_eq!(node.parent, Some(id("accounting")));

    let children = hierarchy.get_children(&id("accounting")).unwrap();
    assert_eq!(children, vec![node]);
    assert_eq!(
        sorted_nodes(&rebuilt_from(&db)),
        sorted_nodes(&hierarchy.snapshot())
    );
}

#[test]
fn first_node_becomes_root_without_parent() {
    setup_logger(LevelFilter::Debug);
    let db = MemDB::new();
    let hierarchy = coordinator(&db);
    assert!(hierarchy.is_empty());

    // A parent reference on the very first node is dropped, so that a restart finds the same root.
    let root = hierarchy.emplace(id("ceo"), Some(id("board"))).unwrap();
    assert_eq!(root.parent, None);
    assert_eq!(root.height, Height::init());
    drop(hierarchy);

    let restarted = coordinator(&db);
    assert_eq!(restarted.root(), Some(id("ceo")));
    assert_eq!(restarted.node(&id("ceo")).unwrap().parent, None);
}

#[test]
fn validation_errors_have_no_side_effects() {
    let (db, hierarchy) = org_chart();
    let before = db.dump();
    let cache_before = sorted_nodes(&hierarchy.snapshot());

    let cases: Vec<(Result<Node, HierarchyError>, ErrorKind)> = vec![
        (
            hierarchy.emplace(id("eng"), Some(id("ceo"))),
            ErrorKind::DuplicateId,
        ),
        (
            hierarchy.emplace(id("payroll"), Some(id("hr"))),
            ErrorKind::InvalidParent,
        ),
        (hierarchy.emplace(id("board"), None), ErrorKind::InvalidParent),
        (
            hierarchy.reparent(&id("ceo"), &id("cto")),
            ErrorKind::RootImmutable,
        ),
        (hierarchy.reparent(&id("eng"), &id("eng")), ErrorKind::SelfCycle),
        (
            hierarchy.reparent(&id("nobody"), &id("cto")),
            ErrorKind::NotFound,
        ),
        (
            hierarchy.reparent(&id("eng"), &id("nobody")),
            ErrorKind::NotFound,
        ),
    ];
    for (result, kind) in cases {
        let err = result.unwrap_err();
        assert!(matches!(err, HierarchyError::Tree(_)));
        assert_eq!(err.kind(), kind);
        assert!(err.is_retryable());
    }

    assert!(matches!(
        hierarchy.get_children(&id("nobody")),
        Err(HierarchyError::Tree(TreeError::NodeNotFound { .. }))
    ));
    assert_eq!(db.dump(), before);
    assert_eq!(sorted_nodes(&hierarchy.snapshot()), cache_before);
}

#[test]
fn empty_id_is_rejected_without_side_effects() {
    setup_logger(LevelFilter::Debug);
    let db = MemDB::new();
    let hierarchy = coordinator(&db);

    let err = hierarchy.emplace(id(""), None).unwrap_err();
    assert!(matches!(err, HierarchyError::Tree(TreeError::EmptyId)));
    assert_eq!(err.kind(), ErrorKind::InvalidId);
    assert!(err.is_retryable());
    assert!(hierarchy.is_empty());
    assert!(db.dump().is_empty());

    hierarchy.emplace(id("ceo"), None).unwrap();
    let before = db.dump();
    assert_eq!(
        hierarchy.emplace(id(""), Some(id("ceo"))).unwrap_err().kind(),
        ErrorKind::InvalidId
    );
    // An empty parent reference never resolves either.
    assert_eq!(
        hierarchy.emplace(id("cto"), Some(id(""))).unwrap_err().kind(),
        ErrorKind::InvalidParent
    );
    assert_eq!(db.dump(), before);
    drop(hierarchy);

    // A restart still finds a single root.
    let restarted = coordinator(&db);
    assert_eq!(restarted.root(), Some(id("ceo")));
    assert_eq!(invariants::check(&restarted.snapshot()), Ok(()));
}

#[test]
fn reparent_writes_store_then_cache() {
    let (db, hierarchy) = org_chart();

    let moved = hierarchy.reparent(&id("eng"), &id("cfo")).unwrap();
    assert_eq!(moved.parent, Some(id("cfo")));
    assert_eq!(moved.height, Height::new(2));

    let mut cto_children: Vec<String> = hierarchy
        .get_children(&id("cto"))
        .unwrap()
        .into_iter()
        .map(|child| child.id.to_string())
        .collect();
    cto_children.sort();
    assert_eq!(cto_children, vec!["eng-platform", "eng-product", "research"]);

    assert_eq!(
        sorted_nodes(&rebuilt_from(&db)),
        sorted_nodes(&hierarchy.snapshot())
    );
}

#[test]
fn persistence_failure_leaves_cache_untouched() {
    setup_logger(LevelFilter::Debug);
    let db = MemDB::new();
    seed_store(&mut KVEntityStore::new(db.clone()), ORG_CHART);
    let (failures_tx, failures_rx) = mpsc::channel::<PersistenceFailureEvent>();
    let config = Configuration::builder()
        .persistence_timeout(Duration::from_secs(5))
        .verify_invariants(true)
        .on_persistence_failure(move |event: &PersistenceFailureEvent| {
            let _ = failures_tx.send(event.clone());
        })
        .build();
    let hierarchy = HierarchyCoordinator::new(KVEntityStore::new(db.clone()), config).unwrap();
    let cache_before = sorted_nodes(&hierarchy.snapshot());

    db.fail_writes(true);
    let emplace = hierarchy.emplace(id("hr"), Some(id("ceo"))).unwrap_err();
    assert!(matches!(
        emplace,
        HierarchyError::Persistence(StoreError::KVWriteError(_))
    ));
    assert_eq!(emplace.kind(), ErrorKind::PersistenceFailure);
    assert!(emplace.is_retryable());

    let reparent = hierarchy.reparent(&id("eng"), &id("cfo")).unwrap_err();
    assert_eq!(reparent.kind(), ErrorKind::PersistenceFailure);
    assert_eq!(sorted_nodes(&hierarchy.snapshot()), cache_before);

    // Retrying once the store recovers succeeds.
    db.fail_writes(false);
    hierarchy.emplace(id("hr"), Some(id("ceo"))).unwrap();

    drop(hierarchy);
    let failures: Vec<PersistenceFailureEvent> = failures_rx.try_iter().collect();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].operation, Operation::Emplace);
    assert_eq!(failures[0].node, id("hr"));
    assert_eq!(failures[1].operation, Operation::Reparent);
    assert_eq!(failures[1].node, id("eng"));
}

#[test]
fn timeout_aborts_before_commit() {
    let (db, hierarchy) = org_chart();
    let before = db.dump();
    let cache_before = sorted_nodes(&hierarchy.snapshot());

    let err = hierarchy
        .emplace_with_timeout(id("hr"), Some(id("ceo")), Duration::ZERO)
        .unwrap_err();
    assert!(matches!(
        err,
        HierarchyError::Persistence(StoreError::DeadlineExceeded)
    ));
    let err = hierarchy
        .reparent_with_timeout(&id("eng"), &id("cfo"), Duration::ZERO)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PersistenceFailure);

    assert_eq!(db.dump(), before);
    assert_eq!(sorted_nodes(&hierarchy.snapshot()), cache_before);
}

#[test]
fn inconsistent_state_is_reported_and_recovered_by_rebuild() {
    setup_logger(LevelFilter::Debug);
    let db = MemDB::new();
    {
        // The store does not enforce a single root, so it can hold a second parentless node.
        let mut store = KVEntityStore::new(db.clone());
        seed_store(&mut store, ORG_CHART);
        store
            .insert_node(&Node::new_root("shadow-ceo"), Instant::now() + Duration::from_secs(60))
            .unwrap();
    }

    let (inconsistencies_tx, inconsistencies_rx) = mpsc::channel::<InconsistentStateEvent>();
    let config = Configuration::builder()
        .persistence_timeout(Duration::from_secs(5))
        .verify_invariants(true)
        .on_inconsistent_state(move |event: &InconsistentStateEvent| {
            let _ = inconsistencies_tx.send(event.clone());
        })
        .build();
    let hierarchy = HierarchyCoordinator::new(KVEntityStore::new(db.clone()), config).unwrap();
    assert!(invariants::check(&hierarchy.snapshot()).is_err());

    // The write commits, but the cache it lands in is not a valid tree.
    let err = hierarchy.emplace(id("hr"), Some(id("ceo"))).unwrap_err();
    assert!(matches!(
        err,
        HierarchyError::InconsistentState {
            operation: Operation::Emplace,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::InconsistentState);
    assert!(!err.is_retryable());
    assert!(rebuilt_from(&db).contains(&id("hr")));

    // Rebuilding makes the cache agree with the store again.
    let len = hierarchy.rebuild_cache().unwrap();
    assert_eq!(len, ORG_CHART.len() + 2);
    assert_eq!(
        sorted_nodes(&hierarchy.snapshot()),
        sorted_nodes(&rebuilt_from(&db))
    );

    drop(hierarchy);
    let inconsistencies: Vec<InconsistentStateEvent> = inconsistencies_rx.try_iter().collect();
    assert_eq!(inconsistencies.len(), 1);
    assert_eq!(inconsistencies[0].operation, Operation::Emplace);
    assert_eq!(inconsistencies[0].node, id("hr"));
}

#[test]
fn invariants_are_not_checked_unless_configured() {
    setup_logger(LevelFilter::Debug);
    let db = MemDB::new();
    {
        let mut store = KVEntityStore::new(db.clone());
        seed_store(&mut store, ORG_CHART);
        store
            .insert_node(&Node::new_root("shadow-ceo"), Instant::now() + Duration::from_secs(60))
            .unwrap();
    }

    let config = Configuration::builder()
        .persistence_timeout(Duration::from_secs(5))
        .build();
    let hierarchy = HierarchyCoordinator::new(KVEntityStore::new(db), config).unwrap();
    hierarchy.emplace(id("hr"), Some(id("ceo"))).unwrap();
}

#[test]
fn events_are_published_in_order() {
    setup_logger(LevelFilter::Debug);
    let (events_tx, events_rx) = mpsc::channel::<String>();
    let (emplace_tx, reparent_tx, rebuild_tx) = (events_tx.clone(), events_tx.clone(), events_tx);
    let config = Configuration::builder()
        .persistence_timeout(Duration::from_secs(5))
        .on_emplace_node(move |event| {
            let _ = emplace_tx.send(format!("emplace {} h{}", event.node.id, event.node.height));
        })
        .on_reparent_node(move |event| {
            let _ = reparent_tx.send(format!(
                "reparent {} {}->{} h{} promoted {}",
                event.node, event.old_parent, event.new_parent, event.height, event.promoted_children
            ));
        })
        .on_rebuild_cache(move |event| {
            let _ = rebuild_tx.send(format!("rebuild {}", event.nodes));
        })
        .build();

    let hierarchy = HierarchyCoordinator::new(KVEntityStore::new(MemDB::new()), config).unwrap();
    hierarchy.emplace(id("ceo"), None).unwrap();
    hierarchy.emplace(id("cto"), Some(id("ceo"))).unwrap();
    hierarchy.emplace(id("eng"), Some(id("cto"))).unwrap();
    hierarchy.reparent(&id("cto"), &id("eng")).unwrap();
    hierarchy.rebuild_cache().unwrap();
    drop(hierarchy);

    let events: Vec<String> = events_rx.try_iter().collect();
    assert_eq!(
        events,
        vec![
            "emplace ceo h0",
            "emplace cto h1",
            "emplace eng h2",
            "reparent cto ceo->eng h2 promoted 1",
            "rebuild 3",
        ]
    );
}

#[test]
fn no_event_bus_without_handlers() {
    let config = Configuration::builder()
        .persistence_timeout(Duration::from_secs(5))
        .log_events(false)
        .build();
    let hierarchy = HierarchyCoordinator::new(KVEntityStore::new(MemDB::new()), config).unwrap();
    hierarchy.emplace(id("ceo"), None).unwrap();
    assert_eq!(hierarchy.len(), 1);
}
