//! Builders for the trees and coordinators shared by the integration tests.

use std::time::{Duration, Instant};

use hierarchy_rs::{
    config::Configuration,
    coordinator::HierarchyCoordinator,
    entity_store::store::{EntityStore, KVEntityStore},
    tree_cache::Tree,
    types::{Height, Node, NodeId},
};

use super::mem_db::MemDB;

pub(crate) type TestCoordinator = HierarchyCoordinator<KVEntityStore<MemDB>>;

pub(crate) fn id(id: &str) -> NodeId {
    NodeId::from(id)
}

/// A deadline far enough away that no test will hit it.
pub(crate) fn far_deadline() -> Instant {
    Instant::now() + Duration::from_secs(60)
}

/// Default configuration for tests: invariants are checked after every mutation, and events are
/// logged.
pub(crate) fn test_config() -> Configuration {
    Configuration::builder()
        .persistence_timeout(Duration::from_secs(5))
        .verify_invariants(true)
        .build()
}

pub(crate) fn coordinator(db: &MemDB) -> TestCoordinator {
    HierarchyCoordinator::new(KVEntityStore::new(db.clone()), test_config()).unwrap()
}

/// Build a tree in memory from `(id, parent)` pairs, listed parents first. The first pair is the root.
pub(crate) fn tree_from(edges: &[(&str, Option<&str>)]) -> Tree {
    let mut tree = Tree::new();
    for (node, parent) in edges {
        tree.emplace_node(node_for(&tree, node, *parent)).unwrap();
    }
    tree
}

/// Insert `(id, parent)` pairs, listed parents first, straight into an entity store.
pub(crate) fn seed_store<S: EntityStore>(store: &mut S, edges: &[(&str, Option<&str>)]) {
    let mut heights: Vec<(NodeId, Height)> = Vec::new();
    for (node, parent) in edges {
        let node = match parent {
            None => Node::new_root(*node),
            Some(parent) => {
                let parent_height = heights
                    .iter()
                    .find(|(id, _)| id.as_str() == *parent)
                    .map(|(_, height)| *height)
                    .unwrap();
                Node::new_child(*node, *parent, parent_height.child())
            }
        };
        heights.push((node.id.clone(), node.height));
        store.insert_node(&node, far_deadline()).unwrap();
    }
}

/// The node that emplacing `id` under `parent` would create in `tree`.
pub(crate) fn node_for(tree: &Tree, node: &str, parent: Option<&str>) -> Node {
    match parent {
        None => Node::new_root(node),
        Some(parent) => {
            let height = tree
                .node(&id(parent))
                .map(|parent| parent.height.child())
                .unwrap_or_default();
            Node::new_child(node, parent, height)
        }
    }
}

/// A small organization, used by most tests:
///
/// ```text
/// ceo
/// ├── cto
/// │   ├── eng
/// │   │   ├── eng-platform
/// │   │   │   └── sre
/// │   │   └── eng-product
/// │   └── research
/// └── cfo
///     └── accounting
/// ```
pub(crate) const ORG_CHART: &[(&str, Option<&str>)] = &[
    ("ceo", None),
    ("cto", Some("ceo")),
    ("cfo", Some("ceo")),
    ("eng", Some("cto")),
    ("research", Some("cto")),
    ("accounting", Some("cfo")),
    ("eng-platform", Some("eng")),
    ("eng-product", Some("eng")),
    ("sre", Some("eng-platform")),
];

/// Every node of `tree`, sorted by id.
pub(crate) fn sorted_nodes(tree: &Tree) -> Vec<Node> {
    let mut nodes: Vec<Node> = tree.nodes().cloned().collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    nodes
}

/// Ids of the children of `id` in `tree`, sorted.
pub(crate) fn children_of(tree: &Tree, node: &str) -> Vec<NodeId> {
    let mut children: Vec<NodeId> = tree
        .get_children(&id(node))
        .unwrap()
        .into_iter()
        .map(|child| child.id)
        .collect();
    children.sort();
    children
}

pub(crate) fn ids(ids: &[&str]) -> Vec<NodeId> {
    let mut ids: Vec<NodeId> = ids.iter().map(|node| id(node)).collect();
    ids.sort();
    ids
}

pub(crate) fn height_of(tree: &Tree, node: &str) -> u64 {
    tree.node(&id(node)).unwrap().height.int()
}
