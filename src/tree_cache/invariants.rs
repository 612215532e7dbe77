//! Structural invariants of the [`Tree`], and a checker for them.
//!
//! Every mutation must take a tree that satisfies all four invariants to another that does:
//! 1. **Single root**: exactly one node has no parent, and it is the tree's root. Every other node's
//!    parent is a member of the tree.
//! 2. **Acyclic**: following parent links from any node reaches the root in finitely many steps.
//! 3. **Mutual adjacency**: `children` sets and `parent` links are inverses of each other.
//! 4. **Height**: every node's height equals its number of parent hops to the root.
//!
//! [`check`] walks the whole tree and is O(n · depth). It is meant for tests and for the optional
//! post-mutation verification in [`HierarchyCoordinator`](crate::coordinator::HierarchyCoordinator),
//! not for hot paths.

use thiserror::Error;

use crate::types::{Height, NodeId};

use super::Tree;

/// Check all four invariants. An empty tree satisfies them trivially.
pub fn check(tree: &Tree) -> Result<(), InvariantViolation> {
    if tree.is_empty() {
        return Ok(());
    }

    // 1. Single root.
    let parentless: Vec<NodeId> = tree
        .nodes()
        .filter(|node| node.parent.is_none())
        .map(|node| node.id.clone())
        .collect();
    match parentless.as_slice() {
        [] => return Err(InvariantViolation::NoRoot),
        [only] if tree.root() == Some(only) => (),
        [only] => {
            return Err(InvariantViolation::RootMismatch {
                root: tree.root().cloned(),
                parentless: only.clone(),
            })
        }
        _ => return Err(InvariantViolation::MultipleRoots { roots: parentless }),
    }

    for node in tree.nodes() {
        // 1, 3. Parent resolves and lists this node as a child.
        if let Some(parent) = &node.parent {
            match tree.node(parent) {
                None => {
                    return Err(InvariantViolation::DanglingParent {
                        id: node.id.clone(),
                        parent: parent.clone(),
                    })
                }
                Some(parent_node) if !parent_node.has_child(&node.id) => {
                    return Err(InvariantViolation::ChildNotListed {
                        parent: parent.clone(),
                        child: node.id.clone(),
                    })
                }
                Some(_) => (),
            }
        }

        // 3. Every listed child names this node as its parent.
        for child in &node.children {
            let linked = tree
                .node(child)
                .is_some_and(|child_node| child_node.parent.as_ref() == Some(&node.id));
            if !linked {
                return Err(InvariantViolation::StrayChild {
                    parent: node.id.clone(),
                    child: child.clone(),
                });
            }
        }

        // 2, 4. Parent chain reaches the root, and its length is the node's height.
        let hops = depth(tree, &node.id).ok_or(InvariantViolation::Cycle {
            id: node.id.clone(),
        })?;
        if node.height != Height::new(hops) {
            return Err(InvariantViolation::HeightMismatch {
                id: node.id.clone(),
                expected: Height::new(hops),
                found: node.height,
            });
        }
    }

    Ok(())
}

/// Number of parent hops from `id` to a parentless node, or `None` if the walk does not terminate
/// within `tree.len()` steps or runs into a missing node.
pub fn depth(tree: &Tree, id: &NodeId) -> Option<u64> {
    let mut hops = 0;
    let mut cursor = tree.node(id)?;
    while let Some(parent) = &cursor.parent {
        if hops as usize >= tree.len() {
            return None;
        }
        cursor = tree.node(parent)?;
        hops += 1;
    }
    Some(hops)
}

/// The first invariant violation found by [`check`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("no node is parentless")]
    NoRoot,

    #[error("more than one node is parentless: {roots:?}")]
    MultipleRoots { roots: Vec<NodeId> },

    #[error("root is {root:?} but the parentless node is {parentless}")]
    RootMismatch {
        root: Option<NodeId>,
        parentless: NodeId,
    },

    #[error("node {id} refers to missing parent {parent}")]
    DanglingParent { id: NodeId, parent: NodeId },

    #[error("node {child} names {parent} as parent but is not among its children")]
    ChildNotListed { parent: NodeId, child: NodeId },

    #[error("node {parent} lists {child} as a child but {child} does not name it as parent")]
    StrayChild { parent: NodeId, child: NodeId },

    #[error("parent chain of node {id} does not reach the root")]
    Cycle { id: NodeId },

    #[error("node {id} has height {found} but is {expected} hops from the root")]
    HeightMismatch {
        id: NodeId,
        expected: Height,
        found: Height,
    },
}
