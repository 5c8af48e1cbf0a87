use crate::model::CategoryNode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Stable index of a node inside a [`CategoryArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Slot {
    node: CategoryNode,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// The discovered category hierarchy
///
/// Nodes are never removed, so a [`NodeId`] stays valid for the arena's
/// lifetime. Parent and child links are ids; the name fields on
/// [`CategoryNode`] are kept in sync for display only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryArena {
    slots: Vec<Slot>,
    roots: Vec<NodeId>,
}

impl CategoryArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn add_root(&mut self, node: CategoryNode) -> NodeId {
        let id = self.push(node, None);
        self.roots.push(id);
        id
    }

    /// Adds `node` under `parent`; an unknown parent makes it a root
    pub fn add_child(&mut self, parent: NodeId, node: CategoryNode) -> NodeId {
        if parent.0 >= self.slots.len() {
            return self.add_root(node);
        }
        let mut node = node;
        node.parent_category = Some(self.slots[parent.0].node.name.clone());
        let id = self.push(node, Some(parent));
        self.attach(parent, id);
        id
    }

    /// Lists an existing node as a child of `parent` too
    ///
    /// The node keeps its original parent. This can introduce cycles, which
    /// [`Visitation`] tolerates.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) {
        if parent.0 >= self.slots.len() || child.0 >= self.slots.len() {
            return;
        }
        if self.slots[parent.0].children.contains(&child) {
            return;
        }
        let child_name = self.slots[child.0].node.name.clone();
        let slot = &mut self.slots[parent.0];
        slot.children.push(child);
        slot.node.subcategories.push(child_name);
    }

    fn push(&mut self, node: CategoryNode, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.slots.len());
        self.slots.push(Slot {
            node,
            parent,
            children: Vec::new(),
        });
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&CategoryNode> {
        self.slots.get(id.0).map(|s| &s.node)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut CategoryNode> {
        self.slots.get_mut(id.0).map(|s| &mut s.node)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots.get(id.0).and_then(|s| s.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slots
            .get(id.0)
            .map(|s| s.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// All nodes in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &CategoryNode)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, s)| (NodeId(i), &s.node))
    }

    /// Depth-first pre-order walk from every root
    pub fn visit(&self) -> Visitation<'_> {
        Visitation::new(self, self.roots.clone())
    }

    /// Depth-first pre-order walk from the given starting nodes
    pub fn visit_from(&self, starts: Vec<NodeId>) -> Visitation<'_> {
        Visitation::new(self, starts)
    }

    /// Nodes whose name matches one of `names`, ignoring case
    pub fn find_by_names(&self, names: &[String]) -> Vec<NodeId> {
        let wanted: Vec<String> = names.iter().map(|n| n.trim().to_lowercase()).collect();
        self.iter()
            .filter(|(_, node)| wanted.contains(&node.name.trim().to_lowercase()))
            .map(|(id, _)| id)
            .collect()
    }

    /// The visitation list for a harvest
    ///
    /// With a non-empty `filter`, only the subtrees rooted at matching
    /// categories are walked. `limit` caps the number of nodes.
    pub fn visitation_list(&self, filter: &[String], limit: Option<usize>) -> Vec<NodeId> {
        let walk = if filter.is_empty() {
            self.visit()
        } else {
            self.visit_from(self.find_by_names(filter))
        };
        walk.map(|(id, _)| id).take(limit.unwrap_or(usize::MAX)).collect()
    }
}

/// Depth-first iterator over a [`CategoryArena`]
///
/// Yields `(id, depth)` in pre-order, preserving child order. Each node is
/// yielded at most once even when the links form a cycle.
pub struct Visitation<'a> {
    arena: &'a CategoryArena,
    stack: Vec<(NodeId, usize)>,
    visited: HashSet<NodeId>,
}

impl<'a> Visitation<'a> {
    fn new(arena: &'a CategoryArena, starts: Vec<NodeId>) -> Self {
        let stack = starts.into_iter().rev().map(|id| (id, 0)).collect();
        Self {
            arena,
            stack,
            visited: HashSet::new(),
        }
    }
}

impl Iterator for Visitation<'_> {
    type Item = (NodeId, usize);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((id, depth)) = self.stack.pop() {
            if id.0 >= self.arena.len() || !self.visited.insert(id) {
                continue;
            }
            for child in self.arena.children(id).iter().rev() {
                if !self.visited.contains(child) {
                    self.stack.push((*child, depth + 1));
                }
            }
            return Some((id, depth));
        }
        None
    }
}
