//! Arena-backed entity hierarchy.
//!
//! Nodes live in a single `Vec` owned by the snapshot. Parent links are plain
//! indices, so upward traversal never creates an ownership cycle.

#![allow(missing_docs)]

/// Something with a name that can live in a [`Hierarchy`].
pub trait Named {
    fn name(&self) -> &str;
}

/// Index of a node inside its owning [`Hierarchy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    value: T,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Immutable-after-build tree of entities.
#[derive(Debug, Clone)]
pub struct Hierarchy<T> {
    slots: Vec<Slot<T>>,
}

impl<T> Default for Hierarchy<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> Hierarchy<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root node.
    pub fn add_root(&mut self, value: T) -> NodeId {
        self.push(value, None)
    }

    /// Add a child under `parent`. Returns `None` when `parent` does not belong
    /// to this hierarchy.
    pub fn add_child(&mut self, parent: NodeId, value: T) -> Option<NodeId> {
        if parent.0 >= self.slots.len() {
            return None;
        }
        let id = self.push(value, Some(parent));
        self.slots[parent.0].children.push(id);
        Some(id)
    }

    fn push(&mut self, value: T, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.slots.len());
        self.slots.push(Slot {
            value,
            parent,
            children: Vec::new(),
        });
        id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_, T>> {
        (id.0 < self.slots.len()).then_some(NodeRef { tree: self, id })
    }

    /// Every node in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeRef<'_, T>> {
        (0..self.slots.len()).map(move |i| NodeRef {
            tree: self,
            id: NodeId(i),
        })
    }

    /// Nodes without a parent.
    pub fn roots(&self) -> impl Iterator<Item = NodeRef<'_, T>> {
        self.nodes().filter(|node| node.parent().is_none())
    }
}

/// Borrowed handle to one node; cheap to copy.
pub struct NodeRef<'a, T> {
    tree: &'a Hierarchy<T>,
    id: NodeId,
}

impl<T> Clone for NodeRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeRef<'_, T> {}

impl<T: std::fmt::Debug> std::fmt::Debug for NodeRef<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("value", self.value())
            .finish()
    }
}

impl<'a, T> NodeRef<'a, T> {
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    fn slot(&self) -> &'a Slot<T> {
        &self.tree.slots[self.id.0]
    }

    #[must_use]
    pub fn value(&self) -> &'a T {
        &self.slot().value
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.slot().parent.map(|id| Self {
            tree: self.tree,
            id,
        })
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a, T>> + 'a {
        let tree = self.tree;
        self.slot()
            .children
            .iter()
            .map(move |&id| NodeRef { tree, id })
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.slot().children.is_empty()
    }

    /// Parent, grandparent, ... up to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = NodeRef<'a, T>> + 'a {
        let tree = self.tree;
        std::iter::successors(self.slot().parent, move |id| tree.slots[id.0].parent)
            .map(move |id| NodeRef { tree, id })
    }
}

impl<'a, T: Named> NodeRef<'a, T> {
    /// Name borrowed from the arena, so it outlives this handle.
    #[must_use]
    pub fn name(&self) -> &'a str {
        self.value().name()
    }
}

impl<T> PartialEq for NodeRef<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

impl<T> Eq for NodeRef<'_, T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Item(&'static str);

    impl Named for Item {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn sample() -> (Hierarchy<Item>, NodeId, NodeId) {
        let mut tree = Hierarchy::new();
        let root = tree.add_root(Item("display"));
        let task = tree.add_child(root, Item("task")).unwrap();
        let leaf = tree.add_child(task, Item("leaf")).unwrap();
        (tree, task, leaf)
    }

    #[test]
    fn parent_links_resolve_through_arena() {
        let (tree, task, leaf) = sample();
        let leaf = tree.get(leaf).unwrap();
        assert_eq!(leaf.parent().unwrap().id(), task);
        assert_eq!(leaf.parent().unwrap().name(), "task");
        assert!(leaf.is_leaf());
        assert!(!tree.get(task).unwrap().is_leaf());
    }

    #[test]
    fn ancestors_walk_to_root() {
        let (tree, _, leaf) = sample();
        let names: Vec<&str> = tree.get(leaf).unwrap().ancestors().map(|n| n.name()).collect();
        assert_eq!(names, vec!["task", "display"]);
    }

    #[test]
    fn names_outlive_the_node_handle() {
        let (tree, task, leaf) = sample();
        let leaf_name = {
            let node = tree.get(leaf).unwrap();
            node.name()
        };
        let task_name = tree.get(task).map(|node| node.name());
        assert_eq!(leaf_name, "leaf");
        assert_eq!(task_name, Some("task"));
    }

    #[test]
    fn foreign_parent_is_rejected() {
        let mut tree: Hierarchy<Item> = Hierarchy::new();
        assert!(tree.add_child(NodeId(3), Item("orphan")).is_none());
        assert!(tree.is_empty());
    }

    #[test]
    fn roots_and_children() {
        let (tree, task, _) = sample();
        assert_eq!(tree.roots().count(), 1);
        let children: Vec<&str> = tree.get(task).unwrap().children().map(|n| n.name()).collect();
        assert_eq!(children, vec!["leaf"]);
        assert_eq!(tree.len(), 3);
    }
}
