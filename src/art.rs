//! Abstract reachability tree.
//!
//! The tree is an arena indexed by [`StateId`]. Each state stores its parent
//! id, and the arena keeps the child lists, so tree queries never need
//! back-pointers. Ids are handed out here in creation order, which makes the
//! id order a topological order of the tree.
//!
//! Refinement never frees arena slots. Discarded states are marked and
//! unlinked from their parent, so they no longer show up in subtree queries.

use std::collections::BTreeSet;
use std::ops::Index;

use log::debug;

use crate::state::AbstractState;
use crate::types::{NodeId, StateId};

#[derive(Debug)]
struct ArtNode {
    state: AbstractState,
    children: Vec<StateId>,
    discarded: bool,
}

#[derive(Debug, Default)]
pub struct Art {
    // `None` for ids that were handed out but never inserted (bottom successors).
    nodes: Vec<Option<ArtNode>>,
    root: Option<StateId>,
}

impl Art {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next state id.
    pub fn next_id(&mut self) -> StateId {
        let id = StateId::new(self.nodes.len() as u32);
        self.nodes.push(None);
        id
    }

    /// Add a state whose id was reserved with [`next_id`][Self::next_id].
    ///
    /// A state without a parent becomes the root; there can be only one.
    pub fn insert(&mut self, state: AbstractState) {
        let id = state.id();
        assert!(id.index() < self.nodes.len(), "State {} was never reserved", id);
        assert!(self.nodes[id.index()].is_none(), "State {} inserted twice", id);

        match state.parent() {
            None => {
                assert!(self.root.is_none(), "ART already has a root");
                self.root = Some(id);
            }
            Some(parent) => {
                assert!(parent < id, "Parent {} must be created before {}", parent, id);
                let node = self.node_mut(parent);
                assert!(!node.discarded, "Parent {} was discarded", parent);
                node.children.push(id);
            }
        }

        self.nodes[id.index()] = Some(ArtNode {
            state,
            children: Vec::new(),
            discarded: false,
        });
    }

    fn node(&self, id: StateId) -> &ArtNode {
        match self.nodes.get(id.index()) {
            Some(Some(node)) => node,
            _ => panic!("Unknown state {}", id),
        }
    }

    fn node_mut(&mut self, id: StateId) -> &mut ArtNode {
        match self.nodes.get_mut(id.index()) {
            Some(Some(node)) => node,
            _ => panic!("Unknown state {}", id),
        }
    }

    pub fn root(&self) -> Option<StateId> {
        self.root
    }

    pub fn get(&self, id: StateId) -> Option<&AbstractState> {
        match self.nodes.get(id.index()) {
            Some(Some(node)) => Some(&node.state),
            _ => None,
        }
    }

    pub fn state_mut(&mut self, id: StateId) -> &mut AbstractState {
        &mut self.node_mut(id).state
    }

    /// Whether `id` is in the tree and has not been discarded.
    pub fn contains(&self, id: StateId) -> bool {
        matches!(self.nodes.get(id.index()), Some(Some(node)) if !node.discarded)
    }

    pub fn is_discarded(&self, id: StateId) -> bool {
        self.node(id).discarded
    }

    pub fn children(&self, id: StateId) -> &[StateId] {
        &self.node(id).children
    }

    /// Number of states in the tree, discarded ones excluded.
    pub fn len(&self) -> usize {
        self.states().count()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of ids handed out so far.
    pub fn num_created(&self) -> usize {
        self.nodes.len()
    }

    /// All states not discarded, in creation order.
    pub fn states(&self) -> impl Iterator<Item = &AbstractState> {
        self.nodes
            .iter()
            .flatten()
            .filter(|node| !node.discarded)
            .map(|node| &node.state)
    }

    /// States from the root down to `id`, both included.
    pub fn path_to(&self, id: StateId) -> Vec<StateId> {
        let mut path = vec![id];
        let mut current = self.node(id).state.parent();
        while let Some(parent) = current {
            path.push(parent);
            current = self.node(parent).state.parent();
        }
        path.reverse();
        path
    }

    /// Whether `ancestor` is a proper ancestor of `id`.
    pub fn is_ancestor(&self, ancestor: StateId, id: StateId) -> bool {
        let mut current = self.node(id).state.parent();
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            if parent < ancestor {
                // Ids decrease going up, so `ancestor` cannot come later.
                return false;
            }
            current = self.node(parent).state.parent();
        }
        false
    }

    /// All live descendants of `id`, excluding `id` itself.
    pub fn subtree(&self, id: StateId) -> BTreeSet<StateId> {
        let mut result = BTreeSet::new();
        let mut stack: Vec<StateId> = self.children(id).to_vec();
        while let Some(s) = stack.pop() {
            if result.insert(s) {
                stack.extend_from_slice(self.children(s));
            }
        }
        result
    }

    /// The ancestor of `id` (or `id` itself) closest to the root whose
    /// location is `location`.
    pub fn highest_ancestor_at(&self, id: StateId, location: NodeId) -> StateId {
        let mut highest = id;
        let mut current = Some(id);
        while let Some(s) = current {
            let state = &self.node(s).state;
            if state.location() == location {
                highest = s;
            }
            current = state.parent();
        }
        highest
    }

    /// Mark `states` as discarded and unlink them from their parents.
    pub fn discard(&mut self, states: &BTreeSet<StateId>) {
        debug!("Discarding {} states from the ART", states.len());
        for &id in states {
            let node = self.node_mut(id);
            node.discarded = true;
            if let Some(parent) = node.state.parent() {
                self.node_mut(parent).children.retain(|&c| c != id);
            }
        }
    }
}

impl Index<StateId> for Art {
    type Output = AbstractState;

    fn index(&self, id: StateId) -> &Self::Output {
        &self.node(id).state
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::reference::Ref;
    use crate::state::CallContext;
    use crate::types::EdgeId;

    const TRUE: Ref = Ref::positive(1);

    /// Builds a tree from `(location, parent index)` pairs; index 0 is the root.
    fn build(shape: &[(u32, Option<usize>)]) -> (Art, Vec<StateId>) {
        let mut art = Art::new();
        let mut ids = Vec::new();
        for &(loc, parent) in shape {
            let id = art.next_id();
            let state = match parent {
                None => AbstractState::initial(id, NodeId::new(loc), TRUE),
                Some(p) => AbstractState::successor(
                    id,
                    NodeId::new(loc),
                    TRUE,
                    ids[p],
                    EdgeId::new(0),
                    CallContext::empty(),
                ),
            };
            art.insert(state);
            ids.push(id);
        }
        (art, ids)
    }

    #[test]
    fn test_ids_follow_creation_order() {
        let (art, ids) = build(&[(0, None), (1, Some(0)), (2, Some(1))]);
        assert_eq!(ids, vec![StateId::new(0), StateId::new(1), StateId::new(2)]);
        assert_eq!(art.root(), Some(ids[0]));
        assert_eq!(art.len(), 3);
    }

    #[test]
    fn test_path_and_ancestors() {
        //      0
        //     / \
        //    1   2
        //    |
        //    3
        let (art, ids) = build(&[(0, None), (1, Some(0)), (2, Some(0)), (3, Some(1))]);

        assert_eq!(art.path_to(ids[3]), vec![ids[0], ids[1], ids[3]]);
        assert!(art.is_ancestor(ids[0], ids[3]));
        assert!(art.is_ancestor(ids[1], ids[3]));
        assert!(!art.is_ancestor(ids[2], ids[3]));
        assert!(!art.is_ancestor(ids[3], ids[3]));
    }

    #[test]
    fn test_subtree_excludes_root() {
        let (art, ids) = build(&[(0, None), (1, Some(0)), (2, Some(0)), (3, Some(1))]);
        assert_eq!(art.subtree(ids[1]), BTreeSet::from([ids[3]]));
        assert_eq!(art.subtree(ids[0]), BTreeSet::from([ids[1], ids[2], ids[3]]));
        assert!(art.subtree(ids[3]).is_empty());
    }

    #[test]
    fn test_highest_ancestor_at() {
        // Locations along the path: 0 -> 5 -> 7 -> 5 -> 9
        let (art, ids) = build(&[(0, None), (5, Some(0)), (7, Some(1)), (5, Some(2)), (9, Some(3))]);
        assert_eq!(art.highest_ancestor_at(ids[3], NodeId::new(5)), ids[1]);
        assert_eq!(art.highest_ancestor_at(ids[4], NodeId::new(9)), ids[4]);
    }

    #[test]
    fn test_discard() {
        let (mut art, ids) = build(&[(0, None), (1, Some(0)), (2, Some(0)), (3, Some(1))]);
        art.discard(&BTreeSet::from([ids[1], ids[3]]));

        assert!(art.is_discarded(ids[1]));
        assert!(!art.contains(ids[3]));
        assert!(art.contains(ids[2]));
        assert_eq!(art.children(ids[0]), &[ids[2]]);
        assert_eq!(art.subtree(ids[0]), BTreeSet::from([ids[2]]));
        assert_eq!(art.len(), 2);
        assert_eq!(art.num_created(), 4);
    }

    #[test]
    fn test_reserved_but_not_inserted() {
        let mut art = Art::new();
        let id = art.next_id();
        assert!(art.get(id).is_none());
        assert!(!art.contains(id));
    }

    #[test]
    #[should_panic(expected = "inserted twice")]
    fn test_insert_twice_panics() {
        let mut art = Art::new();
        let id = art.next_id();
        art.insert(AbstractState::initial(id, NodeId::new(0), TRUE));
        art.insert(AbstractState::initial(id, NodeId::new(0), TRUE));
    }
}
