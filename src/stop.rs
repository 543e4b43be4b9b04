//! Reached set and the coverage-based stop operator.

use std::collections::{BTreeSet, HashMap};

use log::debug;

use crate::art::Art;
use crate::domain::ExplicitDomain;
use crate::manager::FormulaManager;
use crate::state::AbstractState;
use crate::types::{NodeId, StateId};

/// States reached so far, optionally indexed by location.
#[derive(Debug, Clone, Default)]
pub struct ReachedSet {
    all: BTreeSet<StateId>,
    locations: HashMap<StateId, NodeId>,
    by_location: Option<HashMap<NodeId, BTreeSet<StateId>>>,
}

impl ReachedSet {
    /// A reached set whose coverage candidates are limited to one location.
    pub fn location_indexed() -> Self {
        Self {
            by_location: Some(HashMap::new()),
            ..Default::default()
        }
    }

    /// A reached set that offers every state as a coverage candidate.
    pub fn flat() -> Self {
        Self::default()
    }

    pub fn is_indexed(&self) -> bool {
        self.by_location.is_some()
    }

    pub fn add(&mut self, id: StateId, location: NodeId) {
        self.all.insert(id);
        self.locations.insert(id, location);
        if let Some(index) = &mut self.by_location {
            index.entry(location).or_default().insert(id);
        }
    }

    pub fn remove(&mut self, id: StateId) -> bool {
        let Some(location) = self.locations.remove(&id) else {
            return false;
        };
        self.all.remove(&id);
        if let Some(index) = &mut self.by_location {
            if let Some(set) = index.get_mut(&location) {
                set.remove(&id);
                if set.is_empty() {
                    index.remove(&location);
                }
            }
        }
        true
    }

    pub fn contains(&self, id: StateId) -> bool {
        self.all.contains(&id)
    }

    /// States that may cover a state at `location`, in id order.
    pub fn candidates(&self, location: NodeId) -> Vec<StateId> {
        match &self.by_location {
            Some(index) => index
                .get(&location)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default(),
            None => self.all.iter().copied().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = StateId> + '_ {
        self.all.iter().copied()
    }
}

/// Stop-sep: a state stops when a single reached state covers it.
pub struct StopSep<'a, M: FormulaManager + ?Sized> {
    domain: ExplicitDomain<'a, M>,
}

impl<'a, M: FormulaManager + ?Sized> StopSep<'a, M> {
    pub fn new(manager: &'a M) -> Self {
        Self {
            domain: ExplicitDomain::new(manager),
        }
    }

    /// Find a reached state that covers `state`.
    ///
    /// The coverer must be another live, uncovered state at the same
    /// location, with a structurally equal call context and an abstraction
    /// entailed by `state`'s.
    pub fn find_coverer(&self, state: &AbstractState, reached: &ReachedSet, art: &Art) -> Option<StateId> {
        for candidate in reached.candidates(state.location()) {
            if candidate == state.id() || !art.contains(candidate) {
                continue;
            }
            let other = &art[candidate];
            if other.is_covered() || !state.same_context(other) {
                continue;
            }
            if self.domain.is_less_or_equal(state, other) {
                debug!("{} is covered by {}", state.id(), candidate);
                return Some(candidate);
            }
        }
        None
    }
}
