//! Coverage relation: which states each state covers.

use std::collections::{BTreeSet, HashMap};

use crate::types::StateId;

#[derive(Debug, Clone, Default)]
pub struct CoverageRelation {
    covers: HashMap<StateId, BTreeSet<StateId>>,
    coverer: HashMap<StateId, StateId>,
}

impl CoverageRelation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `coverer` covers `covered`, replacing any earlier coverer.
    pub fn set_covered_by(&mut self, covered: StateId, coverer: StateId) {
        if let Some(previous) = self.coverer.insert(covered, coverer) {
            self.remove_claim(previous, covered);
        }
        self.covers.entry(coverer).or_default().insert(covered);
    }

    fn remove_claim(&mut self, coverer: StateId, covered: StateId) {
        if let Some(set) = self.covers.get_mut(&coverer) {
            set.remove(&covered);
            if set.is_empty() {
                self.covers.remove(&coverer);
            }
        }
    }

    /// States covered by `coverer`.
    pub fn covered_by(&self, coverer: StateId) -> BTreeSet<StateId> {
        self.covers.get(&coverer).cloned().unwrap_or_default()
    }

    /// Drop every coverage claim made by `coverer` and return the states it
    /// covered.
    pub fn uncover_all(&mut self, coverer: StateId) -> BTreeSet<StateId> {
        let covered = self.covers.remove(&coverer).unwrap_or_default();
        for s in &covered {
            self.coverer.remove(s);
        }
        covered
    }

    /// Drop the claim covering `covered`, if any.
    pub fn forget_covered(&mut self, covered: StateId) {
        if let Some(coverer) = self.coverer.remove(&covered) {
            self.remove_claim(coverer, covered);
        }
    }

    /// The state covering `covered`, if any.
    pub fn coverer_of(&self, covered: StateId) -> Option<StateId> {
        self.coverer.get(&covered).copied()
    }

    /// Total number of coverage claims.
    pub fn len(&self) -> usize {
        self.coverer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coverer.is_empty()
    }
}
