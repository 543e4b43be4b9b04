//! Refinement of the ART after a spurious error path.
//!
//! The new predicates are added to the precision, a restart point (the
//! refinement root) is picked, and the subtree below it is cut away so the
//! driver can explore it again under the finer precision. If the same
//! abstract path keeps coming back without the precision growing, the
//! analysis gives up with [`CpaError::NotEnoughPredicates`].

use std::collections::BTreeSet;
use std::fmt;

use log::{debug, info, warn};

use crate::art::Art;
use crate::error::CpaError;
use crate::manager::{CounterexampleTraceInfo, FormulaManager};
use crate::transfer::TransferRelation;
use crate::types::{NodeId, StateId};

/// Location sequence of an abstract path. State ids are not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathFingerprint(Vec<NodeId>);

impl PathFingerprint {
    pub fn new(locations: impl IntoIterator<Item = NodeId>) -> Self {
        PathFingerprint(locations.into_iter().collect())
    }

    /// Fingerprint of `path` (root first) in `art`.
    pub fn of(art: &Art, path: &[StateId]) -> Self {
        Self::new(path.iter().map(|&s| art[s].location()))
    }

    pub fn locations(&self) -> &[NodeId] {
        &self.0
    }
}

impl fmt::Display for PathFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, loc) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{}", loc)?;
        }
        Ok(())
    }
}

/// What the driver has to do after a refinement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refinement {
    /// Where exploration restarts.
    pub root: StateId,
    /// States to put back on the waitlist (just the root).
    pub to_waitlist: BTreeSet<StateId>,
    /// States removed from the ART, to be dropped from reached and waitlist.
    pub to_unreach: BTreeSet<StateId>,
    /// Surviving states whose coverer was removed; they are uncovered now
    /// and have to be explored.
    pub reopened: BTreeSet<StateId>,
}

impl<'c, M: FormulaManager> TransferRelation<'c, M> {
    /// Refine along the spurious error `path` (root first, error state last).
    pub fn refine(&mut self, path: &[StateId], info: &CounterexampleTraceInfo) -> Result<Refinement, CpaError> {
        assert!(!path.is_empty(), "Empty error path");
        let art_root = path[0];
        let error = path[path.len() - 1];

        let mut first_interpolant = None;
        let mut grown = None;
        for &s in path {
            let predicates = info.predicates_for(s);
            if predicates.is_empty() {
                continue;
            }
            first_interpolant.get_or_insert(s);
            let node = self.cfa.node(self.art[s].location());
            if self.precision.update(node, &predicates) && grown.is_none() {
                grown = Some(s);
            }
        }

        let fingerprint = PathFingerprint::of(&self.art, path);
        let seen = self.seen_paths.entry(fingerprint.clone()).or_insert(0);
        let previous = *seen;
        *seen += 1;
        debug!("path {} seen {} time(s) before", fingerprint, previous);

        let root = match (grown, first_interpolant) {
            (Some(s), _) => s,
            (None, _) if previous >= 2 => {
                warn!("refinement makes no progress on path {}", fingerprint);
                return Err(CpaError::NotEnoughPredicates { path: fingerprint });
            }
            (None, Some(s)) if previous == 1 => s,
            (None, Some(s)) => self.art.highest_ancestor_at(s, self.art[s].location()),
            (None, None) => art_root,
        };
        let root = if self.breadth_first { art_root } else { root };

        let subtree = self.art.subtree(root);
        let to_unreach: BTreeSet<StateId> = subtree
            .iter()
            .copied()
            .filter(|&s| !(self.art[s].is_covered() && s < error))
            .collect();

        // Covered states kept inside the subtree stay covered, since the
        // subtree is explored again from the root. Those outside it lose
        // their coverer and must be explored.
        self.art.discard(&to_unreach);
        let mut reopened = BTreeSet::new();
        for &s in &to_unreach {
            for covered in self.coverage.uncover_all(s) {
                if self.art.contains(covered) && !subtree.contains(&covered) {
                    self.art.state_mut(covered).set_covered(false);
                    reopened.insert(covered);
                }
            }
            self.coverage.forget_covered(s);
        }

        self.refinements += 1;
        info!(
            "refinement #{}: restart at {}, discarding {} states, reopening {}",
            self.refinements,
            root,
            to_unreach.len(),
            reopened.len()
        );

        Ok(Refinement {
            root,
            to_waitlist: BTreeSet::from([root]),
            to_unreach,
            reopened,
        })
    }
}
