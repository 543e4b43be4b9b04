//! Transfer relation of lazy abstraction.
//!
//! The transfer relation owns the ART, the precision and the coverage
//! relation of one analysis run. Computing a successor may run into an error
//! location, in which case the abstract path is checked and, if spurious, the
//! ART is refined before control returns to the driver.

use std::collections::{BTreeSet, HashMap};

use log::{debug, info, warn};

use crate::art::Art;
use crate::cfa::Cfa;
use crate::config::Config;
use crate::coverage::CoverageRelation;
use crate::error::CpaError;
use crate::manager::{CounterexampleTraceInfo, FormulaManager};
use crate::predicate::PredicateMap;
use crate::refine::{PathFingerprint, Refinement};
use crate::state::{AbstractState, ContextFrame};
use crate::stop::{ReachedSet, StopSep};
use crate::types::{EdgeId, NodeId, StateId};

/// Outcome of a successor computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Successor {
    /// A new state, already inserted into the ART.
    State(StateId),
    /// The edge cannot be taken at the current precision.
    Bottom,
    /// A spurious error path was found and the ART was refined.
    Refine(Refinement),
}

pub struct TransferRelation<'c, M: FormulaManager> {
    pub(crate) cfa: &'c Cfa,
    pub(crate) manager: M,
    pub(crate) precision: Box<dyn PredicateMap>,
    pub(crate) art: Art,
    pub(crate) coverage: CoverageRelation,
    pub(crate) seen_paths: HashMap<PathFingerprint, usize>,
    pub(crate) refinement: bool,
    pub(crate) breadth_first: bool,
    pub(crate) refinements: usize,
}

impl<'c, M: FormulaManager> TransferRelation<'c, M> {
    pub fn new(cfa: &'c Cfa, manager: M, precision: Box<dyn PredicateMap>, config: &Config) -> Self {
        Self {
            cfa,
            manager,
            precision,
            art: Art::new(),
            coverage: CoverageRelation::new(),
            seen_paths: HashMap::new(),
            refinement: config.refinement,
            breadth_first: config.breadth_first,
            refinements: 0,
        }
    }

    pub fn cfa(&self) -> &'c Cfa {
        self.cfa
    }

    pub fn art(&self) -> &Art {
        &self.art
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    pub fn precision(&self) -> &dyn PredicateMap {
        self.precision.as_ref()
    }

    pub fn coverage(&self) -> &CoverageRelation {
        &self.coverage
    }

    /// Number of refinements performed so far.
    pub fn refinements(&self) -> usize {
        self.refinements
    }

    /// Create the ART root at `entry`: abstraction `true`, empty context.
    pub fn initial_state(&mut self, entry: NodeId) -> StateId {
        let id = self.art.next_id();
        let abstraction = self.manager.make_true();
        self.art.insert(AbstractState::initial(id, entry, abstraction));
        debug!("initial state {} at {}", id, entry);
        id
    }

    /// Abstract successor of `state` along `edge`.
    pub fn successor(&mut self, state: StateId, edge: EdgeId) -> Result<Successor, CpaError> {
        let cfa = self.cfa;
        let edge = cfa.edge(edge);
        let location = self.art[state].location();
        if edge.from != location {
            debug!("{} does not leave {} of {}", edge, location, state);
            return Ok(Successor::Bottom);
        }

        let predicates = self.precision.relevant_predicates(cfa.node(location));
        let id = self.art.next_id();
        let current = &self.art[state];

        let mut context = current.context().clone();
        if cfa.is_function_exit(location) {
            match context.pop() {
                Some((frame, rest)) if frame.return_location == edge.to => context = rest,
                Some((frame, _)) => {
                    debug!(
                        "{}: return to {} does not match call context {}",
                        id, edge.to, frame.return_location
                    );
                    return Ok(Successor::Bottom);
                }
                None => {
                    debug!("{}: return from {} with empty call context", id, location);
                    return Ok(Successor::Bottom);
                }
            }
        }
        if cfa.is_function_entry(edge.to) {
            let Some(return_location) = cfa.summary_successor(location) else {
                debug!("{}: {} enters a function but is not a call", id, edge);
                return Ok(Successor::Bottom);
            };
            context = context.push(ContextFrame {
                return_abstraction: current.abstraction(),
                return_location,
            });
        }

        let abstraction = self.manager.build_abstraction(current, edge, &predicates);
        if self.manager.is_false(abstraction) {
            debug!("{} -> bottom along {} with {} predicates", state, edge, predicates.len());
            return Ok(Successor::Bottom);
        }

        let successor = AbstractState::successor(id, edge.to, abstraction, state, edge.id, context);
        debug!("{} -> {}", state, successor);
        self.art.insert(successor);

        if !cfa.is_error_location(edge.to) {
            return Ok(Successor::State(id));
        }

        if !self.refinement || !self.precision.is_refinable() {
            warn!("error location {} reached by {} without refinement", edge.to, id);
            return Err(CpaError::ErrorWithoutRefinement { location: edge.to });
        }

        let path = self.art.path_to(id);
        let info = {
            let states: Vec<&AbstractState> = path.iter().map(|&s| &self.art[s]).collect();
            self.manager.build_counterexample_trace(cfa, &states)
        };
        match &info {
            CounterexampleTraceInfo::Feasible { trace } => {
                warn!("feasible error path of length {} to {}", path.len(), edge.to);
                Err(CpaError::ErrorReached { trace: trace.clone() })
            }
            CounterexampleTraceInfo::Spurious { .. } => {
                info!("spurious error path of length {} to {}", path.len(), edge.to);
                let refinement = self.refine(&path, &info)?;
                Ok(Successor::Refine(refinement))
            }
        }
    }

    /// Check `state` for coverage by a reached state; if covered, mark it and
    /// record the coverer.
    pub fn stop(&mut self, state: StateId, reached: &ReachedSet) -> bool {
        let coverer = StopSep::new(&self.manager).find_coverer(&self.art[state], reached, &self.art);
        match coverer {
            Some(coverer) => {
                self.set_covered_by(state, coverer);
                true
            }
            None => false,
        }
    }

    /// States currently covered by `coverer`.
    pub fn covered_by(&self, coverer: StateId) -> BTreeSet<StateId> {
        self.coverage.covered_by(coverer)
    }

    pub fn set_covered_by(&mut self, covered: StateId, coverer: StateId) {
        self.art.state_mut(covered).set_covered(true);
        self.coverage.set_covered_by(covered, coverer);
    }

    /// Withdraw all coverage by `coverer`; the formerly covered states that
    /// are still in the ART become uncovered.
    pub fn uncover_all(&mut self, coverer: StateId) -> BTreeSet<StateId> {
        let uncovered = self.coverage.uncover_all(coverer);
        for &s in &uncovered {
            if self.art.contains(s) {
                self.art.state_mut(s).set_covered(false);
            }
        }
        uncovered
    }

    #[cfg(test)]
    pub(crate) fn art_mut(&mut self) -> &mut Art {
        &mut self.art
    }
}
