//! The exploration driver.
//!
//! [`CpaAlgorithm`] pops states off a waitlist, computes their successors
//! with the transfer relation, and keeps states that are not covered. A
//! refinement reported by the transfer relation is applied to the reached
//! set and the waitlist before exploration continues.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use log::{debug, info};

use crate::boolprog::BooleanProgramManager;
use crate::cfa::Cfa;
use crate::config::Config;
use crate::error::CpaError;
use crate::manager::{ConcreteTrace, FormulaManager};
use crate::predicate::{FixedPredicateMap, PredicateMap, UpdateablePredicateMap};
use crate::refine::Refinement;
use crate::stop::ReachedSet;
use crate::transfer::{Successor, TransferRelation};
use crate::types::StateId;

/// Result of a completed analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No error location is reachable.
    Safe,
    /// An error location is reachable along the given execution.
    Unsafe(ConcreteTrace),
}

impl Verdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, Verdict::Safe)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    /// Successor states added to the ART.
    pub states_created: usize,
    /// Successors stopped by coverage.
    pub states_covered: usize,
    /// Successor computations that returned bottom.
    pub bottom: usize,
    pub refinements: usize,
    pub art_size: usize,
    pub reached_size: usize,
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "states created:  {}", self.states_created)?;
        writeln!(f, "states covered:  {}", self.states_covered)?;
        writeln!(f, "bottom:          {}", self.bottom)?;
        writeln!(f, "refinements:     {}", self.refinements)?;
        writeln!(f, "ART size:        {}", self.art_size)?;
        write!(f, "reached size:    {}", self.reached_size)
    }
}

pub struct CpaAlgorithm<'c, M: FormulaManager> {
    transfer: TransferRelation<'c, M>,
    reached: ReachedSet,
    waitlist: VecDeque<StateId>,
    queued: HashSet<StateId>,
    breadth_first: bool,
    max_refinements: Option<usize>,
    stats: Statistics,
}

impl<'c> CpaAlgorithm<'c, BooleanProgramManager> {
    /// Analysis of a boolean program, with the precision chosen by `config`:
    /// predicates from `cpa.predicates.file` if given, refined ones otherwise.
    pub fn for_boolean_program(cfa: &'c Cfa, config: &Config) -> Result<Self, CpaError> {
        let manager = BooleanProgramManager::new(cfa);
        let precision: Box<dyn PredicateMap> = match &config.predicate_file {
            Some(path) => {
                let map = FixedPredicateMap::from_file(path, |src| manager.parse_predicate(src))?;
                info!("loaded {} fixed predicates from {}", map.num_predicates(), path.display());
                Box::new(map)
            }
            None => Box::new(UpdateablePredicateMap::new(config.predicate_scope)),
        };
        Ok(Self::new(cfa, manager, precision, config))
    }
}

impl<'c, M: FormulaManager> CpaAlgorithm<'c, M> {
    pub fn new(cfa: &'c Cfa, manager: M, precision: Box<dyn PredicateMap>, config: &Config) -> Self {
        let reached = if config.location_indexed_reached {
            ReachedSet::location_indexed()
        } else {
            ReachedSet::flat()
        };
        Self {
            transfer: TransferRelation::new(cfa, manager, precision, config),
            reached,
            waitlist: VecDeque::new(),
            queued: HashSet::new(),
            breadth_first: config.breadth_first,
            max_refinements: config.max_refinements,
            stats: Statistics::default(),
        }
    }

    pub fn transfer(&self) -> &TransferRelation<'c, M> {
        &self.transfer
    }

    pub fn reached(&self) -> &ReachedSet {
        &self.reached
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    fn pop(&mut self) -> Option<StateId> {
        let state = if self.breadth_first {
            self.waitlist.pop_front()
        } else {
            self.waitlist.pop_back()
        }?;
        self.queued.remove(&state);
        Some(state)
    }

    fn push(&mut self, state: StateId) {
        if self.queued.insert(state) {
            self.waitlist.push_back(state);
        }
    }

    /// Explore from the entry of `main` until the waitlist is empty or an
    /// error is found.
    pub fn run(&mut self) -> Result<Verdict, CpaError> {
        let cfa = self.transfer.cfa();
        let entry = cfa.main().entry;
        info!(
            "exploring {} locations from {} ({})",
            cfa.num_nodes(),
            entry,
            if self.breadth_first { "bfs" } else { "dfs" }
        );

        let root = self.transfer.initial_state(entry);
        self.reached.add(root, entry);
        self.push(root);

        let result = self.explore();
        self.stats.refinements = self.transfer.refinements();
        self.stats.art_size = self.transfer.art().len();
        self.stats.reached_size = self.reached.len();

        match result {
            Ok(()) => {
                info!("program is safe after {} refinements", self.stats.refinements);
                Ok(Verdict::Safe)
            }
            Err(CpaError::ErrorReached { trace }) => {
                info!("program is unsafe: error at {}", trace.error_location());
                Ok(Verdict::Unsafe(trace))
            }
            Err(e) => Err(e),
        }
    }

    fn explore(&mut self) -> Result<(), CpaError> {
        let cfa = self.transfer.cfa();
        while let Some(state) = self.pop() {
            let art = self.transfer.art();
            if !art.contains(state) || art[state].is_covered() {
                continue;
            }
            let location = art[state].location();
            debug!("expanding {} at {}", state, location);

            for &edge in cfa.leaving(location) {
                match self.transfer.successor(state, edge)? {
                    Successor::State(s) => {
                        self.stats.states_created += 1;
                        if self.transfer.stop(s, &self.reached) {
                            self.stats.states_covered += 1;
                        } else {
                            self.reached.add(s, cfa.edge(edge).to);
                            self.push(s);
                        }
                    }
                    Successor::Bottom => self.stats.bottom += 1,
                    Successor::Refine(refinement) => {
                        self.apply(refinement)?;
                        // The remaining edges of a surviving state still
                        // have to be taken.
                        let art = self.transfer.art();
                        if art.contains(state) && !art[state].is_covered() {
                            self.push(state);
                        }
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, refinement: Refinement) -> Result<(), CpaError> {
        if let Some(limit) = self.max_refinements {
            if self.transfer.refinements() > limit {
                return Err(CpaError::RefinementLimit { limit });
            }
        }

        for &s in &refinement.to_unreach {
            self.reached.remove(s);
        }
        self.waitlist.retain(|s| !refinement.to_unreach.contains(s));
        self.queued.retain(|s| !refinement.to_unreach.contains(s));

        for &s in refinement.to_waitlist.iter().chain(&refinement.reopened) {
            if !self.reached.contains(s) {
                self.reached.add(s, self.transfer.art()[s].location());
            }
            self.push(s);
        }
        debug!(
            "after refinement: {} reached, {} waiting",
            self.reached.len(),
            self.waitlist.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::cfa::CfaBuilder;
    use crate::expr::Expr;

    /// `x := true; if !x then error`.
    fn guarded() -> Cfa {
        let mut builder = CfaBuilder::new();
        let main = builder.function("main").unwrap();
        let l1 = builder.node("main");
        let err = builder.error_node("main");
        builder.assign(main.entry, l1, "x", Expr::Lit(true));
        builder.branch(l1, Expr::var("x").not(), err, main.exit);
        builder.build().unwrap()
    }

    #[test]
    fn test_refines_to_safe() {
        let cfa = guarded();
        let mut algorithm = CpaAlgorithm::for_boolean_program(&cfa, &Config::default()).unwrap();
        assert_eq!(algorithm.run().unwrap(), Verdict::Safe);

        let stats = algorithm.statistics();
        assert_eq!(stats.refinements, 1);
        assert!(stats.bottom >= 1);
        assert_eq!(algorithm.transfer().precision().num_predicates(), 1);
        assert_eq!(stats.reached_size, algorithm.reached().len());
    }

    #[test]
    fn test_refinement_limit() {
        let cfa = guarded();
        let config = Config::default().with_max_refinements(0);
        let mut algorithm = CpaAlgorithm::for_boolean_program(&cfa, &config).unwrap();
        assert!(matches!(algorithm.run(), Err(CpaError::RefinementLimit { limit: 0 })));
    }

    #[test]
    fn test_waitlist_holds_states_once() {
        let cfa = guarded();
        let mut algorithm = CpaAlgorithm::for_boolean_program(&cfa, &Config::default()).unwrap();
        let a = StateId::new(0);
        let b = StateId::new(1);
        algorithm.push(a);
        algorithm.push(b);
        algorithm.push(a);
        assert_eq!(algorithm.waitlist.len(), 2);

        assert_eq!(algorithm.pop(), Some(b));
        algorithm.push(b);
        assert_eq!(algorithm.waitlist.len(), 2);
        assert_eq!(algorithm.pop(), Some(b));
        assert_eq!(algorithm.pop(), Some(a));
        assert_eq!(algorithm.pop(), None);
        assert!(algorithm.queued.is_empty());
    }

    #[test]
    fn test_statistics_display() {
        let stats = Statistics {
            states_created: 3,
            ..Default::default()
        };
        assert!(stats.to_string().starts_with("states created:  3\n"));
    }
}
