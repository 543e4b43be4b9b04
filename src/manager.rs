//! Interface to the formula manager.
//!
//! The analysis never looks inside an abstraction. Everything it needs to
//! know about formulas (the abstract post-image, entailment, and whether an
//! abstract error path is real) goes through [`FormulaManager`].
//! [`BooleanProgramManager`][crate::boolprog::BooleanProgramManager] is the
//! implementation shipped with this crate.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::cfa::{Cfa, CfaEdge};
use crate::predicate::Predicate;
use crate::reference::Ref;
use crate::state::AbstractState;
use crate::types::{EdgeId, NodeId, StateId};

/// Opaque handle to a formula owned by the formula manager.
pub type Formula = Ref;

pub trait FormulaManager {
    /// The formula `true`, used as the initial abstraction.
    fn make_true(&self) -> Formula;

    fn is_false(&self, formula: Formula) -> bool;

    /// Whether every concrete state in `a` is also in `b`.
    fn entails(&self, a: Formula, b: Formula) -> bool;

    /// Abstract post-image of `state` along `edge`, expressed over
    /// `predicates`.
    fn build_abstraction(
        &self,
        state: &AbstractState,
        edge: &CfaEdge,
        predicates: &BTreeSet<Predicate>,
    ) -> Formula;

    /// Check an abstract path (root first) for feasibility.
    fn build_counterexample_trace(
        &self,
        cfa: &Cfa,
        path: &[&AbstractState],
    ) -> CounterexampleTraceInfo;
}

/// Result of a feasibility check of an abstract error path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterexampleTraceInfo {
    /// No concrete execution follows the path. Carries, per path state, the
    /// predicates that rule the path out.
    Spurious {
        predicates: BTreeMap<StateId, BTreeSet<Predicate>>,
    },
    /// A concrete execution reaches the error location.
    Feasible { trace: ConcreteTrace },
}

impl CounterexampleTraceInfo {
    pub fn is_spurious(&self) -> bool {
        matches!(self, CounterexampleTraceInfo::Spurious { .. })
    }

    /// New predicates attributed to `state`; empty if none or if feasible.
    pub fn predicates_for(&self, state: StateId) -> BTreeSet<Predicate> {
        match self {
            CounterexampleTraceInfo::Spurious { predicates } => {
                predicates.get(&state).cloned().unwrap_or_default()
            }
            CounterexampleTraceInfo::Feasible { .. } => BTreeSet::new(),
        }
    }
}

/// One step of a concrete execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceStep {
    pub location: NodeId,
    /// Edge taken to get here, `None` for the first step.
    pub edge: Option<EdgeId>,
    pub values: BTreeMap<String, bool>,
}

/// A concrete execution from the program entry to an error location.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConcreteTrace {
    pub steps: Vec<TraceStep>,
}

impl ConcreteTrace {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Location of the last step.
    pub fn error_location(&self) -> NodeId {
        self.steps
            .last()
            .map_or(NodeId::new(0), |step| step.location)
    }
}

impl fmt::Display for ConcreteTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            let values = step
                .values
                .iter()
                .map(|(k, v)| format!("{}={}", k, if *v { 1 } else { 0 }))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "{:>3}: {} {{{}}}", i, step.location, values)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::bdd::Bdd;

    /// Entailment straight from a [`Bdd`]; abstraction and trace building
    /// are never called by the tests using it.
    pub(crate) struct BddEntailment(pub Bdd);

    impl FormulaManager for BddEntailment {
        fn make_true(&self) -> Formula {
            self.0.one
        }

        fn is_false(&self, formula: Formula) -> bool {
            self.0.is_zero(formula)
        }

        fn entails(&self, a: Formula, b: Formula) -> bool {
            self.0.is_implies(a, b)
        }

        fn build_abstraction(&self, _: &AbstractState, _: &CfaEdge, _: &BTreeSet<Predicate>) -> Formula {
            unreachable!("abstraction is not needed here")
        }

        fn build_counterexample_trace(&self, _: &Cfa, _: &[&AbstractState]) -> CounterexampleTraceInfo {
            unreachable!("trace building is not needed here")
        }
    }
}
