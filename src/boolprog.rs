//! Formula manager for boolean programs.
//!
//! Regions are BDDs over the program variables: variable `k` in name order
//! is BDD variable `k + 1`. One scratch variable follows for assignments,
//! and each predicate used in an abstraction gets its own indicator variable
//! above that, allocated on first use.
//!
//! Abstractions are Boolean predicate abstractions: the strongest
//! combination of predicates implied by the concrete post-image. Error paths
//! are checked exactly with forward images; the interpolants of a spurious
//! path are the complements of its backward pre-images, and their variables
//! become the new predicates.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::debug;
use num_bigint::BigUint;

use crate::bdd::Bdd;
use crate::cfa::{Cfa, CfaEdge, EdgeKind};
use crate::error::ParseError;
use crate::expr::Expr;
use crate::manager::{ConcreteTrace, CounterexampleTraceInfo, Formula, FormulaManager, TraceStep};
use crate::predicate::Predicate;
use crate::state::AbstractState;
use crate::types::StateId;

pub struct BooleanProgramManager {
    bdd: Bdd,
    names: Vec<String>,
    variables: BTreeMap<String, u32>,
    program_vars: BTreeSet<u32>,
    scratch: u32,
    indicators: RefCell<HashMap<Formula, u32>>,
}

impl BooleanProgramManager {
    /// A manager for the variables of `cfa`.
    pub fn new(cfa: &Cfa) -> Self {
        Self::with_variables(cfa.variables())
    }

    pub fn with_variables(names: impl IntoIterator<Item = String>) -> Self {
        let names: Vec<String> = names.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let variables: BTreeMap<String, u32> = names
            .iter()
            .enumerate()
            .map(|(k, name)| (name.clone(), k as u32 + 1))
            .collect();
        let program_vars = variables.values().copied().collect();
        let scratch = names.len() as u32 + 1;
        debug!("boolean program over {} variables", names.len());
        Self {
            bdd: Bdd::default(),
            names,
            variables,
            program_vars,
            scratch,
            indicators: RefCell::new(HashMap::new()),
        }
    }

    pub fn bdd(&self) -> &Bdd {
        &self.bdd
    }

    pub fn num_variables(&self) -> usize {
        self.names.len()
    }

    /// BDD variable of a program variable.
    pub fn variable(&self, name: &str) -> Option<u32> {
        self.variables.get(name).copied()
    }

    fn name_of(&self, var: u32) -> Option<&str> {
        if var == 0 {
            return None;
        }
        self.names.get(var as usize - 1).map(String::as_str)
    }

    pub fn expr_to_formula(&self, expr: &Expr) -> Result<Formula, ParseError> {
        let bdd = &self.bdd;
        Ok(match expr {
            Expr::Lit(true) => bdd.one,
            Expr::Lit(false) => bdd.zero,
            Expr::Var(name) => {
                let v = self
                    .variable(name)
                    .ok_or_else(|| ParseError::UnknownVariable(name.clone()))?;
                bdd.mk_var(v)
            }
            Expr::Not(e) => bdd.apply_not(self.expr_to_formula(e)?),
            Expr::And(l, r) => bdd.apply_and(self.expr_to_formula(l)?, self.expr_to_formula(r)?),
            Expr::Or(l, r) => bdd.apply_or(self.expr_to_formula(l)?, self.expr_to_formula(r)?),
            Expr::Xor(l, r) => bdd.apply_xor(self.expr_to_formula(l)?, self.expr_to_formula(r)?),
            Expr::Implies(l, r) => bdd.apply_imply(self.expr_to_formula(l)?, self.expr_to_formula(r)?),
            Expr::Eq(l, r) => bdd.apply_eq(self.expr_to_formula(l)?, self.expr_to_formula(r)?),
        })
    }

    fn edge_formula(&self, expr: &Expr) -> Formula {
        match self.expr_to_formula(expr) {
            Ok(f) => f,
            Err(e) => panic!("Edge expression `{}` is not over this program: {}", expr, e),
        }
    }

    /// A predicate named after the expression it stands for.
    pub fn predicate(&self, expr: &Expr) -> Result<Predicate, ParseError> {
        let formula = self.expr_to_formula(expr)?;
        Ok(Predicate::new(&expr.to_string(), formula))
    }

    pub fn parse_predicate(&self, source: &str) -> Result<Predicate, ParseError> {
        self.predicate(&Expr::parse(source)?)
    }

    /// The predicate that is just the program variable `name`.
    pub fn atom(&self, name: &str) -> Option<Predicate> {
        let v = self.variable(name)?;
        Some(Predicate::new(name, self.bdd.mk_var(v)))
    }

    /// Number of concrete states in `formula`.
    pub fn model_count(&self, formula: Formula) -> BigUint {
        self.bdd.sat_count(formula, self.names.len())
    }

    fn indicator(&self, predicate: &Predicate) -> u32 {
        let mut indicators = self.indicators.borrow_mut();
        let next = self.scratch + 1 + indicators.len() as u32;
        *indicators.entry(predicate.formula()).or_insert(next)
    }

    /// Concrete post-image of `region` along `edge`.
    pub fn post(&self, region: Formula, edge: &CfaEdge) -> Formula {
        let bdd = &self.bdd;
        match &edge.kind {
            EdgeKind::Assign { var, expr } => {
                let x = self.var_of(var);
                let t = bdd.mk_var(self.scratch);
                let value = self.edge_formula(expr);
                let staged = bdd.exists(bdd.apply_and(region, bdd.apply_eq(t, value)), &BTreeSet::from([x]));
                let moved = bdd.apply_and(staged, bdd.apply_eq(bdd.mk_var(x), t));
                bdd.exists(moved, &BTreeSet::from([self.scratch]))
            }
            EdgeKind::Havoc { var } => bdd.exists(region, &BTreeSet::from([self.var_of(var)])),
            EdgeKind::Assume(cond) => bdd.apply_and(region, self.edge_formula(cond)),
            EdgeKind::Blank | EdgeKind::Call { .. } | EdgeKind::Return => region,
        }
    }

    /// States from which `edge` leads into `region`.
    pub fn pre(&self, region: Formula, edge: &CfaEdge) -> Formula {
        let bdd = &self.bdd;
        match &edge.kind {
            EdgeKind::Assign { var, expr } => bdd.compose(region, self.var_of(var), self.edge_formula(expr)),
            EdgeKind::Havoc { var } => bdd.exists(region, &BTreeSet::from([self.var_of(var)])),
            EdgeKind::Assume(cond) => bdd.apply_and(region, self.edge_formula(cond)),
            EdgeKind::Blank | EdgeKind::Call { .. } | EdgeKind::Return => region,
        }
    }

    fn var_of(&self, name: &str) -> u32 {
        match self.variable(name) {
            Some(v) => v,
            None => panic!("Variable `{}` is not in this program", name),
        }
    }

    /// Boolean abstraction of `region` over `predicates`.
    pub fn abstract_region(&self, region: Formula, predicates: &BTreeSet<Predicate>) -> Formula {
        let bdd = &self.bdd;
        if predicates.is_empty() {
            return if bdd.is_zero(region) { bdd.zero } else { bdd.one };
        }
        let indicators: Vec<(u32, Formula)> = predicates.iter().map(|p| (self.indicator(p), p.formula())).collect();
        let indicator_vars: BTreeSet<u32> = indicators.iter().map(|&(b, _)| b).collect();
        let definitions = bdd.apply_and_many(indicators.iter().map(|&(b, f)| bdd.apply_eq(bdd.mk_var(b), f)));
        let over_indicators = bdd.exists(bdd.apply_and(region, definitions), &self.program_vars);
        bdd.exists(bdd.apply_and(over_indicators, definitions), &indicator_vars)
    }

    /// One concrete state of a non-empty `region`, as a full cube and as
    /// variable values. Variables the region does not constrain are false.
    fn pick_state(&self, region: Formula) -> (Formula, BTreeMap<String, bool>) {
        let literals = match self.bdd.one_sat(region) {
            Some(literals) => literals,
            None => panic!("Cannot pick a state from an empty region"),
        };
        let mut values: BTreeMap<String, bool> = self.names.iter().map(|n| (n.clone(), false)).collect();
        for lit in literals {
            if let Some(name) = self.name_of(lit.unsigned_abs() as u32) {
                values.insert(name.to_string(), lit > 0);
            }
        }
        let cube = self.bdd.apply_and_many(values.iter().map(|(name, &value)| {
            let x = self.bdd.mk_var(self.variables[name]);
            if value {
                x
            } else {
                -x
            }
        }));
        (cube, values)
    }
}

impl FormulaManager for BooleanProgramManager {
    fn make_true(&self) -> Formula {
        self.bdd.one
    }

    fn is_false(&self, formula: Formula) -> bool {
        self.bdd.is_zero(formula)
    }

    fn entails(&self, a: Formula, b: Formula) -> bool {
        self.bdd.is_implies(a, b)
    }

    fn build_abstraction(&self, state: &AbstractState, edge: &CfaEdge, predicates: &BTreeSet<Predicate>) -> Formula {
        let post = self.post(state.abstraction(), edge);
        let abstraction = self.abstract_region(post, predicates);
        debug!(
            "abstraction along {} over {} predicates has {} nodes",
            edge,
            predicates.len(),
            self.bdd.size(abstraction)
        );
        abstraction
    }

    fn build_counterexample_trace(&self, cfa: &Cfa, path: &[&AbstractState]) -> CounterexampleTraceInfo {
        assert!(!path.is_empty(), "Empty abstract path");
        let bdd = &self.bdd;
        let n = path.len() - 1;
        let edges: Vec<&CfaEdge> = path[1..]
            .iter()
            .filter_map(|s| s.incoming())
            .map(|e| cfa.edge(e))
            .collect();
        assert_eq!(edges.len(), n, "Path state without incoming edge");

        let mut forward = Vec::with_capacity(n + 1);
        forward.push(bdd.one);
        for (i, edge) in edges.iter().enumerate() {
            forward.push(self.post(forward[i], edge));
        }

        if !bdd.is_zero(forward[n]) {
            let mut steps = Vec::with_capacity(n + 1);
            let (mut cube, values) = self.pick_state(forward[n]);
            steps.push(TraceStep {
                location: path[n].location(),
                edge: path[n].incoming(),
                values,
            });
            for i in (0..n).rev() {
                let candidates = bdd.apply_and(forward[i], self.pre(cube, edges[i]));
                let (next, values) = self.pick_state(candidates);
                cube = next;
                steps.push(TraceStep {
                    location: path[i].location(),
                    edge: path[i].incoming(),
                    values,
                });
            }
            steps.reverse();
            debug!("path of {} states is feasible", path.len());
            return CounterexampleTraceInfo::Feasible {
                trace: ConcreteTrace { steps },
            };
        }

        let mut backward = vec![bdd.one; n + 1];
        for i in (0..n).rev() {
            backward[i] = self.pre(backward[i + 1], edges[i]);
        }

        let mut predicates: BTreeMap<StateId, BTreeSet<Predicate>> = BTreeMap::new();
        for i in 1..n {
            let interpolant = -backward[i];
            if bdd.is_terminal(interpolant) {
                continue;
            }
            let atoms: BTreeSet<Predicate> = bdd
                .support(interpolant)
                .into_iter()
                .filter_map(|v| self.name_of(v))
                .filter_map(|name| self.atom(name))
                .collect();
            debug!(
                "interpolant at {} mentions {}",
                path[i].id(),
                atoms.iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
            );
            if !atoms.is_empty() {
                predicates.insert(path[i - 1].id(), atoms);
            }
        }
        CounterexampleTraceInfo::Spurious { predicates }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::cfa::CfaBuilder;
    use crate::state::CallContext;
    use crate::types::EdgeId;

    /// States along `edges`, starting at the source of the first one.
    fn path_states(cfa: &Cfa, edges: &[EdgeId], abstraction: Formula) -> Vec<AbstractState> {
        let mut states = vec![AbstractState::initial(
            StateId::new(0),
            cfa.edge(edges[0]).from,
            abstraction,
        )];
        for (i, &e) in edges.iter().enumerate() {
            states.push(AbstractState::successor(
                StateId::new(i as u32 + 1),
                cfa.edge(e).to,
                abstraction,
                StateId::new(i as u32),
                e,
                CallContext::empty(),
            ));
        }
        states
    }

    #[test]
    fn test_variable_layout() {
        let manager = BooleanProgramManager::with_variables(["y".to_string(), "x".to_string()]);
        assert_eq!(manager.variable("x"), Some(1));
        assert_eq!(manager.variable("y"), Some(2));
        assert_eq!(manager.variable("z"), None);
        assert_eq!(manager.num_variables(), 2);
    }

    #[test]
    fn test_expr_to_formula() {
        let manager = BooleanProgramManager::with_variables(["x".to_string(), "y".to_string()]);
        let bdd = manager.bdd();
        let f = manager.expr_to_formula(&Expr::parse("x -> y").unwrap()).unwrap();
        assert_eq!(f, bdd.apply_imply(bdd.mk_var(1), bdd.mk_var(2)));
        assert_eq!(
            manager.expr_to_formula(&Expr::var("z")),
            Err(ParseError::UnknownVariable("z".to_string()))
        );
        assert_eq!(manager.parse_predicate("!x").unwrap().name(), "!x");
    }

    #[test]
    fn test_post_and_pre() {
        let mut builder = CfaBuilder::new();
        let main = builder.function("main").unwrap();
        let flip = builder.assign(main.entry, main.exit, "x", Expr::var("x").not());
        let havoc = builder.havoc(main.entry, main.exit, "y");
        let cfa = builder.build().unwrap();
        let manager = BooleanProgramManager::new(&cfa);
        let bdd = manager.bdd();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let xy = bdd.apply_and(x, y);

        assert_eq!(manager.post(xy, cfa.edge(flip)), bdd.apply_and(-x, y));
        assert_eq!(manager.pre(xy, cfa.edge(flip)), bdd.apply_and(-x, y));
        assert_eq!(manager.post(xy, cfa.edge(havoc)), x);
        assert_eq!(manager.pre(y, cfa.edge(havoc)), bdd.one);
    }

    #[test]
    fn test_abstraction() {
        let mut builder = CfaBuilder::new();
        let main = builder.function("main").unwrap();
        let set = builder.assign(main.entry, main.exit, "x", Expr::Lit(true));
        let block = builder.assume(main.entry, main.exit, Expr::var("x").and(Expr::var("x").not()));
        builder.havoc(main.entry, main.exit, "y");
        let cfa = builder.build().unwrap();
        let manager = BooleanProgramManager::new(&cfa);
        let bdd = manager.bdd();
        let root = AbstractState::initial(StateId::new(0), main.entry, bdd.one);

        let none = BTreeSet::new();
        assert!(bdd.is_one(manager.build_abstraction(&root, cfa.edge(set), &none)));
        assert!(bdd.is_zero(manager.build_abstraction(&root, cfa.edge(block), &none)));

        let x = BTreeSet::from([manager.atom("x").unwrap()]);
        assert_eq!(manager.build_abstraction(&root, cfa.edge(set), &x), bdd.mk_var(1));

        // y is not tracked, so its value is lost.
        let y = BTreeSet::from([manager.atom("y").unwrap()]);
        assert!(bdd.is_one(manager.build_abstraction(&root, cfa.edge(set), &y)));
    }

    #[test]
    fn test_spurious_path() {
        let mut builder = CfaBuilder::new();
        let main = builder.function("main").unwrap();
        let l1 = builder.node("main");
        let err = builder.error_node("main");
        let e0 = builder.assign(main.entry, l1, "x", Expr::Lit(true));
        let e1 = builder.assume(l1, err, Expr::var("x").not());
        let cfa = builder.build().unwrap();
        let manager = BooleanProgramManager::new(&cfa);

        let states = path_states(&cfa, &[e0, e1], manager.bdd().one);
        let path: Vec<&AbstractState> = states.iter().collect();
        let info = manager.build_counterexample_trace(&cfa, &path);

        assert!(info.is_spurious());
        let names: Vec<_> = info
            .predicates_for(StateId::new(0))
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["x"]);
        assert!(info.predicates_for(StateId::new(1)).is_empty());
    }

    #[test]
    fn test_feasible_path() {
        let mut builder = CfaBuilder::new();
        let main = builder.function("main").unwrap();
        let l1 = builder.node("main");
        let l2 = builder.node("main");
        let err = builder.error_node("main");
        let e0 = builder.havoc(main.entry, l1, "x");
        let e1 = builder.assign(l1, l2, "y", Expr::var("x").not());
        let e2 = builder.assume(l2, err, Expr::var("y"));
        let cfa = builder.build().unwrap();
        let manager = BooleanProgramManager::new(&cfa);

        let states = path_states(&cfa, &[e0, e1, e2], manager.bdd().one);
        let path: Vec<&AbstractState> = states.iter().collect();
        let CounterexampleTraceInfo::Feasible { trace } = manager.build_counterexample_trace(&cfa, &path) else {
            panic!("path must be feasible");
        };

        assert_eq!(trace.len(), 4);
        assert_eq!(trace.error_location(), err);
        assert_eq!(trace.steps[0].location, main.entry);
        assert_eq!(trace.steps[0].edge, None);
        assert_eq!(trace.steps[3].edge, Some(e2));
        assert!(!trace.steps[2].values["x"]);
        assert!(trace.steps[2].values["y"]);
        assert!(trace.steps[3].values["y"]);
    }

    #[test]
    fn test_model_count() {
        let manager = BooleanProgramManager::with_variables(["a", "b", "c"].map(String::from));
        let bdd = manager.bdd();
        assert_eq!(manager.model_count(bdd.one), BigUint::from(8u32));
        assert_eq!(manager.model_count(bdd.mk_var(2)), BigUint::from(4u32));
        assert_eq!(manager.model_count(bdd.zero), BigUint::from(0u32));
    }
}
