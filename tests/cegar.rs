use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};

use test_log::test;

use lazy_cpa::algorithm::{CpaAlgorithm, Verdict};
use lazy_cpa::boolprog::BooleanProgramManager;
use lazy_cpa::cfa::{Cfa, CfaBuilder, CfaEdge};
use lazy_cpa::config::Config;
use lazy_cpa::error::CpaError;
use lazy_cpa::expr::Expr;
use lazy_cpa::manager::{CounterexampleTraceInfo, Formula, FormulaManager};
use lazy_cpa::predicate::{Predicate, PredicateScope, UpdateablePredicateMap};
use lazy_cpa::state::AbstractState;
use lazy_cpa::stop::ReachedSet;
use lazy_cpa::transfer::{Successor, TransferRelation};

/// `x := true; if (!x) error;`
fn guarded() -> Cfa {
    let mut builder = CfaBuilder::new();
    let main = builder.function("main").unwrap();
    let l1 = builder.node("main");
    let err = builder.error_node("main");
    builder.assign(main.entry, l1, "x", Expr::Lit(true));
    builder.branch(l1, Expr::var("x").not(), err, main.exit);
    builder.build().unwrap()
}

/// A lock that is acquired on request and released right away; acquiring it
/// twice is an error.
///
/// ```text
/// lock := false;
/// loop {
///     req := *;
///     if (req) {
///         if (lock) error;
///         lock := true;
///         lock := false;
///     }
/// }
/// ```
fn lock() -> Cfa {
    let mut builder = CfaBuilder::new();
    let main = builder.function("main").unwrap();
    let head = builder.node("main");
    let h1 = builder.node("main");
    let acq = builder.node("main");
    let a2 = builder.node("main");
    let rel = builder.node("main");
    let err = builder.error_node("main");
    builder.assign(main.entry, head, "lock", Expr::Lit(false));
    builder.havoc(head, h1, "req");
    builder.branch(h1, Expr::var("req"), acq, head);
    builder.branch(acq, Expr::var("lock"), err, a2);
    builder.assign(a2, rel, "lock", Expr::Lit(true));
    builder.assign(rel, head, "lock", Expr::Lit(false));
    builder.blank(head, main.exit);
    builder.build().unwrap()
}

/// `flip` negates `x`; `main` flips twice and checks `x` after each call.
///
/// ```text
/// x := false;
/// flip(); if (!x) error;
/// flip(); if (x) error;
/// ```
fn flip_twice() -> Cfa {
    let mut builder = CfaBuilder::new();
    let main = builder.function("main").unwrap();
    let c1 = builder.node("main");
    let r1 = builder.node("main");
    let c2 = builder.node("main");
    let r2 = builder.node("main");
    let err = builder.error_node("main");
    builder.assign(main.entry, c1, "x", Expr::Lit(false));
    builder.call(c1, "flip", r1);
    builder.branch(r1, Expr::var("x").not(), err, c2);
    builder.call(c2, "flip", r2);
    builder.branch(r2, Expr::var("x"), err, main.exit);
    let flip = builder.function("flip").unwrap();
    builder.assign(flip.entry, flip.exit, "x", Expr::var("x").not());
    builder.build().unwrap()
}

/// `x := false; flip(); if (x) error;`, which fails.
fn flip_once_unsafe() -> Cfa {
    let mut builder = CfaBuilder::new();
    let main = builder.function("main").unwrap();
    let c1 = builder.node("main");
    let r1 = builder.node("main");
    let err = builder.error_node("main");
    builder.assign(main.entry, c1, "x", Expr::Lit(false));
    builder.call(c1, "flip", r1);
    builder.branch(r1, Expr::var("x"), err, main.exit);
    let flip = builder.function("flip").unwrap();
    builder.assign(flip.entry, flip.exit, "x", Expr::var("x").not());
    builder.build().unwrap()
}

/// `a := *; b := a; if (a ^ b) error;`
fn copy() -> Cfa {
    let mut builder = CfaBuilder::new();
    let main = builder.function("main").unwrap();
    let l1 = builder.node("main");
    let l2 = builder.node("main");
    let err = builder.error_node("main");
    builder.havoc(main.entry, l1, "a");
    builder.assign(l1, l2, "b", Expr::var("a"));
    builder.branch(l2, Expr::var("a").xor(Expr::var("b")), err, main.exit);
    builder.build().unwrap()
}

fn analyze(cfa: &Cfa, config: &Config) -> Result<Verdict, CpaError> {
    CpaAlgorithm::for_boolean_program(cfa, config)?.run()
}

#[test]
fn test_guarded_is_safe() {
    assert_eq!(analyze(&guarded(), &Config::default()).unwrap(), Verdict::Safe);
}

#[test]
fn test_lock_is_safe() {
    let cfa = lock();
    let mut algorithm = CpaAlgorithm::for_boolean_program(&cfa, &Config::default()).unwrap();
    assert_eq!(algorithm.run().unwrap(), Verdict::Safe);
    let stats = algorithm.statistics();
    assert!(stats.refinements >= 1);
    assert!(stats.states_covered >= 1);
}

#[test]
fn test_copy_is_safe() {
    assert_eq!(analyze(&copy(), &Config::default()).unwrap(), Verdict::Safe);
}

#[test]
fn test_lock_is_safe_in_every_mode() {
    let cfa = lock();
    let configs = [
        Config::default().with_breadth_first(true),
        Config::default().with_location_indexed_reached(false),
        Config::default().with_predicate_scope(PredicateScope::Function),
        Config::default().with_predicate_scope(PredicateScope::Global),
        Config::default()
            .with_breadth_first(true)
            .with_predicate_scope(PredicateScope::Global),
    ];
    for config in &configs {
        assert_eq!(analyze(&cfa, config).unwrap(), Verdict::Safe, "{:?}", config);
    }
}

#[test]
fn test_unsafe_trace() {
    let mut builder = CfaBuilder::new();
    let main = builder.function("main").unwrap();
    let l1 = builder.node("main");
    let err = builder.error_node("main");
    builder.havoc(main.entry, l1, "x");
    builder.branch(l1, Expr::var("x"), err, main.exit);
    let cfa = builder.build().unwrap();

    let Verdict::Unsafe(trace) = analyze(&cfa, &Config::default()).unwrap() else {
        panic!("program must be unsafe");
    };
    assert_eq!(trace.len(), 3);
    assert_eq!(trace.error_location(), err);
    assert_eq!(trace.steps[0].location, main.entry);
    assert!(trace.steps[2].values["x"]);
}

#[test]
fn test_interprocedural_safe() {
    let cfa = flip_twice();
    for config in [Config::default(), Config::default().with_breadth_first(true)] {
        assert_eq!(analyze(&cfa, &config).unwrap(), Verdict::Safe);
    }
}

#[test]
fn test_interprocedural_unsafe() {
    let cfa = flip_once_unsafe();
    let Verdict::Unsafe(trace) = analyze(&cfa, &Config::default()).unwrap() else {
        panic!("program must be unsafe");
    };
    let flip = cfa.function("flip").unwrap();
    assert!(trace.steps.iter().any(|step| step.location == flip.exit));
    assert!(trace.steps.last().unwrap().values["x"]);
}

#[test]
fn test_no_refinement() {
    let config = Config::default().with_refinement(false);
    assert!(matches!(
        analyze(&guarded(), &config),
        Err(CpaError::ErrorWithoutRefinement { .. })
    ));
}

#[test]
fn test_no_refinement_without_errors() {
    let mut builder = CfaBuilder::new();
    let main = builder.function("main").unwrap();
    builder.havoc(main.entry, main.exit, "x");
    let cfa = builder.build().unwrap();

    let config = Config::default().with_refinement(false);
    assert_eq!(analyze(&cfa, &config).unwrap(), Verdict::Safe);
}

fn predicate_file(name: &str, contents: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("lazy-cpa-{}-{}.preds", name, std::process::id()));
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_fixed_predicates() {
    let path = predicate_file("fixed", "# all we need\n*: x\n");
    let config = Config::default().with_predicate_file(&path);
    let cfa = guarded();
    let mut algorithm = CpaAlgorithm::for_boolean_program(&cfa, &config).unwrap();
    let verdict = algorithm.run();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(verdict.unwrap(), Verdict::Safe);
    assert_eq!(algorithm.statistics().refinements, 0);
    assert!(!algorithm.transfer().precision().is_refinable());
}

#[test]
fn test_fixed_predicates_too_weak() {
    let path = predicate_file("weak", "main: true\n");
    let config = Config::default().with_predicate_file(&path);
    let result = analyze(&guarded(), &config);
    std::fs::remove_file(&path).unwrap();

    assert!(matches!(result, Err(CpaError::ErrorWithoutRefinement { .. })));
}

#[test]
fn test_predicate_file_errors() {
    let path = predicate_file("unknown", "*: nope\n");
    let config = Config::default().with_predicate_file(&path);
    let result = CpaAlgorithm::for_boolean_program(&guarded(), &config).map(|_| ());
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(result, Err(CpaError::Parse(_))));

    let config = Config::default().with_predicate_file("/nonexistent/lazy-cpa.preds");
    assert!(matches!(
        CpaAlgorithm::for_boolean_program(&guarded(), &config).map(|_| ()),
        Err(CpaError::Io(_))
    ));
}

#[test]
fn test_config_from_properties() {
    let config = Config::from_properties("analysis.bfs = true\ncpa.predicates.scope = global\n").unwrap();
    assert_eq!(analyze(&flip_twice(), &config).unwrap(), Verdict::Safe);
}

fn transfer(cfa: &Cfa) -> TransferRelation<'_, BooleanProgramManager> {
    let config = Config::default();
    TransferRelation::new(
        cfa,
        BooleanProgramManager::new(cfa),
        Box::new(UpdateablePredicateMap::new(config.predicate_scope)),
        &config,
    )
}

#[test]
fn test_first_successor() {
    let mut builder = CfaBuilder::new();
    let main = builder.function("main").unwrap();
    let edge = builder.blank(main.entry, main.exit);
    let cfa = builder.build().unwrap();
    let mut tr = transfer(&cfa);

    let root = tr.initial_state(main.entry);
    let Ok(Successor::State(s)) = tr.successor(root, edge) else {
        panic!("successor must exist");
    };
    assert_eq!(s.id(), root.id() + 1);
    assert_eq!(tr.art()[s].parent(), Some(root));
    assert!(tr.manager().bdd().is_one(tr.art()[s].abstraction()));
}

#[test]
fn test_return_to_wrong_call_site() {
    let cfa = flip_twice();
    let mut tr = transfer(&cfa);
    let main = cfa.main();
    let flip = cfa.function("flip").unwrap();

    let root = tr.initial_state(main.entry);
    let mut state = root;
    // x := false; call flip; x := !x
    for _ in 0..3 {
        let edge = cfa.leaving(tr.art()[state].location())[0];
        let Ok(Successor::State(next)) = tr.successor(state, edge) else {
            panic!("straight-line prefix must be feasible");
        };
        state = next;
    }
    assert_eq!(tr.art()[state].location(), flip.exit);
    let expected = tr.art()[state].context().top().unwrap().return_location;

    let returns = cfa.leaving(flip.exit);
    assert_eq!(returns.len(), 2);
    for &edge in returns {
        let result = tr.successor(state, edge).unwrap();
        if cfa.edge(edge).to == expected {
            assert!(matches!(result, Successor::State(_)));
        } else {
            assert_eq!(result, Successor::Bottom);
        }
    }
}

#[test]
fn test_coverage_needs_same_context() {
    let cfa = flip_twice();
    let mut tr = transfer(&cfa);
    let main = cfa.main();
    let flip = cfa.function("flip").unwrap();
    let mut reached = ReachedSet::location_indexed();

    // Both calls enter `flip` with abstraction true, from different call sites.
    let root = tr.initial_state(main.entry);
    reached.add(root, main.entry);
    let mut entries = Vec::new();
    let mut state = root;
    for _ in 0..7 {
        let location = tr.art()[state].location();
        let mut next = None;
        for &edge in cfa.leaving(location) {
            if cfa.is_error_location(cfa.edge(edge).to) {
                continue;
            }
            if let Ok(Successor::State(s)) = tr.successor(state, edge) {
                next = Some(s);
                break;
            }
        }
        state = next.unwrap();
        if tr.art()[state].location() == flip.entry {
            entries.push(state);
        }
    }
    assert_eq!(entries.len(), 2);

    reached.add(entries[0], flip.entry);
    assert!(!tr.stop(entries[1], &reached));
    assert!(tr.covered_by(entries[0]).is_empty());
    assert_eq!(
        tr.art()[entries[0]].abstraction(),
        tr.art()[entries[1]].abstraction()
    );
    assert_ne!(
        tr.art()[entries[0]].context().top().unwrap().return_location,
        tr.art()[entries[1]].context().top().unwrap().return_location
    );
}

/// Boolean-program manager that hands the predicates of its first spurious
/// path to the error state, which makes the error state the refinement root.
struct BlameErrorStateOnce {
    inner: BooleanProgramManager,
    blamed: Cell<bool>,
}

impl FormulaManager for BlameErrorStateOnce {
    fn make_true(&self) -> Formula {
        self.inner.make_true()
    }

    fn is_false(&self, formula: Formula) -> bool {
        self.inner.is_false(formula)
    }

    fn entails(&self, a: Formula, b: Formula) -> bool {
        self.inner.entails(a, b)
    }

    fn build_abstraction(&self, state: &AbstractState, edge: &CfaEdge, predicates: &BTreeSet<Predicate>) -> Formula {
        self.inner.build_abstraction(state, edge, predicates)
    }

    fn build_counterexample_trace(&self, cfa: &Cfa, path: &[&AbstractState]) -> CounterexampleTraceInfo {
        let info = self.inner.build_counterexample_trace(cfa, path);
        match info {
            CounterexampleTraceInfo::Spurious { predicates } if !self.blamed.replace(true) => {
                let all: BTreeSet<Predicate> = predicates.into_values().flatten().collect();
                let error = path[path.len() - 1].id();
                CounterexampleTraceInfo::Spurious {
                    predicates: BTreeMap::from([(error, all)]),
                }
            }
            info => info,
        }
    }
}

#[test]
fn test_refinement_at_error_state_keeps_sibling_edges() {
    // x := false; if (x) error1; if (!x) error2;
    let mut builder = CfaBuilder::new();
    let main = builder.function("main").unwrap();
    let l1 = builder.node("main");
    let err1 = builder.error_node("main");
    let err2 = builder.error_node("main");
    builder.assign(main.entry, l1, "x", Expr::Lit(false));
    builder.assume(l1, err1, Expr::var("x"));
    builder.assume(l1, err2, Expr::var("x").not());
    let cfa = builder.build().unwrap();

    let manager = BlameErrorStateOnce {
        inner: BooleanProgramManager::new(&cfa),
        blamed: Cell::new(false),
    };
    let config = Config::default();
    let precision = Box::new(UpdateablePredicateMap::new(config.predicate_scope));
    let mut algorithm = CpaAlgorithm::new(&cfa, manager, precision, &config);

    let Verdict::Unsafe(trace) = algorithm.run().unwrap() else {
        panic!("the path to error2 is feasible");
    };
    assert_eq!(trace.error_location(), err2);
    assert_eq!(algorithm.statistics().refinements, 2);
}
