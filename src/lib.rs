//! # lazy-cpa: Lazy Predicate Abstraction in Rust
//!
//! **`lazy-cpa`** is a software model checker core based on *lazy abstraction*:
//! the program is explored as an **Abstract Reachability Tree (ART)** whose
//! states over-approximate the concrete program states with predicates, and the
//! set of predicates is refined on demand whenever a spurious error path shows
//! up (**CEGAR**, counterexample-guided abstraction refinement).
//!
//! ## How it works
//!
//! 1. Exploration starts at the entry of `main` with the abstraction `true`.
//! 2. Successors are computed per CFA edge, keeping only the predicates the
//!    *precision* tracks at the current location. Infeasible successors are pruned.
//! 3. A successor that is entailed by an existing state at the same location
//!    (with the same call context) is *covered* and not explored further.
//! 4. When an error location is reached, the abstract path is checked. If it is
//!    feasible, the program is unsafe. Otherwise new predicates are learned, the
//!    precision grows, and the part of the ART below the refinement root is
//!    discarded and explored again.
//!
//! Interprocedural paths are handled with a per-state call context, a
//! persistent stack that makes calls and returns match precisely.
//!
//! ## Key Features
//!
//! - **Arena ART**: States live in an arena indexed by [`StateId`][crate::types::StateId]; subtree and ancestor queries never chase pointers.
//! - **Pluggable formulas**: The engine only talks to a [`FormulaManager`][crate::manager::FormulaManager]. [`BooleanProgramManager`][crate::boolprog::BooleanProgramManager] implements it for boolean programs on top of the built-in [`Bdd`][crate::bdd::Bdd].
//! - **Progress guard**: Refinement that keeps seeing the same path without learning anything stops with an error instead of looping forever.
//!
//! ## Basic Usage
//!
//! ```rust
//! use lazy_cpa::algorithm::{CpaAlgorithm, Verdict};
//! use lazy_cpa::cfa::CfaBuilder;
//! use lazy_cpa::config::Config;
//! use lazy_cpa::expr::Expr;
//!
//! // main: x := true; if (!x) error;
//! let mut builder = CfaBuilder::new();
//! let main = builder.function("main").unwrap();
//! let l1 = builder.node("main");
//! let err = builder.error_node("main");
//! builder.assign(main.entry, l1, "x", Expr::Lit(true));
//! builder.branch(l1, Expr::var("x").not(), err, main.exit);
//! let cfa = builder.build().unwrap();
//!
//! let mut algorithm = CpaAlgorithm::for_boolean_program(&cfa, &Config::default()).unwrap();
//! assert_eq!(algorithm.run().unwrap(), Verdict::Safe);
//! assert_eq!(algorithm.statistics().refinements, 1);
//! ```
//!
//! ## Core Components
//!
//! - **[`algorithm`]**: The waitlist-driven exploration loop.
//! - **[`transfer`]**: Successor computation, coverage bookkeeping and, in [`refine`], refinement.
//! - **[`art`]**, **[`state`]**: The tree and its states.
//! - **[`boolprog`]**, **[`bdd`]**: The formula manager for boolean programs and its region backend.

pub mod algorithm;
pub mod art;
pub mod bdd;
pub mod boolprog;
pub mod cache;
pub mod cfa;
pub mod config;
pub mod coverage;
pub mod domain;
pub mod dot;
pub mod error;
pub mod expr;
pub mod manager;
pub mod merge;
pub mod predicate;
pub mod reference;
pub mod refine;
pub mod sat;
pub mod state;
pub mod stop;
pub mod table;
pub mod transfer;
pub mod types;
pub mod utils;
