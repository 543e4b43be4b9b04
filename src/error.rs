//! Error types.
//!
//! [`CpaError`] is what the analysis hands back to its driver. Expected
//! outcomes such as an infeasible transition or a spurious counterexample are
//! not errors; they are [`Successor`][crate::transfer::Successor] variants.

use thiserror::Error;

use crate::manager::ConcreteTrace;
use crate::refine::PathFingerprint;
use crate::types::NodeId;

#[derive(Debug, Error)]
pub enum CpaError {
    /// A feasible path to an error location: the program is unsafe.
    #[error("error location {} is reachable by a feasible path of {} steps", .trace.error_location(), .trace.len())]
    ErrorReached { trace: ConcreteTrace },

    /// An error location was reached but the path could not be checked,
    /// because refinement is disabled or the precision is fixed.
    #[error("error location {location} reached with refinement disabled")]
    ErrorWithoutRefinement { location: NodeId },

    /// The same abstract path keeps coming back without new predicates.
    #[error("not enough predicates to rule out abstract path {path}")]
    NotEnoughPredicates { path: PathFingerprint },

    #[error("refinement limit of {limit} reached")]
    RefinementLimit { limit: usize },

    #[error("abstract states are never joined in lazy abstraction")]
    JoinUnsupported,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Cfa(#[from] CfaError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown configuration key `{0}`")]
    UnknownKey(String),
    #[error("invalid value `{value}` for `{key}`")]
    InvalidValue { key: String, value: String },
    #[error("line {line}: expected `key = value`")]
    MalformedLine { line: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected character `{ch}` at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("unexpected token `{token}` at offset {offset}")]
    UnexpectedToken { token: String, offset: usize },
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),
    #[error("line {line}: expected `scope: predicate, ...`")]
    MalformedLine { line: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CfaError {
    #[error("function `{0}` is defined twice")]
    DuplicateFunction(String),
    #[error("call to undefined function `{0}`")]
    UnknownFunction(String),
    #[error("program has no `main` function")]
    MissingMain,
}
