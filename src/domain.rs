//! The explicit abstract domain of lazy abstraction.

use std::fmt;

use crate::error::CpaError;
use crate::manager::FormulaManager;
use crate::state::AbstractState;
use crate::types::StateId;

/// A domain element: one of the two sentinels, or a state of the ART.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Element {
    Bottom,
    Top,
    State(StateId),
}

impl Element {
    pub fn is_bottom(&self) -> bool {
        matches!(self, Element::Bottom)
    }

    pub fn state(&self) -> Option<StateId> {
        match self {
            Element::State(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Bottom => write!(f, "⊥"),
            Element::Top => write!(f, "⊤"),
            Element::State(id) => write!(f, "{}", id),
        }
    }
}

pub struct ExplicitDomain<'a, M: FormulaManager + ?Sized> {
    manager: &'a M,
}

impl<'a, M: FormulaManager + ?Sized> ExplicitDomain<'a, M> {
    pub fn new(manager: &'a M) -> Self {
        Self { manager }
    }

    pub fn bottom(&self) -> Element {
        Element::Bottom
    }

    pub fn top(&self) -> Element {
        Element::Top
    }

    /// Branches of the ART are never merged, so this always fails.
    pub fn join(&self, _a: &Element, _b: &Element) -> Result<Element, CpaError> {
        Err(CpaError::JoinUnsupported)
    }

    /// `a ⊑ b`: same location, and `a`'s abstraction entails `b`'s.
    pub fn is_less_or_equal(&self, a: &AbstractState, b: &AbstractState) -> bool {
        a.location() == b.location() && self.manager.entails(a.abstraction(), b.abstraction())
    }
}
