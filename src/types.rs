//! Type-safe identifiers for abstract states and control-flow elements.
//!
//! These newtypes keep the different index spaces apart: an abstract state id
//! is never confused with the control-flow node it sits at.
use std::fmt;

/// Identifier of an abstract state.
///
/// Ids are handed out by the [`Art`][crate::art::Art] in creation order, so
/// comparing two ids tells which state was created first.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StateId(u32);

impl StateId {
    pub const fn new(id: u32) -> Self {
        StateId(id)
    }

    /// Returns the raw id.
    pub const fn id(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the id that follows this one.
    pub fn next(self) -> Self {
        StateId(self.0 + 1)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Identifier of a control-flow node (a program location).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn new(id: u32) -> Self {
        NodeId(id)
    }

    pub const fn id(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Identifier of a control-flow edge.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EdgeId(u32);

impl EdgeId {
    pub const fn new(id: u32) -> Self {
        EdgeId(id)
    }

    pub const fn id(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}
