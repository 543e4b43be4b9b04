//! Abstract states and their call contexts.
//!
//! The call context is a persistent stack: pushing or popping returns a new
//! stack and never touches the old one, so any number of states can share a
//! context and a state that changes call depth can never disturb the others.
//! Sharing is `O(1)` (a reference-count bump).

use std::fmt;
use std::rc::Rc;

use crate::manager::Formula;
use crate::types::{EdgeId, NodeId, StateId};

/// One pending call: where to return to, and the abstraction at the call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ContextFrame {
    pub return_abstraction: Formula,
    pub return_location: NodeId,
}

#[derive(Debug)]
struct ContextNode {
    frame: ContextFrame,
    rest: CallContext,
    depth: usize,
}

/// Shadow call stack of an abstract state.
#[derive(Debug, Clone, Default)]
pub struct CallContext(Option<Rc<ContextNode>>);

impl CallContext {
    pub fn empty() -> Self {
        CallContext(None)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn depth(&self) -> usize {
        self.0.as_ref().map_or(0, |node| node.depth)
    }

    pub fn top(&self) -> Option<&ContextFrame> {
        self.0.as_ref().map(|node| &node.frame)
    }

    /// A new context with `frame` on top of this one.
    pub fn push(&self, frame: ContextFrame) -> CallContext {
        CallContext(Some(Rc::new(ContextNode {
            frame,
            rest: self.clone(),
            depth: self.depth() + 1,
        })))
    }

    /// The top frame and the context below it, or `None` if empty.
    pub fn pop(&self) -> Option<(ContextFrame, CallContext)> {
        self.0
            .as_ref()
            .map(|node| (node.frame, node.rest.clone()))
    }

    /// Whether both contexts are the very same stack instance.
    pub fn ptr_eq(&self, other: &CallContext) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Frames from the top of the stack down.
    pub fn frames(&self) -> impl Iterator<Item = &ContextFrame> {
        let mut current = self.0.as_deref();
        std::iter::from_fn(move || {
            let node = current?;
            current = node.rest.0.as_deref();
            Some(&node.frame)
        })
    }
}

/// Structural equality: same depth and pairwise equal frames.
impl PartialEq for CallContext {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.depth() == other.depth() && self.frames().eq(other.frames())
    }
}

impl Eq for CallContext {}

impl fmt::Display for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, frame) in self.frames().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", frame.return_location)?;
        }
        write!(f, "]")
    }
}

/// A node of the abstract reachability tree.
#[derive(Debug, Clone)]
pub struct AbstractState {
    id: StateId,
    location: NodeId,
    abstraction: Formula,
    parent: Option<StateId>,
    incoming: Option<EdgeId>,
    context: CallContext,
    covered: bool,
}

impl AbstractState {
    /// A root state: no parent, empty context.
    pub fn initial(id: StateId, location: NodeId, abstraction: Formula) -> Self {
        Self {
            id,
            location,
            abstraction,
            parent: None,
            incoming: None,
            context: CallContext::empty(),
            covered: false,
        }
    }

    /// A state reached from `parent` along `edge`.
    pub fn successor(
        id: StateId,
        location: NodeId,
        abstraction: Formula,
        parent: StateId,
        edge: EdgeId,
        context: CallContext,
    ) -> Self {
        Self {
            id,
            location,
            abstraction,
            parent: Some(parent),
            incoming: Some(edge),
            context,
            covered: false,
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn location(&self) -> NodeId {
        self.location
    }

    pub fn abstraction(&self) -> Formula {
        self.abstraction
    }

    pub fn parent(&self) -> Option<StateId> {
        self.parent
    }

    /// The edge this state was computed along, `None` for the root.
    pub fn incoming(&self) -> Option<EdgeId> {
        self.incoming
    }

    pub fn context(&self) -> &CallContext {
        &self.context
    }

    pub fn is_covered(&self) -> bool {
        self.covered
    }

    pub fn set_covered(&mut self, covered: bool) {
        self.covered = covered;
    }

    /// Whether both states have structurally equal call contexts.
    pub fn same_context(&self, other: &AbstractState) -> bool {
        self.context == other.context
    }
}

/// Identity is the id alone.
impl PartialEq for AbstractState {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AbstractState {}

impl std::hash::Hash for AbstractState {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for AbstractState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} {} abs={}{}",
            self.id,
            self.location,
            self.context,
            self.abstraction,
            if self.covered { " (covered)" } else { "" }
        )
    }
}
