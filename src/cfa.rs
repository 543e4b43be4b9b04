//! Control-flow automaton (CFA) of a boolean program.
//!
//! A CFA is a graph of program locations connected by edges that carry one
//! operation each. Every location belongs to a function; each function has a
//! unique entry and exit location. A call site `c` that calls `f` and returns
//! to `r` is represented by
//!
//! - a call edge `c → entry(f)`,
//! - a return edge `exit(f) → r`,
//! - a *summary* entry `c ↦ r`, which is not an outgoing edge of `c` and is
//!   looked up with [`Cfa::summary_successor`].
//!
//! All program variables are global.
//!
//! ## Example
//!
//! ```rust
//! use lazy_cpa::cfa::CfaBuilder;
//! use lazy_cpa::expr::Expr;
//!
//! let mut builder = CfaBuilder::new();
//! let main = builder.function("main").unwrap();
//! let l1 = builder.node("main");
//! let err = builder.error_node("main");
//! builder.assign(main.entry, l1, "x", Expr::Lit(true));
//! builder.assume(l1, err, Expr::var("x").not());
//! builder.assume(l1, main.exit, Expr::var("x"));
//! let cfa = builder.build().unwrap();
//!
//! assert_eq!(cfa.leaving(l1).len(), 2);
//! assert!(cfa.is_error_location(err));
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::CfaError;
use crate::expr::Expr;
use crate::types::{EdgeId, NodeId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Normal,
    FunctionEntry,
    FunctionExit,
    Error,
}

#[derive(Debug, Clone)]
pub struct CfaNode {
    pub id: NodeId,
    pub function: String,
    pub kind: NodeKind,
    leaving: Vec<EdgeId>,
    entering: Vec<EdgeId>,
    summary: Option<NodeId>,
}

impl CfaNode {
    pub fn leaving(&self) -> &[EdgeId] {
        &self.leaving
    }

    pub fn entering(&self) -> &[EdgeId] {
        &self.entering
    }
}

/// Operation carried by an edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeKind {
    Blank,
    Assign { var: String, expr: Expr },
    /// Nondeterministic assignment.
    Havoc { var: String },
    Assume(Expr),
    Call { callee: String },
    Return,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Blank => write!(f, "skip"),
            EdgeKind::Assign { var, expr } => write!(f, "{} := {}", var, expr),
            EdgeKind::Havoc { var } => write!(f, "{} := *", var),
            EdgeKind::Assume(cond) => write!(f, "[{}]", cond),
            EdgeKind::Call { callee } => write!(f, "call {}", callee),
            EdgeKind::Return => write!(f, "return"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CfaEdge {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
}

impl fmt::Display for CfaEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -{{{}}}-> {}", self.from, self.kind, self.to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: String,
    pub entry: NodeId,
    pub exit: NodeId,
}

#[derive(Debug, Clone)]
pub struct Cfa {
    nodes: Vec<CfaNode>,
    edges: Vec<CfaEdge>,
    functions: BTreeMap<String, FunctionInfo>,
}

impl Cfa {
    pub fn node(&self, id: NodeId) -> &CfaNode {
        &self.nodes[id.index()]
    }

    pub fn edge(&self, id: EdgeId) -> &CfaEdge {
        &self.edges[id.index()]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CfaNode> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &CfaEdge> {
        self.edges.iter()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Outgoing edges of a location.
    pub fn leaving(&self, node: NodeId) -> &[EdgeId] {
        self.node(node).leaving()
    }

    /// Location following the call made at `call_site`, if it is one.
    pub fn summary_successor(&self, call_site: NodeId) -> Option<NodeId> {
        self.node(call_site).summary
    }

    pub fn is_function_entry(&self, node: NodeId) -> bool {
        self.node(node).kind == NodeKind::FunctionEntry
    }

    pub fn is_function_exit(&self, node: NodeId) -> bool {
        self.node(node).kind == NodeKind::FunctionExit
    }

    pub fn is_error_location(&self, node: NodeId) -> bool {
        self.node(node).kind == NodeKind::Error
    }

    pub fn function(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.get(name)
    }

    pub fn main(&self) -> &FunctionInfo {
        // Checked by the builder
        &self.functions["main"]
    }

    /// All program variables mentioned on any edge.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        for edge in &self.edges {
            match &edge.kind {
                EdgeKind::Assign { var, expr } => {
                    vars.insert(var.clone());
                    vars.extend(expr.variables());
                }
                EdgeKind::Havoc { var } => {
                    vars.insert(var.clone());
                }
                EdgeKind::Assume(cond) => vars.extend(cond.variables()),
                EdgeKind::Blank | EdgeKind::Call { .. } | EdgeKind::Return => {}
            }
        }
        vars
    }
}

impl fmt::Display for Cfa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for info in self.functions.values() {
            writeln!(f, "function {} (entry {}, exit {}):", info.name, info.entry, info.exit)?;
            for edge in self.edges.iter().filter(|e| self.node(e.from).function == info.name) {
                writeln!(f, "  {}", edge)?;
            }
        }
        Ok(())
    }
}

/// Builder for a [`Cfa`].
///
/// Calls are resolved in [`build`][CfaBuilder::build], so a function may be
/// called before it is declared.
#[derive(Debug, Default)]
pub struct CfaBuilder {
    nodes: Vec<CfaNode>,
    edges: Vec<CfaEdge>,
    functions: BTreeMap<String, FunctionInfo>,
    calls: Vec<(NodeId, String, NodeId)>,
    duplicate: Option<String>,
}

impl CfaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_node(&mut self, function: &str, kind: NodeKind) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(CfaNode {
            id,
            function: function.to_string(),
            kind,
            leaving: Vec::new(),
            entering: Vec::new(),
            summary: None,
        });
        id
    }

    fn add_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) -> EdgeId {
        let id = EdgeId::new(self.edges.len() as u32);
        self.edges.push(CfaEdge { id, from, to, kind });
        self.nodes[from.index()].leaving.push(id);
        self.nodes[to.index()].entering.push(id);
        id
    }

    /// Declare a function and create its entry and exit locations.
    ///
    /// Declaring the same name twice is reported by [`build`][Self::build].
    pub fn function(&mut self, name: &str) -> Result<FunctionInfo, CfaError> {
        if self.functions.contains_key(name) {
            self.duplicate.get_or_insert_with(|| name.to_string());
            return Err(CfaError::DuplicateFunction(name.to_string()));
        }
        let entry = self.add_node(name, NodeKind::FunctionEntry);
        let exit = self.add_node(name, NodeKind::FunctionExit);
        let info = FunctionInfo {
            name: name.to_string(),
            entry,
            exit,
        };
        self.functions.insert(name.to_string(), info.clone());
        Ok(info)
    }

    pub fn node(&mut self, function: &str) -> NodeId {
        self.add_node(function, NodeKind::Normal)
    }

    pub fn error_node(&mut self, function: &str) -> NodeId {
        self.add_node(function, NodeKind::Error)
    }

    pub fn blank(&mut self, from: NodeId, to: NodeId) -> EdgeId {
        self.add_edge(from, to, EdgeKind::Blank)
    }

    pub fn assign(&mut self, from: NodeId, to: NodeId, var: &str, expr: Expr) -> EdgeId {
        let var = var.to_string();
        self.add_edge(from, to, EdgeKind::Assign { var, expr })
    }

    pub fn havoc(&mut self, from: NodeId, to: NodeId, var: &str) -> EdgeId {
        let var = var.to_string();
        self.add_edge(from, to, EdgeKind::Havoc { var })
    }

    pub fn assume(&mut self, from: NodeId, to: NodeId, cond: Expr) -> EdgeId {
        self.add_edge(from, to, EdgeKind::Assume(cond))
    }

    /// Two-way branch: `[cond]` to `then_to`, `[!cond]` to `else_to`.
    pub fn branch(&mut self, from: NodeId, cond: Expr, then_to: NodeId, else_to: NodeId) {
        self.assume(from, then_to, cond.clone());
        self.assume(from, else_to, cond.not());
    }

    /// Call `callee` at `call_site`, continuing at `return_site`.
    pub fn call(&mut self, call_site: NodeId, callee: &str, return_site: NodeId) {
        self.calls
            .push((call_site, callee.to_string(), return_site));
    }

    pub fn build(mut self) -> Result<Cfa, CfaError> {
        if let Some(name) = self.duplicate {
            return Err(CfaError::DuplicateFunction(name));
        }
        if !self.functions.contains_key("main") {
            return Err(CfaError::MissingMain);
        }

        let calls = std::mem::take(&mut self.calls);
        for (call_site, callee, return_site) in calls {
            let info = self
                .functions
                .get(&callee)
                .cloned()
                .ok_or(CfaError::UnknownFunction(callee.clone()))?;
            self.add_edge(call_site, info.entry, EdgeKind::Call { callee });
            self.add_edge(info.exit, return_site, EdgeKind::Return);
            self.nodes[call_site.index()].summary = Some(return_site);
        }

        Ok(Cfa {
            nodes: self.nodes,
            edges: self.edges,
            functions: self.functions,
        })
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_function_nodes() {
        let mut builder = CfaBuilder::new();
        let main = builder.function("main").unwrap();
        let cfa = builder.build().unwrap();

        assert!(cfa.is_function_entry(main.entry));
        assert!(cfa.is_function_exit(main.exit));
        assert_eq!(cfa.main(), &main);
        assert_eq!(cfa.node(main.entry).function, "main");
    }

    #[test]
    fn test_call_wiring() {
        let mut builder = CfaBuilder::new();
        let main = builder.function("main").unwrap();
        let call_site = builder.node("main");
        let return_site = builder.node("main");
        builder.blank(main.entry, call_site);
        builder.call(call_site, "f", return_site);
        builder.blank(return_site, main.exit);
        let f = builder.function("f").unwrap();
        builder.blank(f.entry, f.exit);
        let cfa = builder.build().unwrap();

        assert_eq!(cfa.summary_successor(call_site), Some(return_site));
        assert_eq!(cfa.summary_successor(return_site), None);

        let call = cfa.edge(cfa.leaving(call_site)[0]);
        assert_eq!(call.to, f.entry);
        assert_eq!(call.kind, EdgeKind::Call { callee: "f".to_string() });

        let ret = cfa.edge(cfa.leaving(f.exit)[0]);
        assert_eq!(ret.to, return_site);
        assert_eq!(ret.kind, EdgeKind::Return);
        assert_eq!(cfa.node(return_site).entering(), &[ret.id]);
    }

    #[test]
    fn test_build_errors() {
        let builder = CfaBuilder::new();
        assert_eq!(builder.build().unwrap_err(), CfaError::MissingMain);

        let mut builder = CfaBuilder::new();
        let main = builder.function("main").unwrap();
        builder.call(main.entry, "g", main.exit);
        assert_eq!(
            builder.build().unwrap_err(),
            CfaError::UnknownFunction("g".to_string())
        );

        let mut builder = CfaBuilder::new();
        builder.function("main").unwrap();
        assert!(builder.function("main").is_err());
        assert_eq!(
            builder.build().unwrap_err(),
            CfaError::DuplicateFunction("main".to_string())
        );
    }

    #[test]
    fn test_variables() {
        let mut builder = CfaBuilder::new();
        let main = builder.function("main").unwrap();
        let l1 = builder.node("main");
        builder.assign(main.entry, l1, "x", Expr::var("y"));
        builder.havoc(l1, main.exit, "z");
        let cfa = builder.build().unwrap();

        let vars: Vec<_> = cfa.variables().into_iter().collect();
        assert_eq!(vars, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_branch() {
        let mut builder = CfaBuilder::new();
        let main = builder.function("main").unwrap();
        let err = builder.error_node("main");
        builder.branch(main.entry, Expr::var("x"), err, main.exit);
        let cfa = builder.build().unwrap();

        let leaving = cfa.leaving(main.entry);
        assert_eq!(leaving.len(), 2);
        assert_eq!(cfa.edge(leaving[1]).kind, EdgeKind::Assume(Expr::var("x").not()));
    }
}
