//! Predicates and the precision (predicate map).
//!
//! The precision decides which predicates the abstraction at a location keeps
//! track of. An [`UpdateablePredicateMap`] grows during refinement; a
//! [`FixedPredicateMap`] is loaded once and never changes, which makes
//! refinement impossible.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use log::debug;

use crate::cfa::CfaNode;
use crate::error::{CpaError, ParseError};
use crate::manager::Formula;
use crate::types::NodeId;

/// A named formula the abstraction may track.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Predicate {
    name: Rc<str>,
    formula: Formula,
}

impl Predicate {
    pub fn new(name: &str, formula: Formula) -> Self {
        Self {
            name: Rc::from(name),
            formula,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn formula(&self) -> Formula {
        self.formula
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Granularity at which refined predicates are attached.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum PredicateScope {
    /// Predicates hold only at the location they were found for.
    #[default]
    Location,
    /// Predicates hold at every location of the same function.
    Function,
    /// Predicates hold everywhere.
    Global,
}

impl PredicateScope {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "location" => Some(PredicateScope::Location),
            "function" => Some(PredicateScope::Function),
            "global" => Some(PredicateScope::Global),
            _ => None,
        }
    }
}

pub trait PredicateMap: fmt::Debug {
    /// Predicates to use when computing successors of states at `node`.
    fn relevant_predicates(&self, node: &CfaNode) -> BTreeSet<Predicate>;

    /// Add `predicates` at `node`. Returns whether the predicate set grew.
    fn update(&mut self, node: &CfaNode, predicates: &BTreeSet<Predicate>) -> bool;

    /// Whether [`update`][Self::update] can ever grow the map.
    fn is_refinable(&self) -> bool;

    /// Number of distinct predicates across all scopes.
    fn num_predicates(&self) -> usize;
}

#[derive(Debug, Clone, Default)]
pub struct UpdateablePredicateMap {
    scope: PredicateScope,
    by_location: HashMap<NodeId, BTreeSet<Predicate>>,
    by_function: HashMap<String, BTreeSet<Predicate>>,
    global: BTreeSet<Predicate>,
}

impl UpdateablePredicateMap {
    pub fn new(scope: PredicateScope) -> Self {
        Self {
            scope,
            ..Default::default()
        }
    }

    pub fn scope(&self) -> PredicateScope {
        self.scope
    }
}

impl PredicateMap for UpdateablePredicateMap {
    fn relevant_predicates(&self, node: &CfaNode) -> BTreeSet<Predicate> {
        let set = match self.scope {
            PredicateScope::Location => self.by_location.get(&node.id),
            PredicateScope::Function => self.by_function.get(&node.function),
            PredicateScope::Global => Some(&self.global),
        };
        set.cloned().unwrap_or_default()
    }

    fn update(&mut self, node: &CfaNode, predicates: &BTreeSet<Predicate>) -> bool {
        let set = match self.scope {
            PredicateScope::Location => self.by_location.entry(node.id).or_default(),
            PredicateScope::Function => self.by_function.entry(node.function.clone()).or_default(),
            PredicateScope::Global => &mut self.global,
        };
        let before = set.len();
        set.extend(predicates.iter().cloned());
        let grew = set.len() > before;
        if grew {
            debug!(
                "precision at {} grew from {} to {} predicates",
                node.id,
                before,
                set.len()
            );
        }
        grew
    }

    fn is_refinable(&self) -> bool {
        true
    }

    fn num_predicates(&self) -> usize {
        let mut all: BTreeSet<&Predicate> = self.global.iter().collect();
        all.extend(self.by_function.values().flatten());
        all.extend(self.by_location.values().flatten());
        all.len()
    }
}

/// Predicates given up front, globally or per function.
///
/// The text format has one scope per line:
///
/// ```text
/// # comment
/// *: lock, !done          # everywhere
/// worker: lock -> busy    # in function `worker`
/// ```
#[derive(Debug, Clone, Default)]
pub struct FixedPredicateMap {
    global: BTreeSet<Predicate>,
    by_function: HashMap<String, BTreeSet<Predicate>>,
}

impl FixedPredicateMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_global(&mut self, predicate: Predicate) {
        self.global.insert(predicate);
    }

    pub fn add_for_function(&mut self, function: &str, predicate: Predicate) {
        self.by_function
            .entry(function.to_string())
            .or_default()
            .insert(predicate);
    }

    /// Parse the text format, turning each predicate source into a
    /// [`Predicate`] with `resolve`.
    pub fn parse<F>(text: &str, mut resolve: F) -> Result<Self, ParseError>
    where
        F: FnMut(&str) -> Result<Predicate, ParseError>,
    {
        let mut map = Self::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let (scope, predicates) = line
                .split_once(':')
                .ok_or(ParseError::MalformedLine { line: i + 1 })?;
            let scope = scope.trim();
            if scope.is_empty() {
                return Err(ParseError::MalformedLine { line: i + 1 });
            }
            for source in predicates.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let predicate = resolve(source)?;
                if scope == "*" {
                    map.add_global(predicate);
                } else {
                    map.add_for_function(scope, predicate);
                }
            }
        }
        Ok(map)
    }

    pub fn from_file<F>(path: &Path, resolve: F) -> Result<Self, CpaError>
    where
        F: FnMut(&str) -> Result<Predicate, ParseError>,
    {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text, resolve)?)
    }
}

impl PredicateMap for FixedPredicateMap {
    fn relevant_predicates(&self, node: &CfaNode) -> BTreeSet<Predicate> {
        let mut set = self.global.clone();
        if let Some(local) = self.by_function.get(&node.function) {
            set.extend(local.iter().cloned());
        }
        set
    }

    fn update(&mut self, _node: &CfaNode, _predicates: &BTreeSet<Predicate>) -> bool {
        false
    }

    fn is_refinable(&self) -> bool {
        false
    }

    fn num_predicates(&self) -> usize {
        let mut all: BTreeSet<&Predicate> = self.global.iter().collect();
        all.extend(self.by_function.values().flatten());
        all.len()
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::cfa::{Cfa, CfaBuilder};
    use crate::reference::Ref;

    fn pred(name: &str, index: u32) -> Predicate {
        Predicate::new(name, Ref::positive(index))
    }

    fn two_function_cfa() -> Cfa {
        let mut builder = CfaBuilder::new();
        let main = builder.function("main").unwrap();
        let f = builder.function("f").unwrap();
        builder.blank(main.entry, main.exit);
        builder.blank(f.entry, f.exit);
        builder.build().unwrap()
    }

    #[test]
    fn test_location_scope() {
        let cfa = two_function_cfa();
        let main = cfa.main().clone();
        let mut map = UpdateablePredicateMap::new(PredicateScope::Location);

        let preds = BTreeSet::from([pred("x", 2)]);
        assert!(map.update(cfa.node(main.entry), &preds));
        assert!(!map.update(cfa.node(main.entry), &preds));

        assert_eq!(map.relevant_predicates(cfa.node(main.entry)), preds);
        assert!(map.relevant_predicates(cfa.node(main.exit)).is_empty());
    }

    #[test]
    fn test_function_scope() {
        let cfa = two_function_cfa();
        let main = cfa.main().clone();
        let f = cfa.function("f").unwrap().clone();
        let mut map = UpdateablePredicateMap::new(PredicateScope::Function);

        assert!(map.update(cfa.node(main.entry), &BTreeSet::from([pred("x", 2)])));
        assert_eq!(map.relevant_predicates(cfa.node(main.exit)).len(), 1);
        assert!(map.relevant_predicates(cfa.node(f.entry)).is_empty());
    }

    #[test]
    fn test_global_scope() {
        let cfa = two_function_cfa();
        let main = cfa.main().clone();
        let f = cfa.function("f").unwrap().clone();
        let mut map = UpdateablePredicateMap::new(PredicateScope::Global);

        assert!(map.update(cfa.node(main.entry), &BTreeSet::from([pred("x", 2)])));
        assert!(map.update(cfa.node(f.exit), &BTreeSet::from([pred("y", 3)])));
        assert_eq!(map.relevant_predicates(cfa.node(f.entry)).len(), 2);
        assert_eq!(map.num_predicates(), 2);
    }

    #[test]
    fn test_partial_growth_counts() {
        let cfa = two_function_cfa();
        let node = cfa.node(cfa.main().entry);
        let mut map = UpdateablePredicateMap::default();

        map.update(node, &BTreeSet::from([pred("x", 2)]));
        assert!(map.update(node, &BTreeSet::from([pred("x", 2), pred("y", 3)])));
        assert_eq!(map.num_predicates(), 2);
    }

    #[test]
    fn test_fixed_map_parse() {
        let cfa = two_function_cfa();
        let text = "\
            # predicates\n\
            *: a, b   # everywhere\n\
            \n\
            f: c\n";
        let mut next = 1;
        let map = FixedPredicateMap::parse(text, |src| {
            next += 1;
            Ok(pred(src, next))
        })
        .unwrap();

        let in_main = map.relevant_predicates(cfa.node(cfa.main().entry));
        let names: Vec<_> = in_main.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let in_f = map.relevant_predicates(cfa.node(cfa.function("f").unwrap().exit));
        assert_eq!(in_f.len(), 3);
        assert!(!map.is_refinable());
        assert_eq!(map.num_predicates(), 3);
    }

    #[test]
    fn test_fixed_map_never_grows() {
        let cfa = two_function_cfa();
        let mut map = FixedPredicateMap::new();
        map.add_global(pred("a", 2));
        assert!(!map.update(cfa.node(cfa.main().entry), &BTreeSet::from([pred("b", 3)])));
        assert_eq!(map.relevant_predicates(cfa.node(cfa.main().entry)).len(), 1);
    }

    #[test]
    fn test_fixed_map_parse_errors() {
        let resolve = |src: &str| -> Result<Predicate, ParseError> { Ok(pred(src, 2)) };
        assert_eq!(
            FixedPredicateMap::parse("a, b", resolve).unwrap_err(),
            ParseError::MalformedLine { line: 1 }
        );
        assert_eq!(
            FixedPredicateMap::parse("\n: a", resolve).unwrap_err(),
            ParseError::MalformedLine { line: 2 }
        );
        let failing =
            |src: &str| -> Result<Predicate, ParseError> { Err(ParseError::UnknownVariable(src.to_string())) };
        assert_eq!(
            FixedPredicateMap::parse("*: q", failing).unwrap_err(),
            ParseError::UnknownVariable("q".to_string())
        );
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!(PredicateScope::parse("function"), Some(PredicateScope::Function));
        assert_eq!(PredicateScope::parse("nope"), None);
    }
}
