//! Region manager: reduced ordered BDDs with complement edges.
//!
//! Abstractions computed by the analysis are stored here. Every region is a
//! canonical [`Ref`] handle, so two abstractions denote the same set of
//! concrete states iff their handles are equal, and entailment reduces to a
//! single `f ∧ ¬g = 0` check.
//!
//! Variables are positive integers; a smaller variable sits closer to the
//! root. The terminal node has index 1, `one` is its positive handle and
//! `zero` its complement.

use std::cell::RefCell;
use std::cmp::min;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::Debug;

use log::debug;

use crate::cache::Cache;
use crate::reference::Ref;
use crate::table::Table;
use crate::utils::{pairing3, MyHash};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Node {
    variable: u32,
    low: Ref,
    high: Ref,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            variable: 0,
            low: Ref::new(0),
            high: Ref::new(0),
        }
    }
}

impl MyHash for Node {
    fn hash(&self) -> u64 {
        pairing3(self.variable as u64, self.low.as_lit(), self.high.as_lit())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct IteKey(Ref, Ref, Ref);

impl MyHash for IteKey {
    fn hash(&self) -> u64 {
        pairing3(self.0.as_lit(), self.1.as_lit(), self.2.as_lit())
    }
}

pub struct Bdd {
    storage: RefCell<Table<Node>>,
    cache: RefCell<Cache<IteKey, Ref>>,
    pub zero: Ref,
    pub one: Ref,
}

impl Bdd {
    pub fn new(bits: usize) -> Self {
        let mut storage = Table::new(bits);

        // Allocate the terminal node:
        let one = storage.add(Node::default());
        assert_eq!(one, 1); // Make sure the terminal node is (1).
        let one = Ref::positive(one as u32);

        Self {
            storage: RefCell::new(storage),
            cache: RefCell::new(Cache::new(min(bits, 16))),
            zero: -one,
            one,
        }
    }
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new(16)
    }
}

impl Debug for Bdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.cache.borrow();
        f.debug_struct("Bdd")
            .field("nodes", &self.storage.borrow().size())
            .field("cache_hits", &cache.hits())
            .field("cache_misses", &cache.misses())
            .finish()
    }
}

impl Bdd {
    /// Number of allocated nodes, the terminal included.
    pub fn num_nodes(&self) -> usize {
        self.storage.borrow().size()
    }

    pub fn variable(&self, index: usize) -> u32 {
        self.storage.borrow().value(index).variable
    }
    pub fn low(&self, index: usize) -> Ref {
        self.storage.borrow().value(index).low
    }
    pub fn high(&self, index: usize) -> Ref {
        self.storage.borrow().value(index).high
    }

    pub fn low_node(&self, node: Ref) -> Ref {
        let low = self.low(node.index());
        if node.is_negated() {
            -low
        } else {
            low
        }
    }
    pub fn high_node(&self, node: Ref) -> Ref {
        let high = self.high(node.index());
        if node.is_negated() {
            -high
        } else {
            high
        }
    }

    pub fn is_zero(&self, node: Ref) -> bool {
        node == self.zero
    }
    pub fn is_one(&self, node: Ref) -> bool {
        node == self.one
    }
    pub fn is_terminal(&self, node: Ref) -> bool {
        self.is_zero(node) || self.is_one(node)
    }

    /// Variable at the root of `node`, or `u32::MAX` for terminals.
    fn level(&self, node: Ref) -> u32 {
        if self.is_terminal(node) {
            u32::MAX
        } else {
            self.variable(node.index())
        }
    }

    pub fn mk_node(&self, v: u32, low: Ref, high: Ref) -> Ref {
        assert_ne!(v, 0, "Variable index should not be zero");

        // Handle canonicity
        if high.is_negated() {
            return -self.mk_node(v, -low, -high);
        }

        // Handle duplicates
        if low == high {
            return low;
        }

        let i = self.storage.borrow_mut().put(Node {
            variable: v,
            low,
            high,
        });
        Ref::positive(i as u32)
    }

    pub fn mk_var(&self, v: u32) -> Ref {
        assert_ne!(v, 0, "Variable index should not be zero");
        self.mk_node(v, self.zero, self.one)
    }

    pub fn top_cofactors(&self, node: Ref, v: u32) -> (Ref, Ref) {
        assert_ne!(v, 0, "Variable index should not be zero");

        if self.is_terminal(node) || v < self.variable(node.index()) {
            return (node, node);
        }
        assert_eq!(v, self.variable(node.index()));
        (self.low_node(node), self.high_node(node))
    }

    /// Apply the ITE operation to the arguments.
    ///
    /// ```text
    /// ITE(x, y, z) = (x ∧ y) ∨ (¬x ∧ z)
    /// ```
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Ref {
        // Base cases:
        //   ite(1,G,H) => G
        //   ite(0,G,H) => H
        if self.is_one(f) {
            return g;
        }
        if self.is_zero(f) {
            return h;
        }

        //   ite(F,G,G) => G
        //   ite(F,1,0) => F
        //   ite(F,0,1) => ~F
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }

        // Standard triples:
        //   ite(F,F,H) => ite(F,1,H)
        //   ite(F,G,F) => ite(F,G,0)
        //   ite(F,~F,H) => ite(F,0,H)
        //   ite(F,G,~F) => ite(F,G,1)
        if g == f {
            return self.apply_ite(f, self.one, h);
        }
        if h == f {
            return self.apply_ite(f, g, self.zero);
        }
        if g == -f {
            return self.apply_ite(f, self.zero, h);
        }
        if h == -f {
            return self.apply_ite(f, g, self.one);
        }

        // ite(~F,G,H) => ite(F,H,G)
        let (mut f, mut g, mut h) = (f, g, h);
        if f.is_negated() {
            f = -f;
            std::mem::swap(&mut g, &mut h);
        }

        // ite(F,~G,H) => ~ite(F,G,~H)
        let mut n = false;
        if g.is_negated() {
            n = true;
            g = -g;
            h = -h;
        }

        let key = IteKey(f, g, h);
        if let Some(&res) = self.cache.borrow().get(&key) {
            return if n { -res } else { res };
        }

        // Determine the top variable:
        let m = self.level(f).min(self.level(g)).min(self.level(h));
        assert_ne!(m, u32::MAX);

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let e = self.apply_ite(f0, g0, h0);
        let t = self.apply_ite(f1, g1, h1);

        let res = self.mk_node(m, e, t);
        self.cache.borrow_mut().insert(key, res);

        if n {
            -res
        } else {
            res
        }
    }

    pub fn apply_not(&self, f: Ref) -> Ref {
        -f
    }

    pub fn apply_and(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, self.zero)
    }

    pub fn apply_or(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, self.one, v)
    }

    pub fn apply_xor(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, -v, v)
    }

    pub fn apply_eq(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, -v)
    }

    pub fn apply_imply(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, self.one)
    }

    pub fn apply_and_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Ref {
        let mut res = self.one;
        for node in nodes {
            res = self.apply_and(res, node);
            if self.is_zero(res) {
                break;
            }
        }
        res
    }

    /// Whether every model of `f` is a model of `g`.
    pub fn is_implies(&self, f: Ref, g: Ref) -> bool {
        self.is_zero(self.apply_and(f, -g))
    }

    // f|v<-b
    pub fn restrict(&self, f: Ref, v: u32, b: bool) -> Ref {
        let mut cache = HashMap::new();
        self.restrict_(f, v, b, &mut cache)
    }

    fn restrict_(&self, f: Ref, v: u32, b: bool, cache: &mut HashMap<Ref, Ref>) -> Ref {
        assert_ne!(v, 0, "Variable index should not be zero");

        if self.is_terminal(f) {
            return f;
        }

        let i = self.variable(f.index());
        if v < i {
            // 'f' does not depend on 'v'
            return f;
        }
        if v == i {
            return if b {
                self.high_node(f)
            } else {
                self.low_node(f)
            };
        }

        if let Some(&res) = cache.get(&f) {
            return res;
        }

        let low = self.restrict_(self.low_node(f), v, b, cache);
        let high = self.restrict_(self.high_node(f), v, b, cache);
        let res = self.mk_node(i, low, high);
        cache.insert(f, res);
        res
    }

    // f|v<-g
    pub fn compose(&self, f: Ref, v: u32, g: Ref) -> Ref {
        let f1 = self.restrict(f, v, true);
        let f0 = self.restrict(f, v, false);
        self.apply_ite(g, f1, f0)
    }

    /// Existential quantification: `∃vars. f`.
    pub fn exists(&self, f: Ref, vars: &BTreeSet<u32>) -> Ref {
        debug!("exists(f = {}, vars = {:?})", f, vars);
        let mut cache = HashMap::new();
        self.exists_(f, vars, &mut cache)
    }

    fn exists_(&self, f: Ref, vars: &BTreeSet<u32>, cache: &mut HashMap<Ref, Ref>) -> Ref {
        if self.is_terminal(f) {
            return f;
        }

        let i = self.variable(f.index());
        if vars.range(i..).next().is_none() {
            // No quantified variable at or below this node
            return f;
        }

        if let Some(&res) = cache.get(&f) {
            return res;
        }

        let low = self.exists_(self.low_node(f), vars, cache);
        let high = self.exists_(self.high_node(f), vars, cache);
        let res = if vars.contains(&i) {
            self.apply_or(low, high)
        } else {
            self.mk_node(i, low, high)
        };
        cache.insert(f, res);
        res
    }

    /// Variables `f` depends on.
    pub fn support(&self, f: Ref) -> BTreeSet<u32> {
        self.descendants([f])
            .into_iter()
            .filter(|&i| i != self.one.index())
            .map(|i| self.variable(i))
            .collect()
    }

    pub fn descendants(&self, nodes: impl IntoIterator<Item = Ref>) -> HashSet<usize> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from_iter(nodes.into_iter().map(|n| n.index()));

        while let Some(i) = queue.pop_front() {
            if visited.insert(i) && i != self.one.index() {
                queue.push_back(self.low(i).index());
                queue.push_back(self.high(i).index());
            }
        }

        visited
    }

    /// Number of nodes reachable from `f`, the terminal included.
    pub fn size(&self, f: Ref) -> usize {
        self.descendants([f]).len()
    }
}
