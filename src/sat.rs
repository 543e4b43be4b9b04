use std::collections::HashMap;

use num_bigint::BigUint;

use crate::bdd::Bdd;
use crate::reference::Ref;

impl Bdd {
    /// Returns one satisfying assignment for the BDD, if any exists.
    ///
    /// The assignment is a list of signed variables (positive means true).
    /// Variables the path does not mention are unconstrained.
    ///
    /// Returns `None` if the BDD represents the constant false function.
    pub fn one_sat(&self, node: Ref) -> Option<Vec<i64>> {
        if self.is_zero(node) {
            return None;
        }

        let mut path = Vec::new();
        let mut current = node;

        // Walk down the BDD, always picking a satisfying branch
        while !self.is_one(current) {
            let var = self.variable(current.index()) as i64;
            let high = self.high_node(current);
            if !self.is_zero(high) {
                path.push(var);
                current = high;
            } else {
                path.push(-var);
                current = self.low_node(current);
            }
        }

        Some(path)
    }

    /// Number of models of `node` over the variables `1..=num_vars`.
    ///
    /// `node` must not depend on variables above `num_vars`.
    pub fn sat_count(&self, node: Ref, num_vars: usize) -> BigUint {
        let mut cache = HashMap::new();
        let max = BigUint::from(2u32).pow(num_vars as u32);
        self.sat_count_(node, &max, &mut cache)
    }

    fn sat_count_(&self, node: Ref, max: &BigUint, cache: &mut HashMap<Ref, BigUint>) -> BigUint {
        if self.is_zero(node) {
            return BigUint::ZERO;
        } else if self.is_one(node) {
            return max.clone();
        }

        if let Some(count) = cache.get(&node) {
            return count.clone();
        }

        let count_low = self.sat_count_(self.low(node.index()), max, cache);
        let count_high = self.sat_count_(self.high(node.index()), max, cache);

        let count: BigUint = (count_low + count_high) >> 1;
        let count = if node.is_negated() { max - count } else { count };

        cache.insert(node, count.clone());
        count
    }
}
