//! Merge operators.
//!
//! Lazy abstraction keeps every branch of the ART separate, so the only
//! operator here is the one that never merges.

use crate::domain::Element;

pub trait MergeOperator {
    /// Combine `a` into `b`, returning the element that replaces `b`.
    fn merge(&self, a: &Element, b: &Element) -> Element;
}

/// Merge-sep: `b` is always kept unchanged.
#[derive(Debug, Copy, Clone, Default)]
pub struct MergeSep;

impl MergeOperator for MergeSep {
    fn merge(&self, _a: &Element, b: &Element) -> Element {
        *b
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::types::StateId;

    #[test]
    fn test_merge_sep_returns_second() {
        let a = Element::State(StateId::new(1));
        let b = Element::State(StateId::new(2));
        assert_eq!(MergeSep.merge(&a, &b), b);
        assert_eq!(MergeSep.merge(&b, &Element::Bottom), Element::Bottom);
        assert_eq!(MergeSep.merge(&Element::Top, &a), a);
    }
}
