use std::fmt::{Display, Formatter};
use std::ops::Neg;

/// Handle to a region node in the [`Bdd`][crate::bdd::Bdd] manager.
///
/// The sign encodes complementation: `-r` is the negation of `r`.
/// Index 0 is never used; index 1 is the terminal node.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Ref(i32);

impl Ref {
    pub const fn new(index: i32) -> Self {
        Self(index)
    }

    pub const fn positive(index: u32) -> Self {
        Self(index as i32)
    }

    pub const fn is_negated(&self) -> bool {
        self.0 < 0
    }

    pub const fn negate(self) -> Self {
        Self(-self.0)
    }

    /// Return the internal representation of the reference.
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Return the index of the referenced node.
    pub const fn index(self) -> usize {
        self.0.unsigned_abs() as usize
    }

    pub(crate) fn as_lit(self) -> u64 {
        ((self.0.unsigned_abs() as u64) << 1) + (self.0 < 0) as u64
    }
}

impl Neg for Ref {
    type Output = Self;

    fn neg(self) -> Self::Output {
        self.negate()
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}",
            if self.is_negated() { "~" } else { "" },
            self.index()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negation() {
        let r = Ref::positive(5);
        assert!(!r.is_negated());
        assert!((-r).is_negated());
        assert_eq!(-(-r), r);
        assert_eq!((-r).index(), 5);
    }

    #[test]
    fn test_as_lit() {
        assert_eq!(Ref::positive(3).as_lit(), 6);
        assert_eq!(Ref::new(-3).as_lit(), 7);
    }

    #[test]
    fn test_display() {
        assert_eq!(Ref::positive(2).to_string(), "@2");
        assert_eq!(Ref::new(-2).to_string(), "~@2");
    }
}
