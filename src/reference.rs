use std::fmt::{Display, Formatter};
use std::ops::Neg;

/// Handle to a node in the [`Bdd`][crate::bdd::Bdd] manager.
///
/// The sign encodes a complemented edge: `-f` is the negation of `f`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Ref(i32);

impl Ref {
    pub const fn positive(index: u32) -> Self {
        Self(index as i32)
    }

    pub const fn is_negated(&self) -> bool {
        self.0 < 0
    }

    pub const fn negate(self) -> Self {
        Self(-self.0)
    }

    /// Return the internal signed representation.
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Return the index of the referenced node.
    pub const fn index(self) -> u32 {
        self.0.unsigned_abs()
    }

    /// Zig-zag encoding, used for hashing.
    pub(crate) const fn unsigned(self) -> u32 {
        (self.0.unsigned_abs() << 1) + (self.0 < 0) as u32
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
        write!(f, "{}@{}", if self.is_negated() { "~" } else { "" }, self.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negation_roundtrip() {
        let r = Ref::positive(5);
        assert!(!r.is_negated());
        assert!((-r).is_negated());
        assert_eq!(-(-r), r);
        assert_eq!((-r).index(), 5);
    }

    #[test]
    fn test_display() {
        let r = Ref::positive(3);
        assert_eq!(r.to_string(), "@3");
        assert_eq!((-r).to_string(), "~@3");
    }

    #[test]
    fn test_unsigned_is_distinct_for_signs() {
        let r = Ref::positive(7);
        assert_ne!(r.unsigned(), (-r).unsigned());
    }
}
