//! A flat lattice over 64-bit signed integers.

use crate::analysis::domain::AbstractDomain;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Either a single known integer, or one of the two trivial elements.
///
/// The join of two distinct values is `Top`; their meet is `Bottom`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum ConstantDomain {
    Bottom,
    Value(i64),
    Top,
}

use self::ConstantDomain::*;

impl ConstantDomain {
    /// The singleton value this element holds, if it holds one.
    pub fn value(&self) -> Option<i64> {
        match *self {
            Value(value) => Some(value),
            Top | Bottom => None,
        }
    }
}

impl AbstractDomain for ConstantDomain {
    fn top() -> ConstantDomain {
        Top
    }

    fn bottom() -> ConstantDomain {
        Bottom
    }

    fn is_bottom(&self) -> bool {
        matches!(self, Bottom)
    }

    fn join(&self, other: &ConstantDomain) -> ConstantDomain {
        match (*self, *other) {
            (Bottom, x) | (x, Bottom) => x,
            (Value(u), Value(v)) if u == v => Value(u),
            _ => Top,
        }
    }

    fn meet(&self, other: &ConstantDomain) -> ConstantDomain {
        match (*self, *other) {
            (Top, x) | (x, Top) => x,
            (Value(u), Value(v)) if u == v => Value(u),
            _ => Bottom,
        }
    }

    fn leq(&self, other: &ConstantDomain) -> bool {
        match (*self, *other) {
            (Bottom, _) | (_, Top) => true,
            (Value(u), Value(v)) => u == v,
            _ => false,
        }
    }
}

impl fmt::Display for ConstantDomain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Bottom => write!(f, "bottom"),
            Value(value) => write!(f, "{}", value),
            Top => write!(f, "top"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ELEMENTS: [ConstantDomain; 6] =
        [Bottom, Value(-1), Value(0), Value(1), Value(7), Top];

    #[test]
    fn lattice_laws() {
        for &a in &ELEMENTS {
            assert_eq!(a.join(&a), a);
            assert_eq!(a.meet(&a), a);
            assert_eq!(a.join(&ConstantDomain::bottom()), a);
            assert_eq!(a.meet(&ConstantDomain::top()), a);
            for &b in &ELEMENTS {
                assert_eq!(a.join(&b), b.join(&a));
                assert_eq!(a.meet(&b), b.meet(&a));
                assert_eq!(a.join(&a.meet(&b)), a);
                assert_eq!(a.meet(&a.join(&b)), a);
                assert_eq!(a.leq(&b), a.join(&b) == b);
                for &c in &ELEMENTS {
                    assert_eq!(a.join(&b).join(&c), a.join(&b.join(&c)));
                    assert_eq!(a.meet(&b).meet(&c), a.meet(&b.meet(&c)));
                }
            }
        }
    }

    #[test]
    fn flat_behavior() {
        assert_eq!(Value(1).join(&Value(1)), Value(1));
        assert_eq!(Value(1).join(&Value(2)), Top);
        assert_eq!(Value(1).meet(&Value(1)), Value(1));
        assert_eq!(Value(1).meet(&Value(2)), Bottom);
        assert_eq!(Value(3).value(), Some(3));
        assert_eq!(Top.value(), None);
        assert_eq!(Bottom.value(), None);
    }
}
