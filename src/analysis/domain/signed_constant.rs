//! The reduced product of the sign lattice and the flat constant lattice.
//!
//! Both components describe the same register, so they are kept mutually
//! consistent: a sign of exactly-zero forces the constant component to the
//! singleton zero, and a singleton constant forces the sign component to
//! the sign of that constant. A contradiction between the components
//! collapses the pair to bottom.

use crate::analysis::domain::sign::Interval;
use crate::analysis::domain::{AbstractDomain, ConstantDomain};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A sign interval paired with an optional singleton constant.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct SignedConstantDomain {
    interval: Interval,
    constant: ConstantDomain,
}

impl SignedConstantDomain {
    /// The singleton abstraction of `value`.
    pub fn of(value: i64) -> SignedConstantDomain {
        SignedConstantDomain::reduce(Interval::top(), ConstantDomain::Value(value))
    }

    /// The abstraction of every integer within `interval`.
    pub fn of_interval(interval: Interval) -> SignedConstantDomain {
        SignedConstantDomain::reduce(interval, ConstantDomain::top())
    }

    // Restores the invariant after a componentwise operation.
    fn reduce(interval: Interval, constant: ConstantDomain) -> SignedConstantDomain {
        if interval.is_bottom() || constant.is_bottom() {
            return SignedConstantDomain::bottom();
        }
        let constant = if interval == Interval::Eqz {
            constant.meet(&ConstantDomain::Value(0))
        } else {
            constant
        };
        let interval = match constant {
            ConstantDomain::Bottom => return SignedConstantDomain::bottom(),
            ConstantDomain::Value(value) => {
                if !interval.contains(value) {
                    return SignedConstantDomain::bottom();
                }
                interval.meet(&Interval::from_int(value))
            }
            ConstantDomain::Top => interval,
        };
        SignedConstantDomain { interval, constant }
    }

    /// The sign component.
    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// The singleton constant, if the value is known exactly.
    pub fn constant(&self) -> Option<i64> {
        self.constant.value()
    }

    /// The largest integer this value may be.
    pub fn max_element(&self) -> i64 {
        debug_assert!(!self.is_bottom(), "max_element of bottom");
        if let Some(value) = self.constant() {
            return value;
        }
        match self.interval {
            Interval::Bottom | Interval::Eqz | Interval::Lez => 0,
            Interval::Ltz => -1,
            Interval::Gtz | Interval::Gez | Interval::Nez | Interval::All => i64::MAX,
        }
    }

    /// The smallest integer this value may be.
    pub fn min_element(&self) -> i64 {
        debug_assert!(!self.is_bottom(), "min_element of bottom");
        if let Some(value) = self.constant() {
            return value;
        }
        match self.interval {
            Interval::Bottom | Interval::Eqz | Interval::Gez => 0,
            Interval::Gtz => 1,
            Interval::Ltz | Interval::Lez | Interval::Nez | Interval::All => i64::MIN,
        }
    }
}

impl AbstractDomain for SignedConstantDomain {
    fn top() -> SignedConstantDomain {
        SignedConstantDomain {
            interval: Interval::top(),
            constant: ConstantDomain::top(),
        }
    }

    fn bottom() -> SignedConstantDomain {
        SignedConstantDomain {
            interval: Interval::bottom(),
            constant: ConstantDomain::bottom(),
        }
    }

    fn is_bottom(&self) -> bool {
        self.interval.is_bottom()
    }

    fn join(&self, other: &SignedConstantDomain) -> SignedConstantDomain {
        SignedConstantDomain::reduce(
            self.interval.join(&other.interval),
            self.constant.join(&other.constant),
        )
    }

    fn meet(&self, other: &SignedConstantDomain) -> SignedConstantDomain {
        SignedConstantDomain::reduce(
            self.interval.meet(&other.interval),
            self.constant.meet(&other.constant),
        )
    }

    fn widen(&self, other: &SignedConstantDomain) -> SignedConstantDomain {
        if self.is_bottom() {
            return *other;
        }
        if other.leq(self) {
            return *self;
        }
        let interval = if other.interval.leq(&self.interval) {
            self.interval
        } else {
            Interval::top()
        };
        let constant = if self.constant == other.constant {
            self.constant
        } else {
            ConstantDomain::top()
        };
        SignedConstantDomain::reduce(interval, constant)
    }

    fn leq(&self, other: &SignedConstantDomain) -> bool {
        self.interval.leq(&other.interval) && self.constant.leq(&other.constant)
    }
}

impl fmt::Display for SignedConstantDomain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_bottom() {
            write!(f, "bottom")
        } else if let Some(value) = self.constant() {
            write!(f, "{}", value)
        } else {
            write!(f, "{}", self.interval)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elements() -> Vec<SignedConstantDomain> {
        vec![
            SignedConstantDomain::bottom(),
            SignedConstantDomain::of(-1),
            SignedConstantDomain::of(0),
            SignedConstantDomain::of(1),
            SignedConstantDomain::of(i64::MAX),
            SignedConstantDomain::of(i64::MIN),
            SignedConstantDomain::of_interval(Interval::Ltz),
            SignedConstantDomain::of_interval(Interval::Gtz),
            SignedConstantDomain::of_interval(Interval::Lez),
            SignedConstantDomain::of_interval(Interval::Gez),
            SignedConstantDomain::of_interval(Interval::Nez),
            SignedConstantDomain::top(),
        ]
    }

    #[test]
    fn lattice_laws() {
        for a in elements() {
            assert_eq!(a.join(&a), a);
            assert_eq!(a.meet(&a), a);
            assert_eq!(a.join(&SignedConstantDomain::bottom()), a);
            assert_eq!(a.meet(&SignedConstantDomain::top()), a);
            for b in elements() {
                assert_eq!(a.join(&b), b.join(&a));
                assert_eq!(a.meet(&b), b.meet(&a));
                assert_eq!(a.join(&a.meet(&b)), a);
                assert_eq!(a.meet(&a.join(&b)), a);
                assert_eq!(a.leq(&b), a.join(&b) == b);
            }
        }
    }

    #[test]
    fn reduction() {
        // An exactly-zero interval is the singleton zero.
        assert_eq!(
            SignedConstantDomain::of_interval(Interval::Eqz),
            SignedConstantDomain::of(0)
        );
        // A singleton tightens the interval to its sign.
        assert_eq!(SignedConstantDomain::of(5).interval(), Interval::Gtz);
        assert_eq!(SignedConstantDomain::of(-5).interval(), Interval::Ltz);
        assert_eq!(SignedConstantDomain::of(0).interval(), Interval::Eqz);
        // A contradiction collapses the pair.
        assert!(SignedConstantDomain::of(1)
            .meet(&SignedConstantDomain::of_interval(Interval::Ltz))
            .is_bottom());
    }

    #[test]
    fn join_and_meet_operations() {
        let one = SignedConstantDomain::of(1);
        let minus_one = SignedConstantDomain::of(-1);
        let zero = SignedConstantDomain::of(0);
        let max_val = SignedConstantDomain::of(i64::MAX);
        let min_val = SignedConstantDomain::of(i64::MIN);

        assert_eq!(one.interval(), Interval::Gtz);
        assert_eq!(minus_one.interval(), Interval::Ltz);
        assert_eq!(zero.interval(), Interval::Eqz);
        assert_eq!(max_val.interval(), Interval::Gtz);
        assert_eq!(min_val.interval(), Interval::Ltz);

        assert_eq!(one.join(&minus_one).interval(), Interval::All);
        assert_eq!(one.join(&zero).interval(), Interval::Gez);
        assert_eq!(minus_one.join(&zero).interval(), Interval::Lez);
        assert_eq!(max_val.join(&zero).interval(), Interval::Gez);
        assert_eq!(min_val.join(&zero).interval(), Interval::Lez);

        let positive = SignedConstantDomain::of_interval(Interval::Gtz);
        let negative = SignedConstantDomain::of_interval(Interval::Ltz);

        assert_eq!(one.join(&positive), positive);
        assert_eq!(one.join(&negative), SignedConstantDomain::top());
        assert_eq!(max_val.join(&positive), positive);
        assert_eq!(max_val.join(&negative), SignedConstantDomain::top());
        assert_eq!(minus_one.join(&negative), negative);
        assert_eq!(minus_one.join(&positive), SignedConstantDomain::top());
        assert_eq!(min_val.join(&negative), negative);
        assert_eq!(min_val.join(&positive), SignedConstantDomain::top());
        assert_eq!(zero.join(&positive).interval(), Interval::Gez);
        assert_eq!(zero.join(&negative).interval(), Interval::Lez);

        assert_eq!(one.meet(&positive), one);
        assert!(one.meet(&negative).is_bottom());
        assert_eq!(max_val.meet(&positive), max_val);
        assert!(max_val.meet(&negative).is_bottom());
        assert_eq!(minus_one.meet(&negative), minus_one);
        assert!(minus_one.meet(&positive).is_bottom());
        assert_eq!(min_val.meet(&negative), min_val);
        assert!(min_val.meet(&positive).is_bottom());
    }

    #[test]
    fn extrema() {
        assert_eq!(SignedConstantDomain::of(7).max_element(), 7);
        assert_eq!(SignedConstantDomain::of(7).min_element(), 7);

        let gez = SignedConstantDomain::of_interval(Interval::Gez);
        assert_eq!(gez.min_element(), 0);
        assert_eq!(gez.max_element(), i64::MAX);

        let gtz = SignedConstantDomain::of_interval(Interval::Gtz);
        assert_eq!(gtz.min_element(), 1);
        assert_eq!(gtz.max_element(), i64::MAX);

        let lez = SignedConstantDomain::of_interval(Interval::Lez);
        assert_eq!(lez.min_element(), i64::MIN);
        assert_eq!(lez.max_element(), 0);

        let ltz = SignedConstantDomain::of_interval(Interval::Ltz);
        assert_eq!(ltz.min_element(), i64::MIN);
        assert_eq!(ltz.max_element(), -1);

        assert_eq!(SignedConstantDomain::of(0).max_element(), 0);
        assert_eq!(SignedConstantDomain::of(0).min_element(), 0);
        assert_eq!(SignedConstantDomain::top().max_element(), i64::MAX);
        assert_eq!(SignedConstantDomain::top().min_element(), i64::MIN);
    }

    #[test]
    fn widening() {
        let zero = SignedConstantDomain::of(0);
        let one = SignedConstantDomain::of(1);
        // No growth keeps the old value.
        assert_eq!(one.widen(&one), one);
        assert_eq!(one.widen(&SignedConstantDomain::bottom()), one);
        // Growth of the sign component jumps to top.
        assert_eq!(
            zero.widen(&zero.join(&one)),
            SignedConstantDomain::top()
        );
        // Growth from bottom adopts the new value.
        assert_eq!(SignedConstantDomain::bottom().widen(&one), one);
    }
}
