//! An abstract environment mapping registers to signed-constant values.

use crate::analysis::domain::{AbstractDomain, SignedConstantDomain};
use crate::il::Register;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A register environment.
///
/// A register without a binding is unconstrained (top), which keeps the
/// environment well-defined over an unbounded register space. Two
/// normalizations maintain this representation: storing a top value removes
/// the binding, and storing a bottom value collapses the whole environment
/// to the unreachable sentinel. Derived equality is therefore lattice
/// equality.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ConstantEnvironment {
    /// The unreachable state.
    Bottom,
    /// One binding per register about which something is known.
    Env(BTreeMap<Register, SignedConstantDomain>),
}

impl ConstantEnvironment {
    /// Creates an environment with every register unconstrained.
    pub fn new() -> ConstantEnvironment {
        ConstantEnvironment::Env(BTreeMap::new())
    }

    /// The value bound to `register`.
    pub fn get(&self, register: Register) -> SignedConstantDomain {
        match self {
            ConstantEnvironment::Bottom => SignedConstantDomain::bottom(),
            ConstantEnvironment::Env(bindings) => bindings
                .get(&register)
                .copied()
                .unwrap_or_else(SignedConstantDomain::top),
        }
    }

    /// Binds `register` to `value`, normalizing the representation.
    pub fn set(&mut self, register: Register, value: SignedConstantDomain) {
        if let ConstantEnvironment::Env(bindings) = self {
            if value.is_bottom() {
                *self = ConstantEnvironment::Bottom;
            } else if value == SignedConstantDomain::top() {
                bindings.remove(&register);
            } else {
                bindings.insert(register, value);
            }
        }
    }

    /// Rebinds `register` to the image of its current value under `f`.
    pub fn update<F>(&mut self, register: Register, f: F)
    where
        F: FnOnce(SignedConstantDomain) -> SignedConstantDomain,
    {
        if !self.is_bottom() {
            let value = f(self.get(register));
            self.set(register, value);
        }
    }

    pub fn set_to_bottom(&mut self) {
        *self = ConstantEnvironment::Bottom;
    }
}

impl Default for ConstantEnvironment {
    fn default() -> ConstantEnvironment {
        ConstantEnvironment::new()
    }
}

impl AbstractDomain for ConstantEnvironment {
    fn top() -> ConstantEnvironment {
        ConstantEnvironment::new()
    }

    fn bottom() -> ConstantEnvironment {
        ConstantEnvironment::Bottom
    }

    fn is_bottom(&self) -> bool {
        matches!(self, ConstantEnvironment::Bottom)
    }

    fn join(&self, other: &ConstantEnvironment) -> ConstantEnvironment {
        let (a, b) = match (self, other) {
            (ConstantEnvironment::Bottom, _) => return other.clone(),
            (_, ConstantEnvironment::Bottom) => return self.clone(),
            (ConstantEnvironment::Env(a), ConstantEnvironment::Env(b)) => (a, b),
        };
        // A register absent on either side is top there, and so top in the
        // join; only registers bound on both sides can stay bound.
        let mut bindings = BTreeMap::new();
        for (register, value) in a {
            if let Some(other_value) = b.get(register) {
                let joined = value.join(other_value);
                if joined != SignedConstantDomain::top() {
                    bindings.insert(*register, joined);
                }
            }
        }
        ConstantEnvironment::Env(bindings)
    }

    fn meet(&self, other: &ConstantEnvironment) -> ConstantEnvironment {
        let (a, b) = match (self, other) {
            (ConstantEnvironment::Bottom, _) | (_, ConstantEnvironment::Bottom) => {
                return ConstantEnvironment::Bottom;
            }
            (ConstantEnvironment::Env(a), ConstantEnvironment::Env(b)) => (a, b),
        };
        let mut bindings = BTreeMap::new();
        for register in a.keys().chain(b.keys()) {
            let met = self.get(*register).meet(&other.get(*register));
            if met.is_bottom() {
                return ConstantEnvironment::Bottom;
            }
            if met != SignedConstantDomain::top() {
                bindings.insert(*register, met);
            }
        }
        ConstantEnvironment::Env(bindings)
    }

    fn widen(&self, other: &ConstantEnvironment) -> ConstantEnvironment {
        let (a, b) = match (self, other) {
            (ConstantEnvironment::Bottom, _) => return other.clone(),
            (_, ConstantEnvironment::Bottom) => return self.clone(),
            (ConstantEnvironment::Env(a), ConstantEnvironment::Env(b)) => (a, b),
        };
        let mut bindings = BTreeMap::new();
        for (register, value) in a {
            if let Some(other_value) = b.get(register) {
                let widened = value.widen(other_value);
                if widened != SignedConstantDomain::top() {
                    bindings.insert(*register, widened);
                }
            }
        }
        ConstantEnvironment::Env(bindings)
    }

    fn leq(&self, other: &ConstantEnvironment) -> bool {
        let bindings = match (self, other) {
            (ConstantEnvironment::Bottom, _) => return true,
            (_, ConstantEnvironment::Bottom) => return false,
            (_, ConstantEnvironment::Env(bindings)) => bindings,
        };
        // Registers unbound in `other` are top there and impose nothing.
        bindings
            .iter()
            .all(|(register, value)| self.get(*register).leq(value))
    }
}

impl fmt::Display for ConstantEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConstantEnvironment::Bottom => write!(f, "bottom"),
            ConstantEnvironment::Env(bindings) => {
                write!(f, "{{")?;
                for (i, (register, value)) in bindings.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "v{}: {}", register, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::domain::sign::Interval;

    #[test]
    fn absent_registers_are_top() {
        let env = ConstantEnvironment::new();
        assert_eq!(env.get(3), SignedConstantDomain::top());
        assert!(!env.is_bottom());
    }

    #[test]
    fn set_normalizes() {
        let mut env = ConstantEnvironment::new();
        env.set(0, SignedConstantDomain::of(4));
        assert_eq!(env.get(0), SignedConstantDomain::of(4));

        // Binding a register to top removes the entry entirely.
        env.set(0, SignedConstantDomain::top());
        assert_eq!(env, ConstantEnvironment::new());

        // Binding any register to bottom makes the state unreachable.
        env.set(1, SignedConstantDomain::of(2));
        env.set(2, SignedConstantDomain::bottom());
        assert!(env.is_bottom());
        assert_eq!(env.get(1), SignedConstantDomain::bottom());
    }

    #[test]
    fn pointwise_join() {
        let mut a = ConstantEnvironment::new();
        a.set(0, SignedConstantDomain::of(1));
        a.set(1, SignedConstantDomain::of(5));
        let mut b = ConstantEnvironment::new();
        b.set(0, SignedConstantDomain::of(0));

        let joined = a.join(&b);
        // v0 becomes the interval join, v1 is top on one side.
        assert_eq!(
            joined.get(0),
            SignedConstantDomain::of_interval(Interval::Gez)
        );
        assert_eq!(joined.get(1), SignedConstantDomain::top());

        // Bottom is the identity of join.
        assert_eq!(a.join(&ConstantEnvironment::bottom()), a);
        assert_eq!(ConstantEnvironment::bottom().join(&a), a);
    }

    #[test]
    fn pointwise_meet() {
        let mut a = ConstantEnvironment::new();
        a.set(0, SignedConstantDomain::of_interval(Interval::Gez));
        let mut b = ConstantEnvironment::new();
        b.set(0, SignedConstantDomain::of_interval(Interval::Nez));
        b.set(1, SignedConstantDomain::of(7));

        let met = a.meet(&b);
        assert_eq!(
            met.get(0),
            SignedConstantDomain::of_interval(Interval::Gtz)
        );
        assert_eq!(met.get(1), SignedConstantDomain::of(7));

        // A contradiction on any register collapses the environment.
        let mut c = ConstantEnvironment::new();
        c.set(0, SignedConstantDomain::of_interval(Interval::Ltz));
        assert!(a.meet(&c).is_bottom());
    }

    #[test]
    fn partial_order() {
        let mut a = ConstantEnvironment::new();
        a.set(0, SignedConstantDomain::of(1));
        let mut b = ConstantEnvironment::new();
        b.set(0, SignedConstantDomain::of_interval(Interval::Gtz));

        assert!(a.leq(&b));
        assert!(!b.leq(&a));
        assert!(ConstantEnvironment::bottom().leq(&a));
        assert!(!a.leq(&ConstantEnvironment::bottom()));
        assert!(a.leq(&ConstantEnvironment::new()));
        assert!(!ConstantEnvironment::new().leq(&a));
        assert_eq!(a.join(&a), a);
        assert_eq!(b.meet(&b), b);
    }

    #[test]
    fn pointwise_widen() {
        let mut a = ConstantEnvironment::new();
        a.set(0, SignedConstantDomain::of(0));
        a.set(1, SignedConstantDomain::of(3));
        let mut b = ConstantEnvironment::new();
        b.set(0, SignedConstantDomain::of_interval(Interval::Gez));
        b.set(1, SignedConstantDomain::of(3));

        let widened = a.widen(&b);
        // The growing register extrapolates to top, the stable one is kept.
        assert_eq!(widened.get(0), SignedConstantDomain::top());
        assert_eq!(widened.get(1), SignedConstantDomain::of(3));
    }
}
