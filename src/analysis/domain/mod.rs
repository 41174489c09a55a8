//! Abstract domains: lattices approximating sets of concrete values.

use std::fmt::Debug;

pub mod constant;
pub mod environment;
pub mod sign;
pub mod signed_constant;

pub use self::constant::ConstantDomain;
pub use self::environment::ConstantEnvironment;
pub use self::signed_constant::SignedConstantDomain;

/// A value in a lattice-ordered abstract domain.
///
/// `join` and `meet` must be the least upper bound and greatest lower bound
/// of the partial order `leq`. `widen` accelerates convergence of ascending
/// chains; the default is `join`, which suffices for domains of constant
/// height.
pub trait AbstractDomain: Clone + Debug + PartialEq {
    fn top() -> Self;

    fn bottom() -> Self;

    fn is_bottom(&self) -> bool;

    fn join(&self, other: &Self) -> Self;

    fn meet(&self, other: &Self) -> Self;

    fn widen(&self, other: &Self) -> Self {
        self.join(other)
    }

    /// The partial order of the lattice.
    fn leq(&self, other: &Self) -> bool;
}
