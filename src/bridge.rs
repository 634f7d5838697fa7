//! Conversions between the closure and defunctionalized protocol forms.
//!
//! Round-trip laws hold observationally: `reflect(reify(m))` produces the
//! same value and the same sequence of effects as `m`, and symmetrically.

use std::marker;

use crate::eff::Eff;
use crate::expr::Expr;

/// Converts a closure-form protocol into its defunctionalized form, suitable
/// for [`exec_expr`](crate::exec_expr), [`run_expr`](crate::run_expr), or
/// stepping with [`step()`](crate::step())/[`advance`](crate::advance).
pub fn reify<A: marker::Send + 'static>(m: Eff<A>) -> Expr<A> {
    m.force()
}

/// Converts a defunctionalized protocol back into closure form, suitable for
/// [`exec`](crate::exec) or [`run()`](crate::run()).
pub fn reflect<A: marker::Send + 'static>(m: Expr<A>) -> Eff<A> {
    Eff::from_fn(move || m)
}
