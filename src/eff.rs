//! Closure-form session protocols.
//!
//! An [`Eff`] is a suspended computation: a deferred producer of the
//! defunctionalized form. Combinators compose closures; nothing runs (and no
//! frame is built) until an evaluator or [`reify`](crate::reify) forces it.
//! Both forms therefore share one evaluation loop — and its stack
//! discipline.

use std::marker;

use crate::expr::Expr;
use crate::op::Operation;

/// Closure-form session protocol producing a value of type `A`.
///
/// Used at most once per endpoint; every evaluator consumes it by value.
#[must_use]
pub struct Eff<A> {
    thunk: Box<dyn FnOnce() -> Expr<A> + marker::Send>,
}

impl<A: marker::Send + 'static> Eff<A> {
    pub(crate) fn from_fn(f: impl FnOnce() -> Expr<A> + marker::Send + 'static) -> Eff<A> {
        Eff { thunk: Box::new(f) }
    }

    /// Forces the deferred computation into its frame form.
    pub(crate) fn force(self) -> Expr<A> {
        (self.thunk)()
    }

    /// Computation that immediately produces `value`.
    pub fn pure(value: A) -> Eff<A> {
        Eff::from_fn(move || Expr::pure(value))
    }

    /// Computation that performs `op` and produces its dispatched value,
    /// asserted to be of type `A`.
    pub fn perform(op: impl Operation) -> Eff<A> {
        Eff::from_fn(move || Expr::perform(op))
    }

    /// Sequences `f` after this computation, feeding it the produced value.
    pub fn bind<B: marker::Send + 'static>(
        self,
        f: impl FnOnce(A) -> Eff<B> + marker::Send + 'static,
    ) -> Eff<B> {
        Eff::from_fn(move || self.force().bind(move |a| f(a).force()))
    }

    /// Sequences `next` after this computation, discarding this value.
    pub fn then<B: marker::Send + 'static>(self, next: Eff<B>) -> Eff<B> {
        Eff::from_fn(move || self.force().then(next.force()))
    }

    /// Applies `f` to the produced value.
    pub fn map<B: marker::Send + 'static>(
        self,
        f: impl FnOnce(A) -> B + marker::Send + 'static,
    ) -> Eff<B> {
        Eff::from_fn(move || self.force().map(f))
    }
}
