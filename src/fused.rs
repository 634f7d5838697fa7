//! Closure-form fused constructors.
//!
//! Each constructor combines one session operation with its continuation,
//! mirroring the protocol notation directly: `send_then(v, next)` is
//! "!v.next", `recv_bind(f)` is "?x.f(x)", and so on.

use std::marker;

use crate::eff::Eff;
use crate::either::Either;
use crate::op::{Close, Offer, Recv, SelectL, SelectR, Send};

/// Sends `value` to the peer, then continues with `next`.
pub fn send_then<T, B>(value: T, next: Eff<B>) -> Eff<B>
where
    T: marker::Send + 'static,
    B: marker::Send + 'static,
{
    Eff::<()>::perform(Send::new(value)).then(next)
}

/// Receives a value from the peer and passes it to `f`.
pub fn recv_bind<T, B>(f: impl FnOnce(T) -> Eff<B> + marker::Send + 'static) -> Eff<B>
where
    T: marker::Send + 'static,
    B: marker::Send + 'static,
{
    Eff::<T>::perform(Recv::<T>::new()).bind(f)
}

/// Closes the session and produces `value`.
pub fn close_done<A: marker::Send + 'static>(value: A) -> Eff<A> {
    Eff::<()>::perform(Close).then(Eff::pure(value))
}

/// Chooses the left branch, then continues with `next`.
pub fn select_l_then<B: marker::Send + 'static>(next: Eff<B>) -> Eff<B> {
    Eff::<()>::perform(SelectL).then(next)
}

/// Chooses the right branch, then continues with `next`.
pub fn select_r_then<B: marker::Send + 'static>(next: Eff<B>) -> Eff<B> {
    Eff::<()>::perform(SelectR).then(next)
}

/// Awaits the peer's branch choice and continues with `on_left` or
/// `on_right` accordingly.
pub fn offer_branch<A: marker::Send + 'static>(
    on_left: impl FnOnce() -> Eff<A> + marker::Send + 'static,
    on_right: impl FnOnce() -> Eff<A> + marker::Send + 'static,
) -> Eff<A> {
    Eff::<Either<(), ()>>::perform(Offer).bind(move |choice| match choice {
        Either::Left(()) => on_left(),
        Either::Right(()) => on_right(),
    })
}
