//! Defunctionalized fused constructors.
//!
//! Same surface as [`fused`](crate::fused), but each constructor assembles a
//! pooled frame chain instead of composing closures: an `Effect` frame
//! holding the operation and an identity resume, followed by a `Then` frame
//! for stateless continuations or an `Unwind` frame where a callback must be
//! re-entered with the dispatched value. At steady state the chain nodes
//! cycle through the frame pool and evaluation allocates nothing beyond the
//! erased payloads themselves.

use std::marker;

use crate::either::Either;
use crate::expr::{
    acquire, bind_unwind, identity_resume, unit, Erased, Expr, Frame, FrameNode, RawExpr,
};
use crate::op::{Close, Offer, Operation, Recv, SelectL, SelectR, Send};

fn perform_into(op: impl Operation, next: Frame) -> RawExpr {
    let effect = acquire(FrameNode::Effect {
        op: Box::new(op),
        resume: identity_resume,
        next,
    });
    RawExpr {
        value: unit(),
        frame: Frame::node(effect),
    }
}

fn then_node<B>(second: Expr<B>) -> Frame {
    let second = second.into_raw();
    Frame::node(acquire(FrameNode::Then {
        value: second.value,
        body: second.frame,
        next: Frame::ret(),
    }))
}

/// Sends `value` to the peer, then continues with `next`.
pub fn expr_send_then<T, B>(value: T, next: Expr<B>) -> Expr<B>
where
    T: marker::Send + 'static,
    B: marker::Send + 'static,
{
    Expr::from_raw(perform_into(Send::new(value), then_node(next)))
}

/// Receives a value from the peer and passes it to `f`.
pub fn expr_recv_bind<T, B>(f: impl FnOnce(T) -> Expr<B> + marker::Send + 'static) -> Expr<B>
where
    T: marker::Send + 'static,
    B: marker::Send + 'static,
{
    let f: Box<dyn FnOnce(T) -> RawExpr + marker::Send> = Box::new(move |t| f(t).into_raw());
    let bind = Frame::node(acquire(FrameNode::Unwind {
        data1: Some(Box::new(f)),
        data2: None,
        unwind: bind_unwind::<T>,
        next: Frame::ret(),
    }));
    Expr::from_raw(perform_into(Recv::<T>::new(), bind))
}

/// Closes the session and produces `value`.
pub fn expr_close_done<A: marker::Send + 'static>(value: A) -> Expr<A> {
    let done = Frame::node(acquire(FrameNode::Then {
        value: Box::new(value),
        body: Frame::ret(),
        next: Frame::ret(),
    }));
    Expr::from_raw(perform_into(Close, done))
}

/// Chooses the left branch, then continues with `next`.
pub fn expr_select_l_then<B: marker::Send + 'static>(next: Expr<B>) -> Expr<B> {
    Expr::from_raw(perform_into(SelectL, then_node(next)))
}

/// Chooses the right branch, then continues with `next`.
pub fn expr_select_r_then<B: marker::Send + 'static>(next: Expr<B>) -> Expr<B> {
    Expr::from_raw(perform_into(SelectR, then_node(next)))
}

fn offer_branch_unwind(
    data1: Option<Erased>,
    data2: Option<Erased>,
    current: Erased,
) -> (Erased, Frame) {
    let on_left = data1
        .expect("offer left branch missing")
        .downcast::<Box<dyn FnOnce() -> RawExpr + marker::Send>>()
        .expect("offer branch type mismatch");
    let on_right = data2
        .expect("offer right branch missing")
        .downcast::<Box<dyn FnOnce() -> RawExpr + marker::Send>>()
        .expect("offer branch type mismatch");
    let choice = *current
        .downcast::<Either<(), ()>>()
        .expect("offer resume type mismatch");
    let raw = match choice {
        Either::Left(()) => on_left(),
        Either::Right(()) => on_right(),
    };
    (raw.value, raw.frame)
}

/// Awaits the peer's branch choice and continues with `on_left` or
/// `on_right` accordingly.
pub fn expr_offer_branch<A: marker::Send + 'static>(
    on_left: impl FnOnce() -> Expr<A> + marker::Send + 'static,
    on_right: impl FnOnce() -> Expr<A> + marker::Send + 'static,
) -> Expr<A> {
    let on_left: Box<dyn FnOnce() -> RawExpr + marker::Send> =
        Box::new(move || on_left().into_raw());
    let on_right: Box<dyn FnOnce() -> RawExpr + marker::Send> =
        Box::new(move || on_right().into_raw());
    let branch = Frame::node(acquire(FrameNode::Unwind {
        data1: Some(Box::new(on_left)),
        data2: Some(Box::new(on_right)),
        unwind: offer_branch_unwind,
        next: Frame::ret(),
    }));
    Expr::from_raw(perform_into(Offer, branch))
}
