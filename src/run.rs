//! Blocking evaluators.
//!
//! [`exec`]/[`exec_expr`] run one protocol against a pre-created endpoint,
//! absorbing [`WouldBlock`](crate::WouldBlock) under adaptive backoff.
//! [`run`]/[`run_expr`] create a pair and interleave both duals on the
//! calling thread, one dispatch per side per iteration; the backoff only
//! engages when neither side moved. No threads are spawned and no channels
//! are created anywhere in this module — for matched duals this schedule is
//! deadlock-free and progresses as soon as either side becomes ready.

use std::marker;

use crate::backoff::Backoff;
use crate::bridge::reify;
use crate::eff::Eff;
use crate::endpoint::{new_pair, Endpoint};
use crate::expr::{eval_raw, run_frames, Erased, Expr, Handled, Handler, StepState, Stepped};
use crate::op::{Operation, SessionDispatch};
use crate::step::{advance, step, Advanced};
use crate::transport::WouldBlock;

/// Blocks until `sop` dispatches, climbing the backoff ladder across
/// consecutive [`WouldBlock`]s and resetting it on success.
pub(crate) fn dispatch_wait(
    ep: &Endpoint,
    sop: &mut dyn SessionDispatch,
    bo: &mut Backoff,
) -> Erased {
    loop {
        match sop.dispatch_session(ep) {
            Ok(value) => {
                bo.reset();
                return value;
            }
            Err(WouldBlock) => bo.wait(),
        }
    }
}

struct SessionHandler<'ep> {
    ep: &'ep Endpoint,
    bo: Backoff,
}

impl Handler for SessionHandler<'_> {
    fn dispatch(&mut self, op: &mut dyn Operation) -> Handled {
        match op.as_session_mut() {
            Some(sop) => Handled::Resume(dispatch_wait(self.ep, sop, &mut self.bo)),
            None => panic!("unhandled effect in session handler"),
        }
    }
}

/// Runs a closure-form protocol to completion on `ep`.
pub fn exec<R: marker::Send + 'static>(ep: &Endpoint, protocol: Eff<R>) -> R {
    exec_expr(ep, reify(protocol))
}

/// Runs a defunctionalized protocol to completion on `ep`.
pub fn exec_expr<R: marker::Send + 'static>(ep: &Endpoint, protocol: Expr<R>) -> R {
    let mut handler = SessionHandler {
        ep,
        bo: Backoff::new(),
    };
    *eval_raw(protocol.into_raw(), &mut handler)
        .downcast::<R>()
        .expect("protocol result type mismatch")
}

/// Creates a session pair, runs both closure-form duals interleaved on the
/// calling thread, and returns both results.
pub fn run<A, B>(a: Eff<A>, b: Eff<B>) -> (A, B)
where
    A: marker::Send + 'static,
    B: marker::Send + 'static,
{
    run_expr(reify(a), reify(b))
}

/// Creates a session pair, runs both defunctionalized duals interleaved on
/// the calling thread, and returns both results.
pub fn run_expr<A, B>(a: Expr<A>, b: Expr<B>) -> (A, B)
where
    A: marker::Send + 'static,
    B: marker::Send + 'static,
{
    let (ep_a, ep_b) = new_pair();
    let mut side_a = step(a);
    let mut side_b = step(b);
    let mut bo = Backoff::new();
    loop {
        let mut progress = false;
        side_a = poll_side(&ep_a, side_a, &mut progress);
        side_b = poll_side(&ep_b, side_b, &mut progress);
        if matches!((&side_a, &side_b), (Stepped::Done(_), Stepped::Done(_))) {
            break;
        }
        if progress {
            bo.reset();
        } else {
            bo.wait();
        }
    }
    match (side_a, side_b) {
        (Stepped::Done(result_a), Stepped::Done(result_b)) => (result_a, result_b),
        _ => unreachable!("interleave loop exits only when both sides are done"),
    }
}

fn poll_side<R: marker::Send + 'static>(
    ep: &Endpoint,
    side: Stepped<R>,
    progress: &mut bool,
) -> Stepped<R> {
    match side {
        done @ Stepped::Done(_) => done,
        Stepped::Next(susp) => match advance(ep, susp) {
            Advanced::Done(result) => {
                *progress = true;
                Stepped::Done(result)
            }
            Advanced::Next(next) => {
                *progress = true;
                Stepped::Next(next)
            }
            Advanced::Blocked(same) => Stepped::Next(same),
        },
    }
}

/// Evaluates an effect-free protocol. Panics if the protocol performs any
/// operation — useful for pure recursion and for asserting a protocol
/// fragment is effect-free.
pub fn run_pure<R: marker::Send + 'static>(protocol: Expr<R>) -> R {
    let raw = protocol.into_raw();
    match run_frames(raw.value, raw.frame) {
        StepState::Done(value) => *value
            .downcast::<R>()
            .expect("protocol result type mismatch"),
        StepState::Suspended(_) => panic!("unhandled effect in pure evaluation"),
    }
}
