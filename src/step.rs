//! One-effect-at-a-time evaluation for external event loops.
//!
//! [`step`] drives a protocol to its first suspension without touching any
//! endpoint; [`advance`] dispatches exactly one suspended operation. A
//! dispatch that would block returns the suspension unconsumed, so a
//! proactor can retry it after observing peer progress (and check its own
//! deadlines in between — this layer imposes none).

use std::marker;

use crate::endpoint::Endpoint;
use crate::expr::{step_raw, Expr, Stepped, Suspension};
use crate::transport::WouldBlock;

/// Outcome of [`advance`]: the protocol finished, moved to its next
/// suspension, or could not progress yet.
#[must_use]
pub enum Advanced<R> {
    /// The dispatched operation was the protocol's last; here is its result.
    Done(R),
    /// Dispatch succeeded and the protocol paused on its next operation.
    Next(Suspension<R>),
    /// The transport was not ready. The suspension is returned unconsumed
    /// and may be retried after the peer makes progress.
    Blocked(Suspension<R>),
}

/// Evaluates a protocol until its first effect suspension.
///
/// Returns [`Stepped::Done`] when the protocol completes without performing
/// any operation; otherwise the suspension exposes the pending operation via
/// [`Suspension::op`].
pub fn step<R: marker::Send + 'static>(protocol: Expr<R>) -> Stepped<R> {
    step_raw(protocol.into_raw())
}

/// Dispatches the suspended session operation on `ep`.
///
/// A successful dispatch consumes the suspension and resumes the protocol to
/// its next suspension or completion. [`Advanced::Blocked`] hands the same
/// suspension back for retry. A non-session operation is a programmer error
/// and panics.
pub fn advance<R: marker::Send + 'static>(ep: &Endpoint, mut susp: Suspension<R>) -> Advanced<R> {
    let dispatched = match susp.op_mut().as_session_mut() {
        Some(sop) => sop.dispatch_session(ep),
        None => panic!("unhandled effect in advance"),
    };
    match dispatched {
        Ok(value) => match susp.resume(value) {
            Stepped::Done(result) => Advanced::Done(result),
            Stepped::Next(next) => Advanced::Next(next),
        },
        Err(WouldBlock) => Advanced::Blocked(susp),
    }
}
