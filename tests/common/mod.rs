//! Shared driver for stepping tests: runs a protocol to completion on one
//! endpoint via a step/advance loop, spin-retrying would-block dispatches
//! (the peer is simply not ready yet).

use duet::{advance, step, Advanced, Endpoint, Expr, Stepped};

pub fn drive<R: std::marker::Send + 'static>(ep: &Endpoint, protocol: Expr<R>) -> R {
    let mut state = step(protocol);
    loop {
        match state {
            Stepped::Done(result) => return result,
            Stepped::Next(susp) => {
                state = match advance(ep, susp) {
                    Advanced::Done(result) => Stepped::Done(result),
                    Advanced::Next(next) => Stepped::Next(next),
                    Advanced::Blocked(same) => Stepped::Next(same),
                };
            }
        }
    }
}
