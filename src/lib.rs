//! Two-party session protocols as algebraic effects over lock-free bounded
//! transport.
//!
//! A protocol is a first-class value describing a computation that may
//! perform six session operations — [`Send`], [`Recv`], [`Close`],
//! [`SelectL`], [`SelectR`], [`Offer`] — and finally produce a result. Two
//! dual protocols communicate through an [`Endpoint`] pair wired over four
//! bounded single-producer/single-consumer rings (data and branch choice,
//! one per direction) plus a shared close counter.
//!
//! # Non-blocking semantics
//!
//! Dispatching an operation never blocks. It either completes against the
//! transport or reports [`WouldBlock`], meaning the peer has not yet
//! produced or consumed:
//!
//! - The blocking evaluators ([`exec`], [`run()`](run()) and friends) absorb
//!   [`WouldBlock`] internally, waiting under an adaptive [`Backoff`]
//!   (spin → yield → sleep) and resetting it on every successful dispatch.
//! - The stepping evaluators ([`step()`](step()), [`advance`]) surface the boundary:
//!   a dispatch that cannot progress hands the suspension back unconsumed
//!   for the caller to retry, which is what makes the crate embeddable in
//!   external event loops.
//!
//! # Two protocol forms
//!
//! Protocols come in two semantically equivalent representations:
//!
//! - **Closure form** ([`Eff`]) — composed from closures, ergonomic to
//!   write. Built with [`send_then`], [`recv_bind`], [`close_done`],
//!   [`select_l_then`], [`select_r_then`], [`offer_branch`], [`rec()`](rec()).
//! - **Defunctionalized form** ([`Expr`]) — a chain of pooled frames,
//!   evaluated by an iterative loop with amortized zero allocation at
//!   steady state. Built with the `expr_*` twins of the constructors above.
//!
//! [`reify`] and [`reflect`] convert between the forms; the round trip
//! preserves both the result and the sequence of effects.
//!
//! ```
//! use duet::{close_done, recv_bind, run, send_then};
//!
//! let client = send_then(42, recv_bind(|reply: String| close_done(reply)));
//! let server = recv_bind(|n: i32| {
//!     send_then(format!("got {n}"), close_done("done"))
//! });
//!
//! let (client_result, server_result) = run(client, server);
//! assert_eq!(client_result, "got 42");
//! assert_eq!(server_result, "done");
//! ```
//!
//! # Branching and recursion
//!
//! One side selects a branch ([`select_l_then`]/[`select_r_then`]), the
//! other offers both ([`offer_branch`]). Recursive protocols are written
//! with [`rec()`](rec()): the step function returns `Left(state)` to continue or
//! `Right(result)` to finish. Recursion is stack-safe — pure step chains of
//! millions of iterations evaluate in constant stack, because both forms
//! share one iterative frame loop underneath.
//!
//! ```
//! use duet::{close_done, rec, recv_bind, select_l_then, select_r_then, send_then, Eff, Either};
//!
//! // Double the counter through the peer until it reaches 100.
//! let client = rec(1, |n: i32| {
//!     send_then(n, recv_bind(move |doubled: i32| {
//!         if doubled >= 100 {
//!             select_l_then(close_done(Either::Right(doubled)))
//!         } else {
//!             select_r_then(Eff::pure(Either::Left(doubled)))
//!         }
//!     }))
//! });
//! ```
//!
//! # Delegation
//!
//! The payload of [`Send`]/[`Recv`] may itself be an [`Endpoint`]: a session
//! side travels through another session, and the receiver continues the
//! delegated protocol. Moving the handle transfers the transport role
//! wholesale, so the sender cannot touch the delegated side afterwards.
//!
//! # Errors
//!
//! An orthogonal error effect composes with session dispatch: [`throw`]
//! raises a value of any type `E`, [`catch`] recovers scoped, and the
//! `_error` evaluators ([`exec_error`], [`run_error`], [`step_error`],
//! [`advance_error`]) yield [`Either<E, R>`](Either) — `Right` on
//! completion, `Left` when a throw propagated uncaught, short-circuiting
//! past any pending session work.
//!
//! # Scheduling modes
//!
//! - *Single-threaded interleaving*: [`run()`](run()) evaluates both duals on the
//!   calling thread, attempting each side once per iteration and backing
//!   off only when neither progressed.
//! - *Two threads*: move each endpoint into its own thread and drive it
//!   with [`exec`]. The rings are lock-free SPSC; release/acquire
//!   publication provides the cross-thread ordering. No locks are taken
//!   anywhere in dispatch.
//!
//! Timeouts and cancellation are deliberately not provided at this layer; a
//! stuck pair (both sides receiving, say) spins in backoff forever, and the
//! layer above decides deadlines between [`advance`] retries.

mod backoff;
mod bridge;
mod eff;
mod either;
mod endpoint;
mod error;
mod expr;
mod fused;
mod fused_expr;
mod op;
mod rec;
mod run;
mod serial;
mod step;
mod transport;

pub use backoff::Backoff;
pub use bridge::{reflect, reify};
pub use eff::Eff;
pub use either::Either;
pub use endpoint::{new_pair, Endpoint, CHANNEL_CAPACITY};
pub use error::{
    advance_error, catch, exec_error, exec_error_expr, expr_catch, expr_throw, run_error,
    run_error_expr, step_error, throw, Catch, ErrorContext, Throw,
};
pub use expr::{Erased, Expr, Stepped, Suspension};
pub use fused::{close_done, offer_branch, recv_bind, select_l_then, select_r_then, send_then};
pub use fused_expr::{
    expr_close_done, expr_offer_branch, expr_recv_bind, expr_select_l_then, expr_select_r_then,
    expr_send_then,
};
pub use op::{Close, Offer, Operation, Recv, SelectL, SelectR, Send, SessionDispatch};
pub use rec::{rec, rec_expr};
pub use run::{exec, exec_expr, run, run_expr, run_pure};
pub use serial::Serial;
pub use step::{advance, step, Advanced};
pub use transport::{Spsc, WouldBlock};
