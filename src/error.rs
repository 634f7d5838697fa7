//! Throw/catch error effect and its composition with session dispatch.
//!
//! Error operations are eager and never touch an endpoint. [`catch`] is
//! scoped: a throw inside the body transfers control to the handler
//! computation, which may produce a value or rethrow; both body and handler
//! are error-only computations. A throw with no enclosing catch
//! short-circuits the whole protocol, discarding the current suspension and
//! becoming the final `Left`.
//!
//! The composed evaluators dispatch in a fixed order — session first, error
//! second, panic otherwise — and yield `Either<E, R>`: `Right` on
//! completion, `Left` when a throw propagated uncaught.

use std::marker;
use std::marker::PhantomData;

use crate::backoff::Backoff;
use crate::bridge::reify;
use crate::eff::Eff;
use crate::either::Either;
use crate::endpoint::{new_pair, Endpoint};
use crate::expr::{
    eval_raw, run_frames, Erased, Expr, Handled, Handler, RawExpr, StepState, Stepped, Suspension,
};
use crate::op::Operation;
use crate::run::dispatch_wait;
use crate::step::Advanced;
use crate::transport::WouldBlock;

/// Accumulator the error operations dispatch against: a flag plus the
/// pending error value.
pub struct ErrorContext<E> {
    pub has_err: bool,
    pub err: Option<E>,
}

impl<E> Default for ErrorContext<E> {
    fn default() -> Self {
        Self {
            has_err: false,
            err: None,
        }
    }
}

impl<E> ErrorContext<E> {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Raises an error of type `E`. Uncaught, it short-circuits the protocol.
pub struct Throw<E> {
    err: Option<E>,
}

impl<E: marker::Send + 'static> Throw<E> {
    pub fn new(err: E) -> Self {
        Self { err: Some(err) }
    }

    /// The error value still waiting to be raised, if any.
    pub fn err(&self) -> Option<&E> {
        self.err.as_ref()
    }

    fn take(&mut self) -> E {
        self.err.take().expect("throw already dispatched")
    }

    pub(crate) fn dispatch_error(&mut self, ctx: &mut ErrorContext<E>) -> Erased {
        ctx.has_err = true;
        ctx.err = Some(self.take());
        Box::new(())
    }
}

impl<E: marker::Send + 'static> Operation for Throw<E> {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

type BodyThunk = Box<dyn FnOnce() -> RawExpr + marker::Send>;

/// Scoped recovery: evaluates a body computation, transferring control to a
/// handler if the body throws.
pub struct Catch<E> {
    body: Option<BodyThunk>,
    handler: Option<Box<dyn FnOnce(E) -> RawExpr + marker::Send>>,
}

impl<E: marker::Send + 'static> Catch<E> {
    fn run(&mut self) -> Result<Erased, E> {
        let body = self.body.take().expect("catch body already consumed");
        match eval_error_only::<E>(body()) {
            Ok(value) => Ok(value),
            Err(err) => {
                let handler = self.handler.take().expect("catch handler already consumed");
                eval_error_only::<E>(handler(err))
            }
        }
    }

    pub(crate) fn dispatch_error(&mut self, ctx: &mut ErrorContext<E>) -> Erased {
        match self.run() {
            Ok(value) => value,
            Err(err) => {
                ctx.has_err = true;
                ctx.err = Some(err);
                Box::new(())
            }
        }
    }
}

impl<E: marker::Send + 'static> Operation for Catch<E> {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Evaluates an error-only computation (a catch body or handler). Session
/// operations are out of scope here and panic.
fn eval_error_only<E: marker::Send + 'static>(raw: RawExpr) -> Result<Erased, E> {
    let mut state = run_frames(raw.value, raw.frame);
    loop {
        match state {
            StepState::Done(value) => return Ok(value),
            StepState::Suspended(mut susp) => {
                if let Some(throw) = susp.op.as_any_mut().downcast_mut::<Throw<E>>() {
                    return Err(throw.take());
                }
                let caught = susp
                    .op
                    .as_any_mut()
                    .downcast_mut::<Catch<E>>()
                    .map(Catch::run);
                match caught {
                    Some(Ok(value)) => state = susp.resume(value),
                    Some(Err(err)) => return Err(err),
                    None => panic!("unhandled effect in catch evaluation"),
                }
            }
        }
    }
}

/// Closure-form throw.
pub fn throw<E, A>(err: E) -> Eff<A>
where
    E: marker::Send + 'static,
    A: marker::Send + 'static,
{
    Eff::perform(Throw::new(err))
}

/// Defunctionalized throw.
pub fn expr_throw<E, A>(err: E) -> Expr<A>
where
    E: marker::Send + 'static,
    A: marker::Send + 'static,
{
    Expr::perform(Throw::new(err))
}

/// Closure-form scoped recovery. `body` and `handler` must be error-only
/// computations; session operations inside them panic.
pub fn catch<E, A>(body: Eff<A>, handler: impl FnOnce(E) -> Eff<A> + marker::Send + 'static) -> Eff<A>
where
    E: marker::Send + 'static,
    A: marker::Send + 'static,
{
    Eff::perform(Catch::<E> {
        body: Some(Box::new(move || body.force().into_raw())),
        handler: Some(Box::new(move |err| handler(err).force().into_raw())),
    })
}

/// Defunctionalized scoped recovery. Same contract as [`catch`].
pub fn expr_catch<E, A>(
    body: Expr<A>,
    handler: impl FnOnce(E) -> Expr<A> + marker::Send + 'static,
) -> Expr<A>
where
    E: marker::Send + 'static,
    A: marker::Send + 'static,
{
    Expr::perform(Catch::<E> {
        body: Some(Box::new(move || body.into_raw())),
        handler: Some(Box::new(move |err| handler(err).into_raw())),
    })
}

/// Composed handler: session operations wait past [`WouldBlock`] under
/// backoff, error operations run eagerly, a flagged context aborts with
/// `Left`.
struct SessionErrorHandler<'ep, E, R> {
    ep: &'ep Endpoint,
    bo: Backoff,
    err_ctx: ErrorContext<E>,
    _result: PhantomData<fn() -> R>,
}

impl<E, R> Handler for SessionErrorHandler<'_, E, R>
where
    E: marker::Send + 'static,
    R: marker::Send + 'static,
{
    fn dispatch(&mut self, op: &mut dyn Operation) -> Handled {
        if let Some(sop) = op.as_session_mut() {
            return Handled::Resume(dispatch_wait(self.ep, sop, &mut self.bo));
        }
        let resumed = if let Some(throw) = op.as_any_mut().downcast_mut::<Throw<E>>() {
            throw.dispatch_error(&mut self.err_ctx)
        } else if let Some(catch) = op.as_any_mut().downcast_mut::<Catch<E>>() {
            catch.dispatch_error(&mut self.err_ctx)
        } else {
            panic!("unhandled effect in session error handler")
        };
        if self.err_ctx.has_err {
            let err = self
                .err_ctx
                .err
                .take()
                .expect("error context flagged without value");
            return Handled::Abort(Box::new(Either::<E, R>::Left(err)));
        }
        Handled::Resume(resumed)
    }
}

/// Runs a closure-form protocol with error handling on `ep`.
pub fn exec_error<E, R>(ep: &Endpoint, protocol: Eff<R>) -> Either<E, R>
where
    E: marker::Send + 'static,
    R: marker::Send + 'static,
{
    exec_error_expr(ep, reify(protocol))
}

/// Runs a defunctionalized protocol with error handling on `ep`.
pub fn exec_error_expr<E, R>(ep: &Endpoint, protocol: Expr<R>) -> Either<E, R>
where
    E: marker::Send + 'static,
    R: marker::Send + 'static,
{
    let wrapped = protocol.map(Either::<E, R>::Right);
    let mut handler = SessionErrorHandler::<E, R> {
        ep,
        bo: Backoff::new(),
        err_ctx: ErrorContext::new(),
        _result: PhantomData,
    };
    *eval_raw(wrapped.into_raw(), &mut handler)
        .downcast::<Either<E, R>>()
        .expect("protocol result type mismatch")
}

/// Creates a pair and interleaves both closure-form duals with error
/// handling.
pub fn run_error<E, A, B>(a: Eff<A>, b: Eff<B>) -> (Either<E, A>, Either<E, B>)
where
    E: marker::Send + 'static,
    A: marker::Send + 'static,
    B: marker::Send + 'static,
{
    run_error_expr(reify(a), reify(b))
}

/// Creates a pair and interleaves both defunctionalized duals with error
/// handling.
pub fn run_error_expr<E, A, B>(a: Expr<A>, b: Expr<B>) -> (Either<E, A>, Either<E, B>)
where
    E: marker::Send + 'static,
    A: marker::Send + 'static,
    B: marker::Send + 'static,
{
    let (ep_a, ep_b) = new_pair();
    let mut side_a = step_error::<E, A>(a);
    let mut side_b = step_error::<E, B>(b);
    let mut bo = Backoff::new();
    loop {
        let mut progress = false;
        side_a = poll_side_error(&ep_a, side_a, &mut progress);
        side_b = poll_side_error(&ep_b, side_b, &mut progress);
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

fn poll_side_error<E, R>(
    ep: &Endpoint,
    side: Stepped<Either<E, R>>,
    progress: &mut bool,
) -> Stepped<Either<E, R>>
where
    E: marker::Send + 'static,
    R: marker::Send + 'static,
{
    match side {
        done @ Stepped::Done(_) => done,
        Stepped::Next(susp) => match advance_error::<E, R>(ep, susp) {
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

/// [`step()`](crate::step()) with error support: evaluates until the first
/// suspension, wrapping completion in `Either`.
pub fn step_error<E, R>(protocol: Expr<R>) -> Stepped<Either<E, R>>
where
    E: marker::Send + 'static,
    R: marker::Send + 'static,
{
    crate::step::step(protocol.map(Either::<E, R>::Right))
}

/// [`advance`](crate::advance) with error support. Session operations stay
/// non-blocking; error operations run inline without endpoint involvement —
/// an uncaught throw discards the suspension and finishes with `Left`.
pub fn advance_error<E, R>(
    ep: &Endpoint,
    mut susp: Suspension<Either<E, R>>,
) -> Advanced<Either<E, R>>
where
    E: marker::Send + 'static,
    R: marker::Send + 'static,
{
    if let Some(result) = susp
        .op_mut()
        .as_session_mut()
        .map(|sop| sop.dispatch_session(ep))
    {
        return match result {
            Ok(value) => match susp.resume(value) {
                Stepped::Done(result) => Advanced::Done(result),
                Stepped::Next(next) => Advanced::Next(next),
            },
            Err(WouldBlock) => Advanced::Blocked(susp),
        };
    }

    let mut ctx = ErrorContext::<E>::new();
    let resumed = {
        let op = susp.op_mut();
        if let Some(throw) = op.as_any_mut().downcast_mut::<Throw<E>>() {
            throw.dispatch_error(&mut ctx)
        } else if let Some(catch) = op.as_any_mut().downcast_mut::<Catch<E>>() {
            catch.dispatch_error(&mut ctx)
        } else {
            panic!("unhandled effect in advance_error")
        }
    };
    if ctx.has_err {
        susp.discard();
        let err = ctx.err.take().expect("error context flagged without value");
        return Advanced::Done(Either::Left(err));
    }
    match susp.resume(resumed) {
        Stepped::Done(result) => Advanced::Done(result),
        Stepped::Next(next) => Advanced::Next(next),
    }
}
