//! Recursive session protocols.
//!
//! `rec(initial, step)` repeatedly invokes `step`: `Left(next)` feeds the
//! new state back in, `Right(done)` terminates with the enclosed result.
//!
//! Stack safety: the defunctionalized core ([`rec_expr`]) iterates pure
//! completed steps in a plain loop and, when a step suspends on an effect,
//! appends an `Unwind` frame that re-enters the same loop with the eventual
//! state — so recursion depth never reaches the call stack, no matter how
//! deep the pure prefixes between effects run. The closure form derives from
//! the defunctionalized one through the bridge and inherits the discipline.

use std::marker;

use crate::bridge::reify;
use crate::eff::Eff;
use crate::either::Either;
use crate::expr::{acquire, concat, Erased, Expr, Frame, FrameNode, RawExpr};

type BoxStep<S> = Box<dyn FnMut(S) -> RawExpr + marker::Send>;

/// Closure-form recursive protocol.
pub fn rec<S, A>(
    initial: S,
    mut step: impl FnMut(S) -> Eff<Either<S, A>> + marker::Send + 'static,
) -> Eff<A>
where
    S: marker::Send + 'static,
    A: marker::Send + 'static,
{
    Eff::from_fn(move || rec_expr(initial, move |s| reify(step(s))))
}

/// Defunctionalized recursive protocol.
pub fn rec_expr<S, A>(
    initial: S,
    mut step: impl FnMut(S) -> Expr<Either<S, A>> + marker::Send + 'static,
) -> Expr<A>
where
    S: marker::Send + 'static,
    A: marker::Send + 'static,
{
    let step: BoxStep<S> = Box::new(move |s| step(s).into_raw());
    let (value, frame) = rec_iter::<S, A>(initial, step);
    Expr::from_raw(RawExpr { value, frame })
}

/// Iterative core shared by [`rec_expr`] and [`rec_unwind`]. Loops over pure
/// completed steps without stack growth; returns a frame chain when the step
/// suspends on an effect.
fn rec_iter<S, A>(mut s: S, mut step: BoxStep<S>) -> (Erased, Frame)
where
    S: marker::Send + 'static,
    A: marker::Send + 'static,
{
    loop {
        let RawExpr { value, frame } = step(s);
        if frame.is_ret() {
            match *value
                .downcast::<Either<S, A>>()
                .expect("recursion state type mismatch")
            {
                Either::Left(next) => s = next,
                Either::Right(done) => return (Box::new(done), Frame::ret()),
            }
        } else {
            let unwind = acquire(FrameNode::Unwind {
                data1: Some(Box::new(step)),
                data2: None,
                unwind: rec_unwind::<S, A>,
                next: Frame::ret(),
            });
            return (value, concat(frame, Frame::node(unwind)));
        }
    }
}

fn rec_unwind<S, A>(
    data1: Option<Erased>,
    _data2: Option<Erased>,
    current: Erased,
) -> (Erased, Frame)
where
    S: marker::Send + 'static,
    A: marker::Send + 'static,
{
    let step = *data1
        .expect("recursion step missing")
        .downcast::<BoxStep<S>>()
        .expect("recursion step type mismatch");
    match *current
        .downcast::<Either<S, A>>()
        .expect("recursion state type mismatch")
    {
        Either::Left(next) => rec_iter::<S, A>(next, step),
        Either::Right(done) => (Box::new(done), Frame::ret()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::run_pure;

    #[test]
    fn pure_recursion_runs_in_constant_stack() {
        let result = run_pure(rec_expr(0u32, |i| {
            if i >= 100_000 {
                Expr::pure(Either::Right(i))
            } else {
                Expr::pure(Either::Left(i + 1))
            }
        }));
        assert_eq!(result, 100_000);
    }

    #[test]
    fn immediate_termination() {
        let result = run_pure(rec_expr(0, |_: i32| Expr::pure(Either::<i32, &str>::Right("now"))));
        assert_eq!(result, "now");
    }
}
