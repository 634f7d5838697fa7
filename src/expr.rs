//! Defunctionalized protocol representation and its evaluation loop.
//!
//! An [`Expr`] is a pair of the current (type-erased) value and a chain of
//! frames encoding the remaining work. Evaluation peels frames off the chain
//! iteratively, so protocol depth never translates into call-stack depth:
//!
//! - `Then` discards the current value and splices a prepared sub-expression
//!   in front of the rest of the chain.
//! - `Unwind` re-enters a stored callback with the current value; the
//!   callback returns a fresh value/chain pair (this is how stateful binds
//!   and the recursive combinator resume without growing the stack).
//! - `Effect` suspends the loop and surfaces an operation to whichever
//!   handler is driving it.
//!
//! Frame nodes are drawn from a thread-local pool and returned to it at the
//! moment the loop consumes them, which is what makes steady-state
//! evaluation allocation-amortized.

use std::any::Any;
use std::cell::RefCell;
use std::marker;
use std::marker::PhantomData;
use std::mem;

use crate::op::Operation;

/// Type-erased value travelling through frames and data queues.
pub type Erased = Box<dyn Any + marker::Send>;

/// Callback stored in an `Unwind` frame. Receives the frame's data slots and
/// the current value; returns the next value/chain pair.
pub(crate) type UnwindFn = fn(Option<Erased>, Option<Erased>, Erased) -> (Erased, Frame);

/// Transformation applied to a dispatched value before evaluation resumes.
pub(crate) type ResumeFn = fn(Erased) -> Erased;

pub(crate) fn identity_resume(v: Erased) -> Erased {
    v
}

pub(crate) fn unit() -> Erased {
    Box::new(())
}

/// A chain of frames; `None` is the empty (`Return`) chain.
pub(crate) struct Frame(Option<Box<FrameNode>>);

pub(crate) enum FrameNode {
    /// Discard the current value, continue with `value`/`body`, then `next`.
    Then {
        value: Erased,
        body: Frame,
        next: Frame,
    },
    /// Feed the current value into `unwind`, splice the returned chain in
    /// front of `next`.
    Unwind {
        data1: Option<Erased>,
        data2: Option<Erased>,
        unwind: UnwindFn,
        next: Frame,
    },
    /// Suspend and surface `op`; on resume, apply `resume` and continue with
    /// `next`.
    Effect {
        op: Box<dyn Operation>,
        resume: ResumeFn,
        next: Frame,
    },
    /// Pooled placeholder; never part of a live chain.
    Vacant,
}

impl FrameNode {
    fn next_mut(&mut self) -> &mut Frame {
        match self {
            FrameNode::Then { next, .. }
            | FrameNode::Unwind { next, .. }
            | FrameNode::Effect { next, .. } => next,
            FrameNode::Vacant => unreachable!("vacant frame node in live chain"),
        }
    }
}

const POOL_CAP: usize = 256;

thread_local! {
    static POOL: RefCell<Vec<Box<FrameNode>>> = const { RefCell::new(Vec::new()) };
}

/// Boxes `node`, reusing a pooled allocation when one is available.
pub(crate) fn acquire(node: FrameNode) -> Box<FrameNode> {
    POOL.with(|pool| match pool.borrow_mut().pop() {
        Some(mut boxed) => {
            *boxed = node;
            boxed
        }
        None => Box::new(node),
    })
}

fn recycle(mut boxed: Box<FrameNode>) {
    *boxed = FrameNode::Vacant;
    POOL.with(|pool| {
        let mut pool = pool.borrow_mut();
        if pool.len() < POOL_CAP {
            pool.push(boxed);
        }
    });
}

impl Frame {
    /// The empty chain.
    pub(crate) fn ret() -> Frame {
        Frame(None)
    }

    pub(crate) fn node(node: Box<FrameNode>) -> Frame {
        Frame(Some(node))
    }

    pub(crate) fn is_ret(&self) -> bool {
        self.0.is_none()
    }

    /// Pops the head node, recycling its allocation into the pool.
    fn take_node(&mut self) -> Option<FrameNode> {
        self.0.take().map(|mut boxed| {
            let node = mem::replace(&mut *boxed, FrameNode::Vacant);
            recycle(boxed);
            node
        })
    }
}

/// Splices `tail` after the last node of `head`. O(len(head)), O(1) when
/// `tail` is empty — which is the common fused-constructor case.
pub(crate) fn concat(mut head: Frame, tail: Frame) -> Frame {
    if tail.0.is_none() {
        return head;
    }
    if head.0.is_none() {
        return tail;
    }
    let mut cursor = &mut head.0;
    while let Some(node) = cursor {
        cursor = &mut node.next_mut().0;
    }
    *cursor = tail.0;
    head
}

/// Untyped expression: the representation shared by every `Expr<A>`.
pub(crate) struct RawExpr {
    pub(crate) value: Erased,
    pub(crate) frame: Frame,
}

impl RawExpr {
    pub(crate) fn ret(value: Erased) -> RawExpr {
        RawExpr {
            value,
            frame: Frame::ret(),
        }
    }
}

/// Result of driving a chain to its next boundary.
pub(crate) enum StepState {
    Done(Erased),
    Suspended(SuspensionRaw),
}

pub(crate) struct SuspensionRaw {
    pub(crate) op: Box<dyn Operation>,
    pub(crate) resume: ResumeFn,
    pub(crate) next: Frame,
}

impl SuspensionRaw {
    pub(crate) fn resume(self, value: Erased) -> StepState {
        run_frames((self.resume)(value), self.next)
    }
}

/// The evaluation loop: peels frames until the chain is exhausted or an
/// `Effect` frame suspends it. Iterative, constant stack.
pub(crate) fn run_frames(mut value: Erased, mut frame: Frame) -> StepState {
    loop {
        match frame.take_node() {
            None => return StepState::Done(value),
            Some(FrameNode::Then {
                value: second,
                body,
                next,
            }) => {
                value = second;
                frame = concat(body, next);
            }
            Some(FrameNode::Unwind {
                data1,
                data2,
                unwind,
                next,
            }) => {
                let (v, f) = unwind(data1, data2, value);
                value = v;
                frame = concat(f, next);
            }
            Some(FrameNode::Effect { op, resume, next }) => {
                return StepState::Suspended(SuspensionRaw { op, resume, next });
            }
            Some(FrameNode::Vacant) => unreachable!("vacant frame node in live chain"),
        }
    }
}

/// How a handler answered a surfaced operation.
pub(crate) enum Handled {
    /// Resume evaluation with the dispatched value.
    Resume(Erased),
    /// Drop the remaining chain and finish with this value.
    Abort(Erased),
}

/// Effect interpreter driving [`run_frames`] to completion.
pub(crate) trait Handler {
    fn dispatch(&mut self, op: &mut dyn Operation) -> Handled;
}

pub(crate) fn eval_raw(raw: RawExpr, handler: &mut dyn Handler) -> Erased {
    let mut state = run_frames(raw.value, raw.frame);
    loop {
        match state {
            StepState::Done(v) => return v,
            StepState::Suspended(mut susp) => match handler.dispatch(&mut *susp.op) {
                Handled::Resume(v) => state = susp.resume(v),
                Handled::Abort(v) => return v,
            },
        }
    }
}

/// Defunctionalized session protocol producing a value of type `A`.
///
/// Built by the `expr_*` fused constructors (or [`reify`](crate::reify) from
/// the closure form) and consumed exactly once by an evaluator. The type
/// parameter is phantom: values travel erased through the frame chain and are
/// only re-typed at the boundaries.
#[must_use]
pub struct Expr<A> {
    raw: RawExpr,
    _returns: PhantomData<fn() -> A>,
}

impl<A: marker::Send + 'static> Expr<A> {
    /// Completed expression holding a plain value.
    pub fn pure(value: A) -> Expr<A> {
        Expr::from_raw(RawExpr::ret(Box::new(value)))
    }

    /// Expression that performs `op` and finishes with its dispatched value,
    /// asserted to be of type `A`.
    pub fn perform(op: impl Operation) -> Expr<A> {
        let effect = acquire(FrameNode::Effect {
            op: Box::new(op),
            resume: identity_resume,
            next: Frame::ret(),
        });
        Expr::from_raw(RawExpr {
            value: unit(),
            frame: Frame::node(effect),
        })
    }

    /// Sequences `f` after this expression, feeding it the produced value.
    pub fn bind<B: marker::Send + 'static>(
        self,
        f: impl FnOnce(A) -> Expr<B> + marker::Send + 'static,
    ) -> Expr<B> {
        let raw = self.raw;
        if raw.frame.is_ret() {
            let a = *raw.value.downcast::<A>().expect("bound value type mismatch");
            return f(a);
        }
        let f: Box<dyn FnOnce(A) -> RawExpr + marker::Send> = Box::new(move |a| f(a).into_raw());
        let unwind = acquire(FrameNode::Unwind {
            data1: Some(Box::new(f)),
            data2: None,
            unwind: bind_unwind::<A>,
            next: Frame::ret(),
        });
        Expr::from_raw(RawExpr {
            value: raw.value,
            frame: concat(raw.frame, Frame::node(unwind)),
        })
    }

    /// Sequences `second` after this expression, discarding this value.
    pub fn then<B: marker::Send + 'static>(self, second: Expr<B>) -> Expr<B> {
        let raw = self.raw;
        if raw.frame.is_ret() {
            return second;
        }
        let second = second.into_raw();
        let then = acquire(FrameNode::Then {
            value: second.value,
            body: second.frame,
            next: Frame::ret(),
        });
        Expr::from_raw(RawExpr {
            value: raw.value,
            frame: concat(raw.frame, Frame::node(then)),
        })
    }

    /// Applies `f` to the produced value.
    pub fn map<B: marker::Send + 'static>(
        self,
        f: impl FnOnce(A) -> B + marker::Send + 'static,
    ) -> Expr<B> {
        let raw = self.raw;
        if raw.frame.is_ret() {
            let a = *raw.value.downcast::<A>().expect("mapped value type mismatch");
            return Expr::pure(f(a));
        }
        let f: Box<dyn FnOnce(A) -> Erased + marker::Send> =
            Box::new(move |a| Box::new(f(a)) as Erased);
        let unwind = acquire(FrameNode::Unwind {
            data1: Some(Box::new(f)),
            data2: None,
            unwind: map_unwind::<A>,
            next: Frame::ret(),
        });
        Expr::from_raw(RawExpr {
            value: raw.value,
            frame: concat(raw.frame, Frame::node(unwind)),
        })
    }
}

impl<A> Expr<A> {
    pub(crate) fn from_raw(raw: RawExpr) -> Expr<A> {
        Expr {
            raw,
            _returns: PhantomData,
        }
    }

    pub(crate) fn into_raw(self) -> RawExpr {
        self.raw
    }
}

pub(crate) fn bind_unwind<A: marker::Send + 'static>(
    data1: Option<Erased>,
    _data2: Option<Erased>,
    current: Erased,
) -> (Erased, Frame) {
    let f = data1
        .expect("bind continuation missing")
        .downcast::<Box<dyn FnOnce(A) -> RawExpr + marker::Send>>()
        .expect("bind continuation type mismatch");
    let a = *current.downcast::<A>().expect("bound value type mismatch");
    let raw = f(a);
    (raw.value, raw.frame)
}

fn map_unwind<A: marker::Send + 'static>(
    data1: Option<Erased>,
    _data2: Option<Erased>,
    current: Erased,
) -> (Erased, Frame) {
    let f = data1
        .expect("map function missing")
        .downcast::<Box<dyn FnOnce(A) -> Erased + marker::Send>>()
        .expect("map function type mismatch");
    let a = *current.downcast::<A>().expect("mapped value type mismatch");
    (f(a), Frame::ret())
}

/// Result of [`step()`](crate::step()): either the protocol's final value or its
/// first suspension.
#[must_use]
pub enum Stepped<R> {
    /// The protocol completed without (further) effects.
    Done(R),
    /// The protocol is paused on the contained suspension.
    Next(Suspension<R>),
}

/// A paused protocol awaiting one dispatched value.
///
/// Affine by construction: [`resume`](Suspension::resume) and
/// [`discard`](Suspension::discard) take the suspension by value, so it can
/// be consumed at most once. A suspension returned unconsumed (the
/// would-block path of [`advance`](crate::advance)) may be retried after the
/// peer makes progress.
#[must_use]
pub struct Suspension<R> {
    raw: SuspensionRaw,
    _returns: PhantomData<fn() -> R>,
}

impl<R: marker::Send + 'static> Suspension<R> {
    /// The concrete pending operation, for protocol-aware scheduling.
    /// Downcast via [`Operation::as_any`] to inspect it.
    pub fn op(&self) -> &dyn Operation {
        &*self.raw.op
    }

    pub(crate) fn op_mut(&mut self) -> &mut dyn Operation {
        &mut *self.raw.op
    }

    /// Continues evaluation with the dispatched value.
    pub fn resume(self, value: Erased) -> Stepped<R> {
        finish_state(self.raw.resume(value))
    }

    /// Marks the suspension spent without resuming, dropping the rest of the
    /// protocol. Used by error short-circuiting.
    pub fn discard(self) {
        drop(self.raw);
    }
}

pub(crate) fn finish_state<R: marker::Send + 'static>(state: StepState) -> Stepped<R> {
    match state {
        StepState::Done(v) => Stepped::Done(
            *v.downcast::<R>()
                .expect("protocol result type mismatch"),
        ),
        StepState::Suspended(raw) => Stepped::Next(Suspension {
            raw,
            _returns: PhantomData,
        }),
    }
}

pub(crate) fn step_raw<R: marker::Send + 'static>(raw: RawExpr) -> Stepped<R> {
    finish_state(run_frames(raw.value, raw.frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::Close;

    #[test]
    fn pure_expression_completes() {
        match step_raw::<i32>(Expr::pure(7).into_raw()) {
            Stepped::Done(v) => assert_eq!(v, 7),
            Stepped::Next(_) => panic!("pure expression must not suspend"),
        }
    }

    #[test]
    fn bind_on_pure_is_eager() {
        let e = Expr::pure(3).bind(|n| Expr::pure(n * 2));
        match step_raw::<i32>(e.into_raw()) {
            Stepped::Done(v) => assert_eq!(v, 6),
            Stepped::Next(_) => panic!("no effects involved"),
        }
    }

    #[test]
    fn effect_surfaces_operation() {
        let e = Expr::<()>::perform(Close);
        match step_raw::<()>(e.into_raw()) {
            Stepped::Done(_) => panic!("expected suspension for the effect"),
            Stepped::Next(susp) => {
                assert!(susp.op().as_any().downcast_ref::<Close>().is_some());
                match susp.resume(unit()) {
                    Stepped::Done(()) => {}
                    Stepped::Next(_) => panic!("single-effect chain"),
                }
            }
        }
    }

    #[test]
    fn map_applies_after_effect() {
        let e = Expr::<()>::perform(Close).map(|()| "mapped");
        match step_raw::<&'static str>(e.into_raw()) {
            Stepped::Done(_) => panic!("expected suspension"),
            Stepped::Next(susp) => match susp.resume(unit()) {
                Stepped::Done(s) => assert_eq!(s, "mapped"),
                Stepped::Next(_) => panic!("single-effect chain"),
            },
        }
    }

    #[test]
    fn pool_recycles_consumed_nodes() {
        // Drain whatever is pooled, then check an evaluation round leaves
        // nodes behind for the next acquisition.
        POOL.with(|pool| pool.borrow_mut().clear());
        let e = Expr::pure(()).then(Expr::<()>::perform(Close)).then(Expr::pure(1i64));
        match step_raw::<i64>(e.into_raw()) {
            Stepped::Done(_) => panic!("expected suspension"),
            Stepped::Next(susp) => match susp.resume(unit()) {
                Stepped::Done(v) => assert_eq!(v, 1),
                Stepped::Next(_) => panic!("single-effect chain"),
            },
        }
        let pooled = POOL.with(|pool| pool.borrow().len());
        assert!(pooled > 0, "consumed frames must return to the pool");
    }
}
