//! Two-alternative result carrier used by [`Offer`](crate::Offer) and by
//! the error-composed evaluators.
//!
//! `Left`/`Right` carry no judgement on their own: [`Offer`](crate::Offer)
//! resumes with `Left` when the peer selected the left branch, and the
//! `_error` evaluators use `Right` for completion and `Left` for a propagated
//! throw.

/// Value of one of two alternatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Either<L, R> {
    Left(L),
    Right(R),
}

impl<L, R> Either<L, R> {
    /// Returns `true` for the `Left` alternative.
    pub fn is_left(&self) -> bool {
        matches!(self, Either::Left(_))
    }

    /// Returns `true` for the `Right` alternative.
    pub fn is_right(&self) -> bool {
        matches!(self, Either::Right(_))
    }

    /// Consumes the value, yielding the left alternative if present.
    pub fn left(self) -> Option<L> {
        match self {
            Either::Left(l) => Some(l),
            Either::Right(_) => None,
        }
    }

    /// Consumes the value, yielding the right alternative if present.
    pub fn right(self) -> Option<R> {
        match self {
            Either::Left(_) => None,
            Either::Right(r) => Some(r),
        }
    }
}
