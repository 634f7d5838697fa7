//! The session alphabet: six operations and their non-blocking dispatch.
//!
//! Every operation implements [`Operation`]; session operations additionally
//! expose [`SessionDispatch`] through the `as_session_mut` capability probe,
//! which is how evaluators recognize them without walking introspection
//! chains. Dispatch is strictly non-blocking: the only expected error is
//! [`WouldBlock`], reported when the bounded transport cannot make progress.

use std::any::Any;
use std::marker;
use std::marker::PhantomData;

use crate::either::Either;
use crate::endpoint::Endpoint;
use crate::expr::Erased;
use crate::transport::WouldBlock;

/// An effect operation surfaced by a suspended protocol.
///
/// `as_any`/`as_any_mut` give evaluators and schedulers access to the
/// concrete operation (e.g. to read a pending [`Send::value`]); the
/// capability probes classify it for dispatch.
pub trait Operation: marker::Send + 'static {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Session capability: `Some` for the six session operations.
    fn as_session_mut(&mut self) -> Option<&mut dyn SessionDispatch> {
        None
    }
}

/// Non-blocking interpretation of a session operation against an endpoint's
/// transport.
pub trait SessionDispatch {
    /// Applies the operation to `ep`'s queues. Returns the type-erased
    /// resume value on success, [`WouldBlock`] when the transport is not
    /// ready; the operation is left retryable in that case.
    fn dispatch_session(&mut self, ep: &Endpoint) -> Result<Erased, WouldBlock>;
}

/// Sends a value of type `T` to the peer endpoint. Resumes with `()`.
///
/// `T` may itself be an [`Endpoint`], which delegates that session side to
/// the peer; the sender must not reuse a delegated endpoint (moving it into
/// the operation already guarantees as much).
pub struct Send<T> {
    value: Option<T>,
}

impl<T: marker::Send + 'static> Send<T> {
    pub fn new(value: T) -> Self {
        Self { value: Some(value) }
    }

    /// The payload still waiting to be enqueued, if any.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }
}

impl<T: marker::Send + 'static> Operation for Send<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn as_session_mut(&mut self) -> Option<&mut dyn SessionDispatch> {
        Some(self)
    }
}

impl<T: marker::Send + 'static> SessionDispatch for Send<T> {
    fn dispatch_session(&mut self, ep: &Endpoint) -> Result<Erased, WouldBlock> {
        let value = self.value.take().expect("send value already consumed");
        match ep.send_queue().push(Box::new(value)) {
            Ok(()) => Ok(Box::new(())),
            Err(back) => {
                // Ring full: keep the payload for the retry.
                self.value = Some(*back.downcast::<T>().expect("send payload round-trip"));
                Err(WouldBlock)
            }
        }
    }
}

/// Receives a value of type `T` from the peer endpoint. Resumes with the
/// value; a payload of any other type is a protocol bug and panics.
pub struct Recv<T> {
    _receives: PhantomData<fn() -> T>,
}

impl<T: marker::Send + 'static> Recv<T> {
    pub fn new() -> Self {
        Self {
            _receives: PhantomData,
        }
    }
}

impl<T: marker::Send + 'static> Default for Recv<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: marker::Send + 'static> Operation for Recv<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn as_session_mut(&mut self) -> Option<&mut dyn SessionDispatch> {
        Some(self)
    }
}

impl<T: marker::Send + 'static> SessionDispatch for Recv<T> {
    fn dispatch_session(&mut self, ep: &Endpoint) -> Result<Erased, WouldBlock> {
        let value = ep.recv_queue().pop()?;
        let value: Erased = value.downcast::<T>().expect("typed receive mismatch");
        Ok(value)
    }
}

/// Signals session termination by bumping the shared close counter.
/// Never blocks. Resumes with `()`.
pub struct Close;

impl Operation for Close {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn as_session_mut(&mut self) -> Option<&mut dyn SessionDispatch> {
        Some(self)
    }
}

impl SessionDispatch for Close {
    fn dispatch_session(&mut self, ep: &Endpoint) -> Result<Erased, WouldBlock> {
        ep.close_bump();
        Ok(Box::new(()))
    }
}

/// Chooses the left branch, signalling it to the peer. Resumes with `()`.
pub struct SelectL;

impl Operation for SelectL {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn as_session_mut(&mut self) -> Option<&mut dyn SessionDispatch> {
        Some(self)
    }
}

impl SessionDispatch for SelectL {
    fn dispatch_session(&mut self, ep: &Endpoint) -> Result<Erased, WouldBlock> {
        match ep.signal_queue().push(true) {
            Ok(()) => Ok(Box::new(())),
            Err(_) => Err(WouldBlock),
        }
    }
}

/// Chooses the right branch, signalling it to the peer. Resumes with `()`.
pub struct SelectR;

impl Operation for SelectR {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn as_session_mut(&mut self) -> Option<&mut dyn SessionDispatch> {
        Some(self)
    }
}

impl SessionDispatch for SelectR {
    fn dispatch_session(&mut self, ep: &Endpoint) -> Result<Erased, WouldBlock> {
        match ep.signal_queue().push(false) {
            Ok(()) => Ok(Box::new(())),
            Err(_) => Err(WouldBlock),
        }
    }
}

/// Awaits the peer's branch choice. Resumes with
/// `Either<(), ()>` — `Left` when the peer selected left.
pub struct Offer;

impl Operation for Offer {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn as_session_mut(&mut self) -> Option<&mut dyn SessionDispatch> {
        Some(self)
    }
}

impl SessionDispatch for Offer {
    fn dispatch_session(&mut self, ep: &Endpoint) -> Result<Erased, WouldBlock> {
        let bit = ep.await_queue().pop()?;
        let choice: Either<(), ()> = if bit { Either::Left(()) } else { Either::Right(()) };
        Ok(Box::new(choice))
    }
}
