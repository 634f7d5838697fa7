//! Session endpoints over paired lock-free transport.
//!
//! A pair is one allocation holding four bounded SPSC rings (data and branch
//! choice, one per direction) plus the shared close counter. Endpoints are
//! side-tagged handles into that arena: A's send ring is B's receive ring and
//! vice versa, so neither endpoint ever owns a queue outright and no
//! back-references exist.
//!
//! An [`Endpoint`] can move between threads (and across a session, via
//! delegation) but is deliberately not `Sync`: each ring keeps exactly one
//! producer and one consumer at a time, which is the whole soundness story of
//! the transport.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

#[cfg(feature = "loom")]
use loom::sync::atomic::{AtomicU32, Ordering};
#[cfg(not(feature = "loom"))]
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::trace;

use crate::expr::Erased;
use crate::serial::{next_serial, Serial};
use crate::transport::Spsc;

/// Bounded capacity of every session transport ring.
///
/// Small on purpose: it bounds memory per session and keeps the would-block
/// boundary easy to reach in tests. It is not a correctness parameter.
pub const CHANNEL_CAPACITY: u32 = 4;

struct EndpointPair {
    serial: Serial,
    closed: AtomicU32,
    data_ab: Spsc<Erased>,
    data_ba: Spsc<Erased>,
    choice_ab: Spsc<bool>,
    choice_ba: Spsc<bool>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    A,
    B,
}

/// One side of a connected session pair.
///
/// Created only by [`new_pair`]; released when both sides drop their handle.
/// Endpoints can themselves travel through a session as a `Send`/`Recv`
/// payload (delegation), after which the sender must not touch the delegated
/// side again — moving the handle enforces exactly that.
pub struct Endpoint {
    pair: Arc<EndpointPair>,
    side: Side,
    // Send but not Sync: pins each endpoint to one driving thread at a time.
    _single_thread: PhantomData<Cell<u8>>,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("serial", &self.pair.serial)
            .field("side", &self.side)
            .finish()
    }
}

impl Endpoint {
    /// Serial number assigned to this endpoint's session.
    pub fn serial(&self) -> Serial {
        self.pair.serial
    }

    /// Times [`Close`](crate::Close) has been dispatched on either side.
    ///
    /// Observation hook only; never consulted for control flow. The counter
    /// is monotonic and at most 2 for a well-typed session.
    pub fn close_count(&self) -> u32 {
        self.pair.closed.load(Ordering::Relaxed)
    }

    pub(crate) fn send_queue(&self) -> &Spsc<Erased> {
        match self.side {
            Side::A => &self.pair.data_ab,
            Side::B => &self.pair.data_ba,
        }
    }

    pub(crate) fn recv_queue(&self) -> &Spsc<Erased> {
        match self.side {
            Side::A => &self.pair.data_ba,
            Side::B => &self.pair.data_ab,
        }
    }

    pub(crate) fn signal_queue(&self) -> &Spsc<bool> {
        match self.side {
            Side::A => &self.pair.choice_ab,
            Side::B => &self.pair.choice_ba,
        }
    }

    pub(crate) fn await_queue(&self) -> &Spsc<bool> {
        match self.side {
            Side::A => &self.pair.choice_ba,
            Side::B => &self.pair.choice_ab,
        }
    }

    pub(crate) fn close_bump(&self) {
        let seen = self.pair.closed.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(serial = self.pair.serial, close_count = seen, "session closed");
    }
}

/// Creates a connected pair of session endpoints.
///
/// Both endpoints share one freshly allocated [`Serial`]. Transport is four
/// bounded rings of [`CHANNEL_CAPACITY`]; all session operations against the
/// pair are non-blocking and report [`WouldBlock`](crate::WouldBlock) when
/// the peer has not yet produced or consumed.
pub fn new_pair() -> (Endpoint, Endpoint) {
    let serial = next_serial();
    let pair = Arc::new(EndpointPair {
        serial,
        closed: AtomicU32::new(0),
        data_ab: Spsc::with_capacity(CHANNEL_CAPACITY),
        data_ba: Spsc::with_capacity(CHANNEL_CAPACITY),
        choice_ab: Spsc::with_capacity(CHANNEL_CAPACITY),
        choice_ba: Spsc::with_capacity(CHANNEL_CAPACITY),
    });
    trace!(serial, "session pair created");
    let a = Endpoint {
        pair: pair.clone(),
        side: Side::A,
        _single_thread: PhantomData,
    };
    let b = Endpoint {
        pair,
        side: Side::B,
        _single_thread: PhantomData,
    };
    (a, b)
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;

    #[test]
    fn pair_shares_serial() {
        let (a, b) = new_pair();
        assert_eq!(a.serial(), b.serial());
    }

    #[test]
    fn serials_strictly_increase_across_pairs() {
        let (a1, _) = new_pair();
        let (a2, _) = new_pair();
        let (a3, _) = new_pair();
        assert!(a1.serial() < a2.serial());
        assert!(a2.serial() < a3.serial());
    }

    #[test]
    fn queues_are_cross_wired() {
        let (a, b) = new_pair();
        a.send_queue().push(Box::new(7i32)).ok().expect("ring has room");
        let v = b.recv_queue().pop().expect("peer pushed");
        assert_eq!(*v.downcast::<i32>().expect("i32 payload"), 7);

        b.signal_queue().push(true).expect("ring has room");
        assert_eq!(a.await_queue().pop(), Ok(true));
    }

    #[test]
    fn close_counter_is_monotonic() {
        let (a, b) = new_pair();
        assert_eq!(a.close_count(), 0);
        a.close_bump();
        b.close_bump();
        assert_eq!(a.close_count(), 2);
        assert_eq!(b.close_count(), 2);
    }
}
