//! Bounded lock-free single-producer/single-consumer rings.
//!
//! Each session direction is backed by one [`Spsc`]. The ring never blocks:
//! a full ring rejects the push and an empty ring reports [`WouldBlock`],
//! leaving all waiting policy to the callers (adaptive backoff in the
//! blocking evaluators, retryable suspensions in the stepping API).
//!
//! Publication follows the usual release/acquire discipline: the producer
//! writes the slot, then stores the head with release; the consumer reads the
//! head with acquire before touching the slot, and symmetrically for the
//! tail. Each ring has exactly one producer endpoint and one consumer
//! endpoint by construction, which is what makes the unsynchronized slot
//! accesses sound.

#[cfg(feature = "loom")]
use loom::sync::atomic::{AtomicU32, Ordering};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
#[cfg(not(feature = "loom"))]
use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

/// Control signal reported when a bounded queue cannot make progress.
///
/// Not a failure: the operation may be retried after the peer produces or
/// consumes. Blocking evaluators absorb it via [`Backoff`](crate::Backoff);
/// the stepping API surfaces it with the suspension left unconsumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("transport not ready")]
pub struct WouldBlock;

/// Bounded SPSC ring with power-of-two capacity.
pub struct Spsc<T> {
    head: AtomicU32,
    tail: AtomicU32,
    mask: u32,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// SAFETY: The ring owns its slots; values cross threads only through push/pop
// whose release/acquire pairs order the slot writes. The single-producer,
// single-consumer discipline (one endpoint per side, endpoints are !Sync)
// guarantees no slot is accessed concurrently from both ends.
unsafe impl<T: Send> Send for Spsc<T> {}
unsafe impl<T: Send> Sync for Spsc<T> {}

impl<T> Spsc<T> {
    /// Creates a ring holding up to `capacity` elements.
    ///
    /// `capacity` must be a power of two and at least 2.
    pub fn with_capacity(capacity: u32) -> Self {
        assert!(
            capacity.is_power_of_two() && capacity >= 2,
            "ring capacity {capacity} must be a power of two >= 2"
        );
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            head: AtomicU32::new(0),
            tail: AtomicU32::new(0),
            mask: capacity - 1,
            slots,
        }
    }

    /// Maximum number of elements the ring can hold.
    pub fn capacity(&self) -> u32 {
        self.mask + 1
    }

    /// Enqueues `value` without blocking.
    ///
    /// Returns the value back when the ring is full so the caller can retry
    /// the same element after the consumer drains. Must only be called from
    /// the producing side.
    pub fn push(&self, value: T) -> Result<(), T> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head.wrapping_sub(tail) > self.mask {
            return Err(value);
        }
        let slot = &self.slots[(head & self.mask) as usize];
        // SAFETY: `head` has not been published yet, so the consumer will not
        // read this slot before the release store below; the single producer
        // means nobody else writes it.
        unsafe { (*slot.get()).write(value) };
        self.head.store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Dequeues the oldest element without blocking.
    ///
    /// Reports [`WouldBlock`] when the ring is empty. Must only be called
    /// from the consuming side.
    pub fn pop(&self) -> Result<T, WouldBlock> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail == head {
            return Err(WouldBlock);
        }
        let slot = &self.slots[(tail & self.mask) as usize];
        // SAFETY: The acquire load of `head` ordered this slot's write before
        // us; publishing the new tail below is what allows the producer to
        // reuse it, so the read happens while we exclusively own the slot.
        let value = unsafe { (*slot.get()).assume_init_read() };
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(value)
    }
}

impl<T> Drop for Spsc<T> {
    fn drop(&mut self) {
        while self.pop().is_ok() {}
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use rand::prelude::*;
    use std::collections::VecDeque;

    #[test]
    fn fifo_order() {
        let ring = Spsc::with_capacity(4);
        for n in 0..4 {
            ring.push(n).expect("ring has room");
        }
        for n in 0..4 {
            assert_eq!(ring.pop(), Ok(n));
        }
        assert_eq!(ring.pop(), Err(WouldBlock));
    }

    #[test]
    fn full_ring_rejects_push() {
        let ring = Spsc::with_capacity(2);
        ring.push(1).expect("ring has room");
        ring.push(2).expect("ring has room");
        assert_eq!(ring.push(3), Err(3));
        assert_eq!(ring.pop(), Ok(1));
        ring.push(3).expect("slot freed by pop");
    }

    #[test]
    fn empty_ring_would_block() {
        let ring = Spsc::<u8>::with_capacity(4);
        assert_eq!(ring.pop(), Err(WouldBlock));
    }

    #[test]
    fn wraparound_preserves_order() {
        let ring = Spsc::with_capacity(2);
        for round in 0u32..100 {
            ring.push(round).expect("ring has room");
            assert_eq!(ring.pop(), Ok(round));
        }
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn rejects_non_power_of_two_capacity() {
        let _ = Spsc::<u8>::with_capacity(3);
    }

    /// Randomised stress covering wrap-around, FIFO order, and retention.
    #[test]
    fn interleaved_stress() {
        let ring = Spsc::with_capacity(8);
        let mut rng = StdRng::seed_from_u64(0xD0E7);
        let mut expected = VecDeque::new();
        let mut next = 0u64;

        for _ in 0..10_000 {
            if rng.gen_bool(0.5) {
                match ring.push(next) {
                    Ok(()) => {
                        expected.push_back(next);
                        next += 1;
                    }
                    Err(back) => assert_eq!(back, next),
                }
            } else {
                match ring.pop() {
                    Ok(v) => assert_eq!(Some(v), expected.pop_front()),
                    Err(WouldBlock) => assert!(expected.is_empty()),
                }
            }
        }
        while let Ok(v) = ring.pop() {
            assert_eq!(Some(v), expected.pop_front());
        }
        assert!(expected.is_empty());
    }

    #[test]
    fn drop_releases_pending_elements() {
        let ring = Spsc::with_capacity(4);
        ring.push(String::from("left behind")).expect("ring has room");
        drop(ring);
    }
}

#[cfg(all(test, feature = "loom"))]
mod loom_tests {
    use super::*;
    use loom::sync::Arc;
    use loom::thread;

    /// Loom: values survive every producer/consumer interleaving in order.
    #[test]
    #[ignore]
    fn slow_loom_spsc_round_trip() {
        loom::model(|| {
            let ring = Arc::new(Spsc::with_capacity(2));
            let producer = ring.clone();
            let consumer = ring.clone();

            let producer_thread = thread::spawn(move || {
                for n in 0u32..3 {
                    loop {
                        if producer.push(n).is_ok() {
                            break;
                        }
                        thread::yield_now();
                    }
                }
            });

            let consumer_thread = thread::spawn(move || {
                for expected in 0u32..3 {
                    let got = loop {
                        match consumer.pop() {
                            Ok(v) => break v,
                            Err(WouldBlock) => thread::yield_now(),
                        }
                    };
                    assert_eq!(got, expected);
                }
            });

            producer_thread.join().unwrap();
            consumer_thread.join().unwrap();
        });
    }
}
