//! Adaptive waiting for the not-ready transport boundary.
//!
//! The blocking evaluators never park on a lock or a channel; whenever a
//! dispatch reports [`WouldBlock`](crate::WouldBlock) they climb this ladder
//! instead: busy-spin first, yield the scheduler next, then sleep in
//! increasing (bounded) intervals. [`Backoff::reset`] drops back to the first
//! rung after any successful dispatch.

use std::hint;
use std::thread;
use std::time::Duration;

const SPIN_LIMIT: u32 = 6;
const YIELD_LIMIT: u32 = 12;
const SLEEP_LIMIT: u32 = 20;
const BASE_SLEEP_MICROS: u64 = 50;

/// Adaptive spin → yield → sleep waiting primitive.
///
/// Zero-initialized via [`Backoff::new`] (or `Default`); one value per
/// waiting loop, shared across iterations so the ladder can escalate.
#[derive(Debug, Default)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    /// A backoff resting on the first rung.
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks the calling thread progressively longer on each call.
    ///
    /// The sleep interval doubles per step and saturates at
    /// 2^(SLEEP_LIMIT - YIELD_LIMIT) × 50µs, so a stalled peer costs bounded
    /// latency once it wakes up.
    pub fn wait(&mut self) {
        if self.step < SPIN_LIMIT {
            for _ in 0..1 << self.step {
                hint::spin_loop();
            }
        } else if self.step < YIELD_LIMIT {
            thread::yield_now();
        } else {
            let exp = (self.step - YIELD_LIMIT).min(SLEEP_LIMIT - YIELD_LIMIT);
            thread::sleep(Duration::from_micros(BASE_SLEEP_MICROS << exp));
        }
        if self.step < SLEEP_LIMIT {
            self.step += 1;
        }
    }

    /// Returns to the first rung. Called after every successful dispatch.
    pub fn reset(&mut self) {
        self.step = 0;
    }
}
