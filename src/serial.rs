//! Monotonic session identifiers.

use std::sync::atomic::{AtomicU32, Ordering};

/// Monotonically increasing session identifier. Each call to
/// [`new_pair`](crate::endpoint::new_pair) assigns the next value; both
/// endpoints of a pair share it. Serials are never reused within a process.
pub type Serial = u32;

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// Returns the next monotonically increasing serial.
pub(crate) fn next_serial() -> Serial {
    // Only monotonicity is observed, so a relaxed add suffices.
    COUNTER.fetch_add(1, Ordering::Relaxed) + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_monotonic() {
        let a = next_serial();
        let b = next_serial();
        let c = next_serial();
        assert!(a < b, "serials not increasing: {a} >= {b}");
        assert!(b < c, "serials not increasing: {b} >= {c}");
    }
}
