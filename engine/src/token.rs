//! Waitlist ordering-token mint.

use chrono::{DateTime, Utc};
use guestlist_core::types::OrderingToken;
use std::sync::atomic::{AtomicU64, Ordering};

/// Issues strictly increasing [`OrderingToken`]s.
///
/// Tokens are anchored to the wall clock (microseconds since the epoch) so
/// order is meaningful across processes, but each mint guarantees strict
/// increase for the life of the process even if the clock stalls or steps
/// backwards: the next token is `max(now_micros, last + 1)`.
#[derive(Debug, Default)]
pub struct TokenMint {
    last: AtomicU64,
}

impl TokenMint {
    /// Create a mint that has issued no tokens yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Mint the next token, strictly greater than every token this mint has
    /// issued before.
    pub fn next(&self, now: DateTime<Utc>) -> OrderingToken {
        let stamp = u64::try_from(now.timestamp_micros()).unwrap_or(0);
        let mut last = self.last.load(Ordering::Acquire);
        loop {
            let candidate = stamp.max(last + 1);
            match self.last.compare_exchange_weak(
                last,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return OrderingToken::new(candidate),
                Err(observed) => last = observed,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn tokens_strictly_increase_for_a_fixed_clock() {
        let mint = TokenMint::new();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        let mut previous = mint.next(now);
        for _ in 0..100 {
            let token = mint.next(now);
            assert!(token > previous);
            previous = token;
        }
    }

    #[test]
    fn clock_regression_does_not_reorder_tokens() {
        let mint = TokenMint::new();
        let later = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 10).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        let first = mint.next(later);
        let second = mint.next(earlier);
        assert!(second > first);
    }

    #[test]
    fn tokens_advance_with_the_clock() {
        let mint = TokenMint::new();
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::seconds(1);

        let first = mint.next(t0);
        let second = mint.next(t1);
        assert!(second.value() >= first.value() + 999_999);
    }
}
