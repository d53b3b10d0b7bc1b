//! Bounded monotonic counters for channel, message and answer numbers,
//! and the wrapping byte-sequence position of a channel direction.

use crate::protocol::{MAX_NUMBER, SEQNO_MODULUS};

/// Arithmetic sequence `start, start + step, ...` that wraps back to
/// `start` once the next value would exceed `bound`.
#[derive(Debug, Clone)]
pub struct Counter {
    start: u32,
    bound: u32,
    step: u32,
    next: u32,
}

impl Counter {
    /// Create a counter over `start..=bound` advancing by `step`.
    pub fn new(start: u32, bound: u32, step: u32) -> Self {
        debug_assert!(start <= bound, "counter start beyond bound");
        debug_assert!(step > 0, "counter step must be positive");
        Self {
            start,
            bound,
            step,
            next: start,
        }
    }

    /// Message and answer numbers: `0, 1, 2, ...` up to `MAX_NUMBER`.
    pub fn message_numbers() -> Self {
        Self::new(0, MAX_NUMBER, 1)
    }

    /// Return the next value and advance.
    ///
    /// # Example
    ///
    /// ```
    /// use beepwire::channel::Counter;
    ///
    /// let mut numbers = Counter::new(1, 5, 2);
    /// assert_eq!(numbers.next_value(), 1);
    /// assert_eq!(numbers.next_value(), 3);
    /// assert_eq!(numbers.next_value(), 5);
    /// assert_eq!(numbers.next_value(), 1);
    /// ```
    pub fn next_value(&mut self) -> u32 {
        let value = self.next;
        self.next = match value.checked_add(self.step) {
            Some(next) if next <= self.bound => next,
            _ => self.start,
        };
        value
    }

    /// The value the next call to `next_value` returns.
    pub fn peek(&self) -> u32 {
        self.next
    }
}

/// Running payload-byte offset of one channel direction, modulo 2^32.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    /// Current position.
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Move past `len` payload bytes.
    #[inline]
    pub fn advance(&mut self, len: usize) {
        self.0 = (self.0 + len as u64) % SEQNO_MODULUS;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_numbers_start_at_zero() {
        let mut numbers = Counter::message_numbers();
        assert_eq!(numbers.next_value(), 0);
        assert_eq!(numbers.next_value(), 1);
        assert_eq!(numbers.peek(), 2);
    }

    #[test]
    fn test_wraps_at_bound() {
        let mut numbers = Counter::new(0, 2, 1);
        let values: Vec<u32> = (0..5).map(|_| numbers.next_value()).collect();
        assert_eq!(values, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn test_odd_and_even_sequences_never_collide() {
        let mut odd = Counter::new(1, MAX_NUMBER, 2);
        let mut even = Counter::new(2, MAX_NUMBER, 2);
        for _ in 0..100 {
            assert_eq!(odd.next_value() % 2, 1);
            assert_eq!(even.next_value() % 2, 0);
        }
    }

    #[test]
    fn test_wrap_without_overflow_near_u32_max() {
        let mut numbers = Counter::new(u32::MAX - 1, u32::MAX, 2);
        assert_eq!(numbers.next_value(), u32::MAX - 1);
        assert_eq!(numbers.next_value(), u32::MAX - 1);
    }

    #[test]
    fn test_sequence_number_wraps() {
        let mut seqno = SequenceNumber::default();
        seqno.advance(8);
        assert_eq!(seqno.value(), 8);

        let mut seqno = SequenceNumber(SEQNO_MODULUS - 3);
        seqno.advance(5);
        assert_eq!(seqno.value(), 2);
    }
}
