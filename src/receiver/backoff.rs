use std::time::Duration;

/// Exponential backoff for sync reconnect attempts: base delay doubling
/// per attempt up to a cap, with a bounded attempt budget.
pub(crate) struct Backoff {
    base_ms: u64,
    cap_ms: u64,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    pub(crate) fn new(base_ms: u64, cap_ms: u64, max_attempts: u32) -> Self {
        Self {
            base_ms,
            cap_ms,
            max_attempts,
            attempt: 0,
        }
    }

    pub(crate) fn next(&mut self) -> Duration {
        self.attempt += 1;
        let factor = 2u64.saturating_pow(self.attempt - 1);
        Duration::from_millis(self.base_ms.saturating_mul(factor).min(self.cap_ms))
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempt
    }

    /// A successful connection resets the counter and the delay sequence.
    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_up_to_the_cap() {
        let mut backoff = Backoff::new(1_000, 10_000, 100);
        let delays: Vec<u64> = (0..6).map(|_| backoff.next().as_millis() as u64).collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 10_000, 10_000]);
    }

    #[test]
    fn exhausted_after_the_attempt_budget() {
        let mut backoff = Backoff::new(1_000, 10_000, 3);
        assert!(!backoff.is_exhausted());
        backoff.next();
        assert!(!backoff.is_exhausted());
        backoff.next();
        assert!(!backoff.is_exhausted());
        backoff.next();
        assert!(backoff.is_exhausted());
        assert_eq!(backoff.attempts(), 3);
    }

    #[test]
    fn reset_restores_the_initial_sequence() {
        let mut backoff = Backoff::new(1_000, 10_000, 3);
        backoff.next();
        backoff.next();
        backoff.reset();
        assert!(!backoff.is_exhausted());
        assert_eq!(backoff.next().as_millis(), 1_000);
    }
}
