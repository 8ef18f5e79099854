use std::time::Duration;

use rand::Rng;

/// Calculate exponential backoff delay with jitter.
///
/// Formula: `min(base_ms * 2^(attempt-1) + jitter, max_ms)` (0-25% jitter)
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exp_factor = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exp_factor);

    let jitter = if delay_ms > 0 {
        rand::rng().random_range(0..=delay_ms / 4)
    } else {
        0
    };

    let total_delay = delay_ms.saturating_add(jitter).min(max_ms);
    Duration::from_millis(total_delay)
}

/// Attempt counter for loops bounded by a total wait budget.
///
/// Each call to [`Backoff::next_delay`] returns the delay before the next
/// attempt, or `None` once the budget would be exceeded.
#[derive(Debug, Clone)]
pub struct Backoff {
    attempt: u32,
    base_ms: u64,
    max_ms: u64,
    budget: Duration,
    spent: Duration,
}

impl Backoff {
    pub fn new(base_ms: u64, max_ms: u64, budget: Duration) -> Self {
        Self {
            attempt: 0,
            base_ms,
            max_ms,
            budget,
            spent: Duration::ZERO,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.spent >= self.budget {
            return None;
        }
        self.attempt += 1;
        let delay = calculate_backoff(self.attempt, self.base_ms, self.max_ms)
            .min(self.budget - self.spent);
        self.spent += delay;
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_backoff_basic() {
        let d1 = calculate_backoff(1, 1000, 60000);
        assert!(d1.as_millis() >= 1000 && d1.as_millis() <= 1250);

        let d2 = calculate_backoff(2, 1000, 60000);
        assert!(d2.as_millis() >= 2000 && d2.as_millis() <= 2500);

        let d3 = calculate_backoff(3, 1000, 60000);
        assert!(d3.as_millis() >= 4000 && d3.as_millis() <= 5000);
    }

    #[test]
    fn test_calculate_backoff_respects_max() {
        let d = calculate_backoff(10, 10000, 60000);
        assert!(d.as_millis() <= 60000);
    }

    #[test]
    fn test_calculate_backoff_zero_attempt() {
        assert_eq!(calculate_backoff(0, 1000, 60000), Duration::ZERO);
    }

    #[test]
    fn test_backoff_stops_at_budget() {
        let mut backoff = Backoff::new(100, 100, Duration::from_millis(350));
        let mut total = Duration::ZERO;
        while let Some(delay) = backoff.next_delay() {
            total += delay;
        }
        assert_eq!(total, Duration::from_millis(350));
        assert!(backoff.attempts() >= 3);
    }

    #[test]
    fn test_backoff_zero_budget_yields_nothing() {
        let mut backoff = Backoff::new(100, 1000, Duration::ZERO);
        assert!(backoff.next_delay().is_none());
        assert_eq!(backoff.attempts(), 0);
    }
}
