use std::time::Duration;

/// Base delay before the first rate-limit retry.
pub const BASE_DELAY_SECS: u64 = 1;

pub const STATUS_RATE_LIMITED: u16 = 429;

/// Exponential backoff for rate-limited attempts: 1s, 2s, 4s, ...
#[must_use]
pub fn retry_delay(attempt: u32) -> Duration {
    let exponent = attempt.min(10);
    Duration::from_secs(BASE_DELAY_SECS * 2u64.saturating_pow(exponent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_per_attempt() {
        assert_eq!(retry_delay(0), Duration::from_secs(1));
        assert_eq!(retry_delay(1), Duration::from_secs(2));
        assert_eq!(retry_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn delay_is_capped_for_absurd_attempt_counts() {
        assert_eq!(retry_delay(100), retry_delay(10));
    }
}
