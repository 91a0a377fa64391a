//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Delay before the attempt following `attempt` (1-based).
///
/// `min(base · multiplier^(attempt−1), max) + uniform(0, jitter_max)`.
pub fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponent = config.backoff_multiplier.powi((attempt - 1) as i32);
    let delay_ms = (config.base_delay_ms as f64 * exponent).min(config.max_delay_ms as f64) as u64;

    let jitter = if config.jitter_max_ms > 0 {
        rand::thread_rng().gen_range(0..=config.jitter_max_ms)
    } else {
        0
    };

    Duration::from_millis(delay_ms.saturating_add(jitter))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetryConfig {
        RetryConfig {
            enabled: true,
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
            backoff_multiplier: 2.0,
            jitter_max_ms: 50,
        }
    }

    #[test]
    fn test_backoff_within_bounds() {
        let config = config();
        for attempt in 1..=4u32 {
            let expected = (100f64 * 2f64.powi(attempt as i32 - 1)).min(2_000.0) as u128;
            let delay = calculate_backoff(attempt, &config).as_millis();
            assert!(delay >= expected, "attempt {}: {} < {}", attempt, delay, expected);
            assert!(delay <= expected + 50, "attempt {}: {} > {}", attempt, delay, expected + 50);
        }
    }

    #[test]
    fn test_backoff_non_decreasing_until_cap() {
        let mut config = config();
        config.jitter_max_ms = 0;

        let mut previous = Duration::from_millis(0);
        for attempt in 1..=10 {
            let delay = calculate_backoff(attempt, &config);
            assert!(delay >= previous);
            previous = delay;
        }
        assert_eq!(previous, Duration::from_millis(2_000));
    }
}
