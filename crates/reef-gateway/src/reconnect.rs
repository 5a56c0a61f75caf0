use std::time::Duration;

use rand::Rng;

/// Reconnect countdown configuration shared by the connection task.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BackoffConfig {
    pub(crate) initial_delay: Duration,
    pub(crate) max_delay: Duration,
    pub(crate) factor: f64,
    pub(crate) jitter: f64,
}

impl BackoffConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.initial_delay.is_zero() {
            return Err("Reconnect interval must be > 0".to_string());
        }
        if self.max_delay.is_zero() {
            return Err("Max reconnect interval must be > 0".to_string());
        }
        if self.max_delay < self.initial_delay {
            return Err("Max reconnect interval must be >= reconnect interval".to_string());
        }
        if self.factor < 1.0 || !self.factor.is_finite() {
            return Err("Backoff factor must be >= 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter) || !self.jitter.is_finite() {
            return Err("Jitter must be between 0.0 and 1.0".to_string());
        }
        Ok(())
    }
}

pub(crate) fn calculate_backoff(config: BackoffConfig, attempt: u32) -> Duration {
    let initial = config.initial_delay.as_secs_f64();
    let max = config.max_delay.as_secs_f64();
    let exponent = config.factor.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
    let base = (initial * exponent).min(max);

    if config.jitter == 0.0 {
        return Duration::from_secs_f64(base);
    }

    let mut rng = rand::rng();
    let randomized = rng.random_range(0.0..=base);
    let blended = base * (1.0 - config.jitter) + randomized * config.jitter;
    Duration::from_secs_f64(blended)
}

/// Number of countdown ticks to wait before reconnect attempt `attempt`.
///
/// Always at least one tick, so the countdown reaches zero exactly once.
pub(crate) fn countdown_ticks(config: BackoffConfig, attempt: u32, tick: Duration) -> u32 {
    let delay = calculate_backoff(config, attempt).as_secs_f64();
    let ticks = (delay / tick.as_secs_f64()).ceil();
    if ticks.is_finite() && ticks >= 1.0 {
        ticks.min(f64::from(u32::MAX)) as u32
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(secs: u64) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_secs(secs),
            max_delay: Duration::from_secs(60),
            factor: 1.0,
            jitter: 0.0,
        }
    }

    #[test]
    fn calculate_backoff_without_jitter_is_deterministic() {
        let config = BackoffConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            factor: 2.0,
            jitter: 0.0,
        };

        assert_eq!(calculate_backoff(config, 0), Duration::from_millis(100));
        assert_eq!(calculate_backoff(config, 1), Duration::from_millis(200));
        assert_eq!(calculate_backoff(config, 2), Duration::from_millis(400));
        assert_eq!(calculate_backoff(config, 3), Duration::from_millis(800));
        assert_eq!(calculate_backoff(config, 4), Duration::from_millis(1000));
    }

    #[test]
    fn fixed_interval_never_grows() {
        let config = fixed(5);
        for attempt in 0..10 {
            assert_eq!(countdown_ticks(config, attempt, Duration::from_secs(1)), 5);
        }
    }

    #[test]
    fn countdown_rounds_up_to_whole_ticks() {
        let config = BackoffConfig {
            initial_delay: Duration::from_millis(2500),
            ..fixed(1)
        };
        assert_eq!(countdown_ticks(config, 0, Duration::from_secs(1)), 3);

        let config = BackoffConfig {
            initial_delay: Duration::from_millis(10),
            ..fixed(1)
        };
        assert_eq!(countdown_ticks(config, 0, Duration::from_secs(1)), 1);
    }

    #[test]
    fn growing_countdown_is_capped() {
        let config = BackoffConfig {
            factor: 2.0,
            max_delay: Duration::from_secs(30),
            ..fixed(5)
        };
        assert_eq!(countdown_ticks(config, 0, Duration::from_secs(1)), 5);
        assert_eq!(countdown_ticks(config, 1, Duration::from_secs(1)), 10);
        assert_eq!(countdown_ticks(config, 2, Duration::from_secs(1)), 20);
        assert_eq!(countdown_ticks(config, 3, Duration::from_secs(1)), 30);
    }

    #[test]
    fn jitter_stays_within_base() {
        let config = BackoffConfig {
            jitter: 1.0,
            ..fixed(5)
        };
        for _ in 0..50 {
            let delay = calculate_backoff(config, 0);
            assert!(delay <= Duration::from_secs(5));
        }
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(fixed(5).validate().is_ok());
        assert_eq!(
            BackoffConfig { factor: 0.5, ..fixed(5) }.validate().unwrap_err(),
            "Backoff factor must be >= 1.0"
        );
        assert_eq!(
            BackoffConfig { jitter: 1.5, ..fixed(5) }.validate().unwrap_err(),
            "Jitter must be between 0.0 and 1.0"
        );
        assert_eq!(
            fixed(0).validate().unwrap_err(),
            "Reconnect interval must be > 0"
        );
    }
}
