use std::time::Duration;

use rand::Rng;

/// Exponential retry delay with jitter.
///
/// Each call to [`Backoff::next_delay`] doubles the base delay up to `max`,
/// and spreads it by `jitter` (a fraction of the delay) in both directions.
#[derive(Clone, Debug)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    jitter: f64,
    current: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

impl Backoff {
    const DEFAULT_JITTER: f64 = 0.2;

    #[must_use]
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            jitter: Self::DEFAULT_JITTER,
            current: min,
        }
    }

    #[must_use]
    pub const fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = (self.current * 2).min(self.max);

        if self.jitter <= 0.0 {
            return base;
        }
        let factor = rand::rng().random_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        base.mul_f64(factor).min(self.max)
    }

    pub const fn reset(&mut self) {
        self.current = self.min;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::backoff::Backoff;

    #[test]
    fn doubles_until_max() {
        let mut backoff =
            Backoff::new(Duration::from_secs(1), Duration::from_secs(5)).with_jitter(0.0);

        let delays: Vec<u64> = (0..5).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let mut backoff = Backoff::default();
        for _ in 0..50 {
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_millis(800));
            assert!(delay <= Duration::from_secs(30));
        }
    }
}
