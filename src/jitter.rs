//! Jitter applied to computed retry delays to avoid thundering-herd retries.

use rand::Rng;
use std::time::Duration;

/// Jitter strategy applied on top of a computed backoff delay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Jitter {
    /// No jitter - use the exact computed delay.
    #[default]
    None,
    /// Full jitter: uniformly random in `[0, delay]`.
    Full,
}

impl Jitter {
    /// Apply jitter to a delay duration using the thread-local RNG.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            Jitter::None => delay,
            Jitter::Full => {
                let millis = delay.as_millis() as u64;
                if millis == 0 {
                    return Duration::from_millis(0);
                }
                let jittered = rand::rng().random_range(0..=millis);
                Duration::from_millis(jittered)
            }
        }
    }

    /// Apply jitter with a caller-supplied RNG, for deterministic tests.
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        match self {
            Jitter::None => delay,
            Jitter::Full => {
                let millis = delay.as_millis() as u64;
                if millis == 0 {
                    return Duration::from_millis(0);
                }
                let jittered = rng.random_range(0..=millis);
                Duration::from_millis(jittered)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn none_jitter_returns_exact_delay() {
        let jitter = Jitter::None;
        let delay = Duration::from_secs(1);
        assert_eq!(jitter.apply(delay), delay);
    }

    #[test]
    fn full_jitter_is_between_zero_and_delay() {
        let jitter = Jitter::Full;
        let delay = Duration::from_secs(1);

        for _ in 0..100 {
            let jittered = jitter.apply(delay);
            assert!(jittered <= delay);
        }
    }

    #[test]
    fn full_jitter_with_deterministic_rng() {
        let jitter = Jitter::Full;
        let delay = Duration::from_millis(1000);
        let mut rng = StdRng::seed_from_u64(42);

        let jittered = jitter.apply_with_rng(delay, &mut rng);
        assert!(jittered <= delay);
    }

    #[test]
    fn jitter_handles_zero_delay() {
        assert_eq!(Jitter::Full.apply(Duration::from_millis(0)), Duration::from_millis(0));
        assert_eq!(Jitter::None.apply(Duration::from_millis(0)), Duration::from_millis(0));
    }
}
