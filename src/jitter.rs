//! Startup jitter.
//!
//! Instances of a service tend to be started by the orchestrator at the same
//! instant. Sleeping a random delay before the first lock attempt spreads them
//! out so that most of them find the migrations already applied.

use rand::Rng;
use std::time::Duration;

/// Uniform delay in `[0, max)` milliseconds, sampled once per startup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupJitter {
    max: Duration,
}

impl Default for StartupJitter {
    fn default() -> Self {
        Self::new(Duration::from_millis(2000))
    }
}

impl StartupJitter {
    pub fn new(max: Duration) -> Self {
        Self { max }
    }

    /// Disables the jitter entirely.
    pub fn none() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let max_ms = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rng.gen_range(0..max_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_samples_stay_below_max() {
        let jitter = StartupJitter::default();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1_000 {
            assert!(jitter.sample(&mut rng) < Duration::from_millis(2000));
        }
    }

    #[test]
    fn test_seeded_rng_is_deterministic() {
        let jitter = StartupJitter::default();
        let a = jitter.sample(&mut StdRng::seed_from_u64(7));
        let b = jitter.sample(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_is_a_valid_sample() {
        let jitter = StartupJitter::default();
        let mut rng = StepRng::new(0, 0);
        assert_eq!(jitter.sample(&mut rng), Duration::ZERO);
    }

    #[test]
    fn test_disabled_jitter_never_touches_rng() {
        let mut rng = StepRng::new(u64::MAX, 1);
        assert_eq!(StartupJitter::none().sample(&mut rng), Duration::ZERO);
    }
}
