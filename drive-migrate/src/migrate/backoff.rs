use rand::Rng;
use std::time::Duration;

/// Exponential backoff for remote calls that failed with a throttling or
/// transient error.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    base: Duration,
    max: Duration,
    max_attempts: u32,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max,
            max_attempts: max_attempts.max(1),
            jitter: true,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Total attempts allowed, the first call included.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `attempt` (0-based). A server-supplied
    /// `Retry-After` wins but is still capped at `max`.
    pub fn delay(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        let mut rng = rand::thread_rng();
        self.delay_with_rng(attempt, retry_after_secs, &mut rng)
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(
        &self,
        attempt: u32,
        retry_after_secs: Option<u64>,
        rng: &mut R,
    ) -> Duration {
        if let Some(secs) = retry_after_secs {
            return Duration::from_secs(secs).min(self.max);
        }
        let base_ms = self.base.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
        let shift = attempt.min(16);
        let exp = base_ms.saturating_mul(1u64 << shift).min(max_ms);
        let delay_ms = if self.jitter {
            rng.gen_range(exp / 2..=exp)
        } else {
            exp
        };
        Duration::from_millis(delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), Duration::from_secs(10), 5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn delay_without_jitter_doubles_until_cap() {
        let policy = RetryPolicy::new(
            Duration::from_millis(100),
            Duration::from_millis(800),
            5,
        )
        .without_jitter();
        let mut rng = StdRng::seed_from_u64(1);
        let delays: Vec<_> = (0..5)
            .map(|attempt| policy.delay_with_rng(attempt, None, &mut rng))
            .collect();
        assert_eq!(
            delays,
            [100, 200, 400, 800, 800].map(Duration::from_millis).to_vec()
        );
    }

    #[test]
    fn jittered_delay_stays_within_upper_half() {
        let policy = RetryPolicy::new(Duration::from_millis(100), Duration::from_millis(800), 5);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..32 {
            let delay = policy.delay_with_rng(2, None, &mut rng);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(400));
        }
    }

    #[test]
    fn retry_after_hint_is_capped() {
        let policy = RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(5), 5);
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            policy.delay_with_rng(0, Some(3), &mut rng),
            Duration::from_secs(3)
        );
        assert_eq!(
            policy.delay_with_rng(0, Some(60), &mut rng),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn at_least_one_attempt() {
        let policy = RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(1), 0);
        assert_eq!(policy.max_attempts(), 1);
    }
}
