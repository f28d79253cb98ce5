//! Random index sources for picking a winner.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum RandomError {
    #[error("empty range {min}..={max}")]
    EmptyRange { min: u64, max: u64 },
    #[error("random source unavailable: {0}")]
    Unavailable(String),
}

/// A source of uniformly distributed integers.
///
/// Returns `impl Future + Send` so a networked source can be plugged in
/// and driven from a multi-threaded runtime.
pub trait RandomSource: Send + Sync {
    /// A value in `min..=max`.
    fn pick(&self, min: u64, max: u64) -> impl Future<Output = Result<u64, RandomError>> + Send;
}

fn local_pick(min: u64, max: u64) -> Result<u64, RandomError> {
    if min > max {
        return Err(RandomError::EmptyRange { min, max });
    }
    Ok(rand::thread_rng().gen_range(min..=max))
}

/// Thread-local PRNG. Never fails for a non-empty range.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalRandom;

impl RandomSource for LocalRandom {
    fn pick(&self, min: u64, max: u64) -> impl Future<Output = Result<u64, RandomError>> + Send {
        std::future::ready(local_pick(min, max))
    }
}

/// Deterministic source for reproducible draws.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn sample(&self, min: u64, max: u64) -> Result<u64, RandomError> {
        if min > max {
            return Err(RandomError::EmptyRange { min, max });
        }
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| RandomError::Unavailable("seeded generator poisoned".to_string()))?;
        Ok(rng.gen_range(min..=max))
    }
}

impl RandomSource for SeededRandom {
    fn pick(&self, min: u64, max: u64) -> impl Future<Output = Result<u64, RandomError>> + Send {
        std::future::ready(self.sample(min, max))
    }
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Wraps a primary source with a time bound and a local fallback.
///
/// Errors, timeouts, and out-of-range values from the primary all fall back
/// to [`LocalRandom`], so callers always get a usable value.
#[derive(Debug)]
pub struct BoundedRandom<P> {
    primary: P,
    timeout: Duration,
}

impl<P: RandomSource> BoundedRandom<P> {
    pub fn new(primary: P) -> Self {
        Self::with_timeout(primary, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(primary: P, timeout: Duration) -> Self {
        Self { primary, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// A value in `min..=max`. An empty range yields `min`.
    pub async fn pick(&self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        match tokio::time::timeout(self.timeout, self.primary.pick(min, max)).await {
            Ok(Ok(value)) if (min..=max).contains(&value) => {
                debug!(value, "Random value from primary source");
                return value;
            }
            Ok(Ok(value)) => warn!(value, min, max, "Random source returned out-of-range value, using local random"),
            Ok(Err(err)) => warn!(error = %err, "Random source failed, using local random"),
            Err(_) => warn!(timeout_ms = self.timeout.as_millis() as u64, "Random source timed out, using local random"),
        }
        local_pick(min, max).unwrap_or(min)
    }

    /// An index into a sequence of `len` items.
    pub async fn index(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        self.pick(0, (len - 1) as u64).await as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(u64);

    impl RandomSource for Fixed {
        fn pick(&self, _min: u64, _max: u64) -> impl Future<Output = Result<u64, RandomError>> + Send {
            std::future::ready(Ok(self.0))
        }
    }

    struct Broken;

    impl RandomSource for Broken {
        fn pick(&self, _min: u64, _max: u64) -> impl Future<Output = Result<u64, RandomError>> + Send {
            std::future::ready(Err(RandomError::Unavailable("offline".to_string())))
        }
    }

    struct Hanging;

    impl RandomSource for Hanging {
        fn pick(&self, _min: u64, _max: u64) -> impl Future<Output = Result<u64, RandomError>> + Send {
            std::future::pending::<Result<u64, RandomError>>()
        }
    }

    #[tokio::test]
    async fn test_primary_value_is_used() {
        let random = BoundedRandom::new(Fixed(3));
        assert_eq!(random.pick(0, 5).await, 3);
        assert_eq!(random.index(4).await, 3);
    }

    #[tokio::test]
    async fn test_out_of_range_falls_back() {
        let random = BoundedRandom::new(Fixed(99));
        for _ in 0..20 {
            assert!(random.pick(0, 4).await <= 4);
        }
    }

    #[tokio::test]
    async fn test_error_falls_back() {
        let random = BoundedRandom::new(Broken);
        assert!(random.index(3).await < 3);
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let random = BoundedRandom::with_timeout(Hanging, Duration::from_millis(20));
        let started = std::time::Instant::now();
        assert!(random.index(10).await < 10);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_single_item_needs_no_source() {
        let random = BoundedRandom::new(Hanging);
        assert_eq!(random.index(1).await, 0);
        assert_eq!(random.index(0).await, 0);
    }

    #[tokio::test]
    async fn test_seeded_is_reproducible() {
        let a = SeededRandom::new(42);
        let b = SeededRandom::new(42);
        for _ in 0..10 {
            assert_eq!(a.pick(0, 1000).await.unwrap(), b.pick(0, 1000).await.unwrap());
        }
        assert!(matches!(
            a.pick(5, 1).await,
            Err(RandomError::EmptyRange { min: 5, max: 1 })
        ));
    }
}
