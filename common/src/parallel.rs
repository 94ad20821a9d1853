//! Bounded worker pools for per-item fan-out.
//!
//! Wraps a rayon `ThreadPool` sized once up front. Callers that end up with a
//! single worker get no pool at all and run items inline, in order.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

/// Number of workers for `items` parallel items.
///
/// Uses `requested` as given, otherwise one less than the available CPUs.
/// Never more than `items` and never less than 1.
pub fn worker_count(requested: Option<usize>, items: usize) -> usize {
    let wanted = requested.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .saturating_sub(1)
    });
    wanted.min(items).max(1)
}

/// Fixed-size pool, or inline execution when only one worker is wanted.
#[derive(Debug)]
pub struct FanOut {
    pool: Option<ThreadPool>,
    workers: usize,
}

impl FanOut {
    pub fn new(workers: usize, thread_name: &str) -> Result<Self, ThreadPoolBuildError> {
        assert!(workers > 0, "workers must be > 0");
        if workers == 1 {
            return Ok(Self::inline());
        }

        let prefix = thread_name.to_string();
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(move |idx| format!("{prefix}-{idx}"))
            .build()?;
        Ok(Self {
            pool: Some(pool),
            workers,
        })
    }

    pub fn inline() -> Self {
        Self {
            pool: None,
            workers: 1,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn is_inline(&self) -> bool {
        self.pool.is_none()
    }

    /// Maps `f` over `0..len`, returning results in index order.
    pub fn map<R, F>(&self, len: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize) -> R + Sync + Send,
    {
        match &self.pool {
            None => (0..len).map(f).collect(),
            Some(pool) => pool.install(|| (0..len).into_par_iter().map(f).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_worker_count_bounds() {
        assert_eq!(worker_count(Some(1), 10), 1);
        assert_eq!(worker_count(Some(8), 1), 1);
        assert_eq!(worker_count(None, 0), 1);
        assert!(worker_count(None, 100) >= 1);
        assert!(worker_count(None, 100) <= std::thread::available_parallelism().unwrap().get());
    }

    #[test]
    fn test_worker_count_honors_explicit_request() {
        // An explicit request is not capped by the CPU count.
        assert_eq!(worker_count(Some(4), 4), 4);
        assert_eq!(worker_count(Some(64), 10), 10);
    }

    #[test]
    fn test_inline_map_preserves_order() {
        let fan_out = FanOut::new(1, "test").unwrap();
        assert!(fan_out.is_inline());
        assert_eq!(fan_out.map(5, |i| i * 2), vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn test_pool_map_preserves_order() {
        let fan_out = FanOut::new(3, "test").unwrap();
        assert!(!fan_out.is_inline());
        assert_eq!(fan_out.workers(), 3);
        let result = fan_out.map(100, |i| i);
        let expected: Vec<usize> = (0..100).collect();
        assert_eq!(result, expected);
    }

    #[test]
    fn test_pool_concurrency_cap() {
        let fan_out = FanOut::new(2, "test").unwrap();
        let in_flight = AtomicUsize::new(0);
        let max_observed = AtomicUsize::new(0);

        fan_out.map(12, |i| {
            let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_observed.fetch_max(current, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            in_flight.fetch_sub(1, Ordering::SeqCst);
            i
        });

        let max = max_observed.load(Ordering::SeqCst);
        assert!(max <= 2, "max in-flight was {max}, expected <= 2");
    }

    #[test]
    #[should_panic(expected = "workers must be > 0")]
    fn test_zero_workers_panics() {
        let _ = FanOut::new(0, "test");
    }
}
