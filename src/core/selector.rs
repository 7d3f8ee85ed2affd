use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::config::SelectionPolicy;

/// Trait defining the interface for upstream selection strategies.
///
/// Implementations must be safe to call from many requests at once.
pub trait SelectionStrategy: Send + Sync + 'static {
    /// Return an index in `0..len`. `len` is never zero.
    fn select_index(&self, len: usize) -> usize;
    /// Create a new instance of this strategy as a boxed trait object
    fn boxed(self) -> Box<dyn SelectionStrategy>
    where
        Self: Sized,
    {
        Box::new(self)
    }
}

/// Round-robin selection strategy
pub struct RoundRobinStrategy {
    counter: AtomicUsize,
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundRobinStrategy {
    /// Create a new round-robin strategy
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl SelectionStrategy for RoundRobinStrategy {
    fn select_index(&self, len: usize) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed) % len
    }
}

/// Uniform random selection. Stateless between calls: every request is an
/// independent draw.
pub struct RandomStrategy {
    seeded: Option<Mutex<StdRng>>,
}

impl Default for RandomStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomStrategy {
    /// Draw from the thread-local generator
    pub fn new() -> Self {
        Self { seeded: None }
    }

    /// Draw from a deterministic generator, for reproducible tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            seeded: Some(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }
}

impl SelectionStrategy for RandomStrategy {
    fn select_index(&self, len: usize) -> usize {
        match &self.seeded {
            Some(rng) => rng
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .random_range(0..len),
            None => rand::rng().random_range(0..len),
        }
    }
}

/// Factory for creating selection strategies from configuration
pub struct SelectorFactory;

impl SelectorFactory {
    /// Create a new selection strategy based on configuration
    pub fn create_strategy(policy: SelectionPolicy) -> Box<dyn SelectionStrategy> {
        match policy {
            SelectionPolicy::Random => RandomStrategy::new().boxed(),
            SelectionPolicy::RoundRobin => RoundRobinStrategy::new().boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_round_robin_strategy() {
        let strategy = RoundRobinStrategy::new();

        assert_eq!(strategy.select_index(3), 0);
        assert_eq!(strategy.select_index(3), 1);
        assert_eq!(strategy.select_index(3), 2);
        assert_eq!(strategy.select_index(3), 0); // Wraps around
    }

    #[test]
    fn test_random_strategy_in_range() {
        let strategy = RandomStrategy::new();
        for _ in 0..1_000 {
            assert!(strategy.select_index(4) < 4);
        }
        assert_eq!(strategy.select_index(1), 0);
    }

    #[test]
    fn test_seeded_strategy_is_reproducible() {
        let a = RandomStrategy::seeded(42);
        let b = RandomStrategy::seeded(42);
        let picks_a: Vec<usize> = (0..64).map(|_| a.select_index(5)).collect();
        let picks_b: Vec<usize> = (0..64).map(|_| b.select_index(5)).collect();
        assert_eq!(picks_a, picks_b);
    }

    #[test]
    fn test_random_strategy_is_uniform() {
        const TRIALS: usize = 60_000;
        const TARGETS: usize = 3;

        let strategy = RandomStrategy::seeded(7);
        let mut counts = [0usize; TARGETS];
        for _ in 0..TRIALS {
            counts[strategy.select_index(TARGETS)] += 1;
        }

        let expected = 1.0 / TARGETS as f64;
        for count in counts {
            let frequency = count as f64 / TRIALS as f64;
            assert!(
                (frequency - expected).abs() < 0.02,
                "frequency {frequency} too far from {expected}"
            );
        }
    }

    #[test]
    fn test_seeded_strategy_concurrent_use() {
        let strategy = Arc::new(RandomStrategy::seeded(1));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let strategy = strategy.clone();
                std::thread::spawn(move || {
                    (0..1_000).all(|_| strategy.select_index(2) < 2)
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }

    #[test]
    fn test_selector_factory() {
        let rr = SelectorFactory::create_strategy(SelectionPolicy::RoundRobin);
        assert_eq!(rr.select_index(2), 0);
        assert_eq!(rr.select_index(2), 1);

        let random = SelectorFactory::create_strategy(SelectionPolicy::Random);
        assert!(random.select_index(2) < 2);
    }
}
