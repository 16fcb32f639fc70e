//! Injectable randomness for the serendipity factor.
//!
//! The calculator is deterministic except for this one input, so the
//! random draw lives behind a trait: production uses an OS-seeded (or
//! explicitly seeded) generator, tests pin the value.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait RandomSource: Send + Sync {
    /// Bounded draw on [0, 1) from a right-skewed distribution:
    /// mostly small values, occasionally large ones.
    fn right_skewed(&self) -> f64;
}

pub struct StdRandom {
    rng: Mutex<StdRng>,
}

impl StdRandom {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for StdRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for StdRandom {
    /// Beta(0.5, 2) via Jöhnk's algorithm; only needs uniform draws.
    fn right_skewed(&self) -> f64 {
        let mut rng = self.rng.lock().unwrap();
        loop {
            let u: f64 = rng.random();
            let v: f64 = rng.random();
            let x = u.powf(2.0); // u^(1/0.5)
            let y = v.powf(0.5); // v^(1/2)
            if x + y <= 1.0 {
                if x + y > 0.0 {
                    return x / (x + y);
                }
                // both uniforms effectively zero; draw again
            }
        }
    }
}

/// Fixed-value source for deterministic tests.
pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn right_skewed(&self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draws_are_bounded() {
        let source = StdRandom::seeded(7);
        for _ in 0..1000 {
            let draw = source.right_skewed();
            assert!((0.0..1.0).contains(&draw), "draw out of bounds: {draw}");
        }
    }

    #[test]
    fn test_distribution_is_right_skewed() {
        let source = StdRandom::seeded(42);
        let draws: Vec<f64> = (0..2000).map(|_| source.right_skewed()).collect();

        let below = draws.iter().filter(|d| **d < 0.5).count();
        // Beta(0.5, 2) puts most mass well below 0.5
        assert!(below > draws.len() * 6 / 10, "not right-skewed: {below}");

        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        // analytic mean of Beta(0.5, 2) is 0.2
        assert!((mean - 0.2).abs() < 0.05, "unexpected mean: {mean}");
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let a = StdRandom::seeded(99);
        let b = StdRandom::seeded(99);
        for _ in 0..10 {
            assert_eq!(a.right_skewed(), b.right_skewed());
        }
    }

    #[test]
    fn test_fixed_source() {
        assert_eq!(FixedRandom(0.25).right_skewed(), 0.25);
    }
}
