//! Seeded, reproducible shuffling.
//!
//! The generator is the small linear-congruential one browsers have long
//! used for bookmarks: `seed' = (seed * 9301 + 49297) mod 233280`, drawing
//! `seed' / 233280`. The arithmetic is plain IEEE-754 doubles so any client
//! doing the same sums reproduces the same order from a seed alone.

const MULTIPLIER: f64 = 9301.0;
const INCREMENT: f64 = 49297.0;
const MODULUS: f64 = 233280.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lcg {
    seed: f64,
}

impl Lcg {
    pub fn new(seed: f64) -> Self {
        Self { seed }
    }

    /// Advances the generator and returns a draw in `[0, 1)`.
    pub fn next_float(&mut self) -> f64 {
        // Euclidean remainder keeps negative seeds in range.
        self.seed = (self.seed * MULTIPLIER + INCREMENT).rem_euclid(MODULUS);
        self.seed / MODULUS
    }
}

/// A seed for callers that did not supply one.
pub fn fresh_seed() -> f64 {
    rand::random::<f64>()
}

/// Fisher–Yates from the back, swapping each slot with `floor(draw * remaining)`.
pub fn shuffle<T>(items: &mut [T], seed: f64) {
    let mut prng = Lcg::new(seed);
    let mut current = items.len();
    while current != 0 {
        let pick = (prng.next_float() * current as f64).floor() as usize;
        current -= 1;
        items.swap(current, pick.min(current));
    }
}

/// Shuffles `items` with `seed`, drawing a fresh seed when none (or a
/// non-finite one) is given. Returns the seed actually used.
pub fn shuffled<T>(mut items: Vec<T>, seed: Option<f64>) -> (Vec<T>, f64) {
    let seed = match seed {
        Some(seed) if seed.is_finite() => seed,
        _ => fresh_seed(),
    };
    shuffle(&mut items, seed);
    (items, seed)
}
