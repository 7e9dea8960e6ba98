//! Seeded star field
//!
//! Stars are a single 2px element with one `box-shadow` per star. Positions
//! come from a fixed-seed PCG so every page (and every re-render) gets the
//! same sky.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

/// Stars in the upper half of the viewport
pub const STAR_COUNT: usize = 150;
const STAR_SEED: u64 = 42;

/// Comma-separated `box-shadow` list for the star layer
pub fn star_shadows() -> String {
    let mut rng = Pcg32::seed_from_u64(STAR_SEED);
    let mut shadows = Vec::with_capacity(STAR_COUNT);
    for _ in 0..STAR_COUNT {
        let x: u32 = rng.random_range(0..100);
        let y: u32 = rng.random_range(0..50);
        let spread: u32 = rng.random_range(0..2);
        let brightness: u8 = rng.random_range(150..=255);
        shadows.push(format!(
            "{x}vw {y}vh 0 {spread}px rgb({brightness}, {brightness}, {brightness})"
        ));
    }
    shadows.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_field_is_stable() {
        let a = star_shadows();
        assert_eq!(a, star_shadows());
        assert_eq!(a.matches("vw ").count(), STAR_COUNT);
    }

    #[test]
    fn test_stars_stay_in_upper_half() {
        for shadow in star_shadows().split("), ") {
            let y: u32 = shadow
                .split_whitespace()
                .nth(1)
                .and_then(|t| t.strip_suffix("vh"))
                .and_then(|t| t.parse().ok())
                .unwrap();
            assert!(y < 50);
        }
    }
}
