//! Zero-inflated incident sampler
//!
//! Daily counts come from a zero-inflated Poisson:
//! - with probability p_zero the day is structurally quiet (count 0)
//! - otherwise the count is drawn from Poisson(intensity)
//!
//! The count is then split into gravity buckets by multinomial sampling.

use crate::IncidentVector;
use crate::calibration::ZERO_INFLATION_ALPHA;
use rand::Rng;
use rand_distr::{Binomial, Distribution, Poisson};

/// Probability of a structural zero: σ(-α × intensity × regime_factor),
/// with the calibrated α.
///
/// Monotonically decreasing in both intensity and regime factor; equals 0.5
/// when either is zero.
pub fn zero_inflation_probability(intensity: f64, regime_factor: f64) -> f64 {
    zero_inflation_probability_with_alpha(ZERO_INFLATION_ALPHA, intensity, regime_factor)
}

pub fn zero_inflation_probability_with_alpha(alpha: f64, intensity: f64, regime_factor: f64) -> f64 {
    logistic(-alpha * intensity * regime_factor)
}

/// σ(x) = eˣ / (1 + eˣ), evaluated without overflow for large |x|
fn logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Draw a zero-inflated Poisson count.
///
/// Intensities must be non-negative; the caller validates them.
pub fn sample_count<R: Rng + ?Sized>(intensity: f64, p_zero: f64, rng: &mut R) -> u32 {
    debug_assert!(intensity >= 0.0, "negative intensity {intensity}");

    if rng.random::<f64>() < p_zero {
        return 0;
    }
    if intensity <= 0.0 {
        return 0;
    }
    match Poisson::new(intensity) {
        Ok(poisson) => poisson.sample(rng) as u32,
        Err(_) => 0,
    }
}

/// Split `total` incidents into (benign, moderate, severe) by multinomial
/// sampling with `probs` normalised to sum to 1.
///
/// The multinomial is drawn as a chain of conditional binomials so the
/// result always sums to exactly `total`.
pub fn sample_gravity_split<R: Rng + ?Sized>(
    total: u32,
    probs: [f64; 3],
    rng: &mut R,
) -> IncidentVector {
    if total == 0 {
        return IncidentVector::default();
    }

    let mass: f64 = probs.iter().map(|p| p.max(0.0)).sum();
    if !(mass > 0.0) || !mass.is_finite() {
        return IncidentVector::new(total, 0, 0);
    }

    let mut counts = [0u32; 3];
    let mut remaining = total;
    let mut remaining_mass = 1.0;

    for i in 0..2 {
        if remaining == 0 {
            break;
        }
        let share = probs[i].max(0.0) / mass;
        let conditional = if remaining_mass > 0.0 {
            (share / remaining_mass).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let drawn = match Binomial::new(remaining as u64, conditional) {
            Ok(binomial) => binomial.sample(rng) as u32,
            Err(_) => 0,
        };
        counts[i] = drawn;
        remaining -= drawn;
        remaining_mass -= share;
    }
    counts[2] = remaining;

    IncidentVector::new(counts[0], counts[1], counts[2])
}

/// Sample one day of incidents of a single type in a single microzone
pub fn sample_incidents<R: Rng + ?Sized>(
    intensity: f64,
    regime_factor: f64,
    split: [f64; 3],
    rng: &mut R,
) -> IncidentVector {
    let p_zero = zero_inflation_probability(intensity, regime_factor);
    let total = sample_count(intensity, p_zero, rng);
    sample_gravity_split(total, split, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_zero_inflation_at_zero_intensity() {
        assert!((zero_inflation_probability(0.0, 1.0) - 0.5).abs() < 1e-12);
        assert!((zero_inflation_probability(3.0, 0.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_inflation_monotonic() {
        let mut prev = zero_inflation_probability(0.0, 1.0);
        for i in 1..50 {
            let p = zero_inflation_probability(i as f64 * 0.2, 1.0);
            assert!(p < prev);
            assert!((0.0..=1.0).contains(&p));
            prev = p;
        }

        let low = zero_inflation_probability(1.0, 1.0);
        let high = zero_inflation_probability(1.0, 1.7);
        assert!(high < low);
    }

    #[test]
    fn test_zero_inflation_value() {
        // σ(-0.5 × 2 × 1) = e⁻¹ / (1 + e⁻¹)
        let expected = (-1.0f64).exp() / (1.0 + (-1.0f64).exp());
        assert!((zero_inflation_probability(2.0, 1.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_logistic_extremes_are_finite() {
        assert_eq!(logistic(-1000.0), 0.0);
        assert_eq!(logistic(1000.0), 1.0);
    }

    #[test]
    fn test_certain_zero() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            assert_eq!(sample_count(50.0, 1.0, &mut rng), 0);
        }
    }

    #[test]
    fn test_zero_intensity_without_inflation() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            assert_eq!(sample_count(0.0, 0.0, &mut rng), 0);
        }
    }

    #[test]
    fn test_poisson_mean_without_inflation() {
        let mut rng = StdRng::seed_from_u64(7);
        let draws: u32 = (0..1000).map(|_| sample_count(2.0, 0.0, &mut rng)).sum();
        let mean = draws as f64 / 1000.0;
        assert!((1.5..=2.5).contains(&mean), "mean {mean}");
    }

    #[test]
    fn test_split_of_zero_is_empty() {
        let mut rng = StdRng::seed_from_u64(1);
        let split = sample_gravity_split(0, [0.85, 0.12, 0.03], &mut rng);
        assert_eq!(split, IncidentVector::default());
    }

    #[test]
    fn test_split_preserves_total() {
        let mut rng = StdRng::seed_from_u64(3);
        for total in [1, 5, 10, 100] {
            for _ in 0..50 {
                let split = sample_gravity_split(total, [0.2, 0.3, 0.1], &mut rng);
                assert_eq!(split.total(), total);
            }
        }
    }

    #[test]
    fn test_split_with_degenerate_probabilities() {
        let mut rng = StdRng::seed_from_u64(5);
        assert_eq!(
            sample_gravity_split(7, [0.0, 0.0, 0.0], &mut rng),
            IncidentVector::new(7, 0, 0)
        );
        assert_eq!(
            sample_gravity_split(7, [0.0, 0.0, 0.4], &mut rng),
            IncidentVector::new(0, 0, 7)
        );
        assert_eq!(
            sample_gravity_split(7, [0.0, 1.0, 0.0], &mut rng),
            IncidentVector::new(0, 7, 0)
        );
    }

    #[test]
    fn test_split_proportions() {
        let mut rng = StdRng::seed_from_u64(11);
        let split = sample_gravity_split(100_000, [0.85, 0.12, 0.03], &mut rng);
        let benign = split.benign as f64 / 100_000.0;
        let severe = split.severe as f64 / 100_000.0;
        assert!((benign - 0.85).abs() < 0.01);
        assert!((severe - 0.03).abs() < 0.005);
    }

    #[test]
    fn test_deterministic_with_seed() {
        let mut rng1 = StdRng::seed_from_u64(12345);
        let mut rng2 = StdRng::seed_from_u64(12345);
        for _ in 0..100 {
            assert_eq!(
                sample_incidents(0.8, 1.0, [0.8, 0.15, 0.05], &mut rng1),
                sample_incidents(0.8, 1.0, [0.8, 0.15, 0.05], &mut rng2)
            );
        }
    }
}
