use approx::assert_abs_diff_eq;
use incident_sim::calibration::Calibration;
use incident_sim::dynamic_state::{DynamicState, MicrozoneDynamics};
use incident_sim::matrices::{
    CorrelationMatrices, GravityMatrix, NeighborStructure, SeasonFactors, apply_inter_type,
    apply_intra_type, apply_neighbors, apply_seasonality,
};
use incident_sim::patterns::{MAX_PATTERNS_PER_ZONE, Pattern, PatternKind, PatternRegistry};
use incident_sim::probability::next_day_probabilities;
use incident_sim::sampler::{sample_count, sample_gravity_split, zero_inflation_probability};
use incident_sim::{
    DailyIncidents, GravityProbability, IncidentType, IncidentVector, MicrozoneId, PerType, Season,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

const SEEDS: [u64; 5] = [42, 123, 456, 789, 1024];

fn random_vector(rng: &mut StdRng) -> IncidentVector {
    IncidentVector::new(
        rng.random_range(0..6),
        rng.random_range(0..4),
        rng.random_range(0..3),
    )
}

fn random_day(rng: &mut StdRng, zones: &[MicrozoneId]) -> DailyIncidents {
    zones
        .iter()
        .map(|mz| {
            let zone = PerType::from_fn(|_| random_vector(rng));
            (mz.clone(), zone)
        })
        .collect()
}

fn random_row(rng: &mut StdRng) -> [f64; 3] {
    let raw = [rng.random::<f64>(), rng.random::<f64>(), rng.random::<f64>()];
    let sum: f64 = raw.iter().sum::<f64>().max(1e-9);
    raw.map(|x| x / sum)
}

/// Matrices with aggressive coefficients so clamping is exercised
fn random_matrices(rng: &mut StdRng, zones: &[MicrozoneId]) -> CorrelationMatrices {
    let mut matrices = CorrelationMatrices::empty();
    for (i, mz) in zones.iter().enumerate() {
        let mut intra = BTreeMap::new();
        let mut inter = BTreeMap::new();
        let mut seasonal = BTreeMap::new();
        for target in IncidentType::ALL {
            let matrix: GravityMatrix = [random_row(rng), random_row(rng), random_row(rng)];
            intra.insert(target, matrix);

            let mut sources = BTreeMap::new();
            for source in IncidentType::ALL.into_iter().filter(|&s| s != target) {
                sources.insert(source, [
                    rng.random_range(-0.3..0.3),
                    rng.random_range(-0.3..0.3),
                    rng.random_range(-0.3..0.3),
                ]);
            }
            inter.insert(target, sources);

            seasonal.insert(target, SeasonFactors {
                winter: rng.random_range(0.0..3.0),
                interseason: 1.0,
                summer: rng.random_range(0.0..3.0),
            });
        }
        matrices.intra_type.insert(mz.clone(), intra);
        matrices.inter_type.insert(mz.clone(), inter);
        matrices.seasonal.insert(mz.clone(), seasonal);

        let neighbors = zones
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .map(|(_, n)| n.clone())
            .collect();
        matrices
            .neighbors
            .insert(mz.clone(), NeighborStructure::new(neighbors));
    }
    matrices
}

fn zones(n: usize) -> Vec<MicrozoneId> {
    (1..=n).map(|i| format!("mz{i}")).collect()
}

#[test]
fn test_calibration_rows_sum_to_one_and_intra_preserves_mass() {
    let calibration = Calibration::baseline();
    for t in IncidentType::ALL {
        let matrix = calibration.cross_matrix(t);
        for row in matrix {
            assert_abs_diff_eq!(row.iter().sum::<f64>(), 1.0, epsilon = 1e-5);
        }
        for pb in [0.0, 0.05, 0.2, 0.5, 0.99] {
            for today in [
                IncidentVector::new(0, 0, 0),
                IncidentVector::new(0, 3, 1),
                IncidentVector::new(0, 1, 2),
            ] {
                let p = apply_intra_type(pb, &today, matrix);
                assert_abs_diff_eq!(p.sum(), pb, epsilon = 1e-6);
            }
        }
    }
}

#[test]
fn test_intra_preserves_mass_for_random_stochastic_matrices() {
    let ids = zones(4);
    for seed in SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let matrices = random_matrices(&mut rng, &ids);

        for mz in &ids {
            for t in IncidentType::ALL {
                let Some(matrix) = matrices.intra_matrix(mz, t) else {
                    panic!("no intra matrix for {mz} {t}");
                };
                for _ in 0..20 {
                    let pb = rng.random_range(0.0..=1.0);
                    let today = random_vector(&mut rng);
                    let p = apply_intra_type(pb, &today, matrix);
                    assert_abs_diff_eq!(p.sum(), pb, epsilon = 1e-6);
                }
            }
        }
    }
}

#[test]
fn test_every_stage_stays_within_unit_interval() {
    let ids = zones(6);
    for seed in SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let matrices = random_matrices(&mut rng, &ids);

        for _ in 0..50 {
            let day = random_day(&mut rng, &ids);
            for mz in &ids {
                for t in IncidentType::ALL {
                    let pb = rng.random_range(-0.5..1.5);
                    let matrix = matrices.intra_matrix(mz, t).copied().unwrap_or_default();

                    let p1 = apply_intra_type(pb, day[mz].get(t), &matrix);
                    assert!(p1.is_valid(), "intra {p1:?}");
                    let p2 = apply_inter_type(p1, &day, &matrices, mz, t);
                    assert!(p2.is_valid(), "inter {p2:?}");
                    let p3 = apply_neighbors(p2, &day, &matrices, mz);
                    assert!(p3.is_valid(), "neighbors {p3:?}");
                    for season in [Season::Winter, Season::Interseason, Season::Summer] {
                        let p4 = apply_seasonality(p3, &matrices, mz, t, season);
                        assert!(p4.is_valid(), "seasonality {p4:?}");
                    }
                }
            }
        }
    }
}

#[test]
fn test_full_pipeline_output_within_unit_interval() {
    let ids = zones(5);
    for seed in SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let matrices = random_matrices(&mut rng, &ids);

        let mut state = DynamicState::new();
        let mut registry = PatternRegistry::new();
        for mz in &ids {
            state.insert(mz.as_str(), MicrozoneDynamics {
                traffic: rng.random(),
                night_incidents: PerType::from_fn(|_| rng.random_range(0..5)),
                alcohol_incidents: PerType::from_fn(|_| rng.random_range(0..5)),
            });
            registry.add(mz, Pattern::short(0), MAX_PATTERNS_PER_ZONE);
            registry.add(mz, Pattern::long(0), MAX_PATTERNS_PER_ZONE);
        }

        let prob_base: BTreeMap<MicrozoneId, PerType<f64>> = ids
            .iter()
            .map(|mz| (mz.clone(), PerType::from_fn(|_| rng.random::<f64>())))
            .collect();
        let day = random_day(&mut rng, &ids);

        let result = next_day_probabilities(
            &prob_base,
            &day,
            &matrices,
            &ids,
            Season::Summer,
            Some(&state),
            Some(&registry),
        );
        assert_eq!(result.len(), ids.len());
        for zone in result.values() {
            for (_, p) in zone.iter() {
                assert!(p.is_valid(), "{p:?}");
            }
        }
    }
}

#[test]
fn test_neighbor_amplification_scenario() {
    let mut matrices = CorrelationMatrices::empty();
    let neighbors: Vec<MicrozoneId> = (1..=8).map(|i| format!("n{i}")).collect();
    matrices
        .neighbors
        .insert("center".to_string(), NeighborStructure::new(neighbors.clone()));

    let mut day = DailyIncidents::new();
    for n in &neighbors {
        day.insert(n.clone(), PerType::new(
            IncidentVector::new(2, 2, 2),
            IncidentVector::default(),
            IncidentVector::default(),
        ));
    }

    let input = GravityProbability::new(0.2, 0.1, 0.05);
    let output = apply_neighbors(input, &day, &matrices, "center");
    assert_abs_diff_eq!(output.benign, 0.22, epsilon = 1e-12);
    assert_abs_diff_eq!(output.moderate, 0.11, epsilon = 1e-12);
    assert_abs_diff_eq!(output.severe, 0.055, epsilon = 1e-12);
}

#[test]
fn test_gravity_split_sums_to_total() {
    for seed in SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        for total in [0, 1, 5, 10, 100] {
            for probs in [
                [0.85, 0.12, 0.03],
                [0.2, 0.024, 0.006],
                [0.0, 0.0, 1.0],
                [0.0, 0.0, 0.0],
                [1.0, 1.0, 1.0],
            ] {
                let split = sample_gravity_split(total, probs, &mut rng);
                assert_eq!(split.total(), total, "seed {seed} probs {probs:?}");
            }
        }
    }
}

#[test]
fn test_certain_structural_zero() {
    let mut rng = StdRng::seed_from_u64(42);
    for intensity in [0.1, 2.0, 50.0, 1000.0] {
        for _ in 0..200 {
            assert_eq!(sample_count(intensity, 1.0, &mut rng), 0);
        }
    }
}

#[test]
fn test_plain_poisson_mean() {
    for seed in SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let total: u32 = (0..1000).map(|_| sample_count(2.0, 0.0, &mut rng)).sum();
        let mean = total as f64 / 1000.0;
        assert!((1.5..=2.5).contains(&mean), "seed {seed}: mean {mean}");
    }
}

#[test]
fn test_zero_inflation_is_monotone() {
    let intensities = [0.0, 0.1, 0.3, 1.0, 3.0, 10.0];
    for factor in [0.5, 1.0, 1.3, 1.7] {
        for w in intensities.windows(2) {
            assert!(zero_inflation_probability(w[1], factor) < zero_inflation_probability(w[0], factor));
        }
    }
    for &i in &intensities[1..] {
        assert!(zero_inflation_probability(i, 1.7) < zero_inflation_probability(i, 1.0));
    }
    assert!((0.0..=1.0).contains(&zero_inflation_probability(1e6, 1.0)));
}

#[test]
fn test_registry_never_exceeds_cap() {
    for seed in SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut registry = PatternRegistry::new();
        for day in 0..200 {
            let pattern = if rng.random_bool(0.5) {
                Pattern::short(day)
            } else {
                Pattern::long(day)
            };
            let shorts_before = registry
                .patterns("mz1")
                .iter()
                .filter(|p| p.kind() == PatternKind::Short)
                .count();
            registry.add("mz1", pattern, MAX_PATTERNS_PER_ZONE);

            let patterns = registry.patterns("mz1");
            assert!(patterns.len() <= MAX_PATTERNS_PER_ZONE);
            let shorts_after = patterns
                .iter()
                .filter(|p| p.kind() == PatternKind::Short)
                .count();
            assert!(shorts_after >= shorts_before.min(MAX_PATTERNS_PER_ZONE));
            // Short patterns always sort ahead of long ones
            let kinds: Vec<_> = patterns.iter().map(|p| p.priority()).collect();
            assert!(kinds.windows(2).all(|w| w[0] <= w[1]));

            if rng.random_bool(0.3) {
                registry.update();
                registry.remove_expired();
            }
        }
    }
}

#[test]
fn test_pattern_expiry_counts() {
    let mut registry = PatternRegistry::new();
    registry.add("mz1", Pattern::short(0), MAX_PATTERNS_PER_ZONE);
    registry.add("mz2", Pattern::long(0), MAX_PATTERNS_PER_ZONE);

    for update in 1..=60 {
        registry.update();
        registry.remove_expired();
        let short_alive = !registry.patterns("mz1").is_empty();
        let long_alive = !registry.patterns("mz2").is_empty();
        assert_eq!(short_alive, update < 7, "short after {update} updates");
        assert_eq!(long_alive, update < 60, "long after {update} updates");
    }
}
