//! Calibration anchors for the incident generator
//!
//! Empirically tuned targets, not physically modelled. The statistical test
//! suite is validated against these exact values, so they must stay
//! bit-for-bit as written.

use crate::matrices::GravityMatrix;
use crate::sampler::zero_inflation_probability_with_alpha;
use crate::{Gravity, IncidentType, PerType};

/// Logistic slope of the zero-inflation probability
pub const ZERO_INFLATION_ALPHA: f64 = 0.5;

/// Long-run probability that a microzone records no incident of any type on a day
pub const TARGET_ZERO_PROBABILITY: f64 = 0.70;

// Daily intensities of an "average" microzone
const BASE_INTENSITY_AGGRESSION: f64 = 0.30;
const BASE_INTENSITY_FIRE: f64 = 0.15;
const BASE_INTENSITY_ACCIDENT: f64 = 0.30;

// Conditional gravity split given at least one incident
const SPLIT_AGGRESSION: [f64; 3] = [0.85, 0.12, 0.03];
const SPLIT_FIRE: [f64; 3] = [0.80, 0.15, 0.05];
const SPLIT_ACCIDENT: [f64; 3] = [0.75, 0.20, 0.05];

// Probability of exactly one incident at each gravity on a zone-day
const TARGET_ONE_AGGRESSION: [f64; 3] = [0.1062, 0.01866, 0.00479];
const TARGET_ONE_FIRE: [f64; 3] = [0.05521, 0.01141, 0.00386];
const TARGET_ONE_ACCIDENT: [f64; 3] = [0.09656, 0.03037, 0.00794];

// Rows 1-2: moderate persistence, damped for severe → severe
const CROSS_AGGRESSION: GravityMatrix = [
    SPLIT_AGGRESSION,
    [0.70, 0.25, 0.05],
    [0.75, 0.20, 0.05],
];
const CROSS_FIRE: GravityMatrix = [SPLIT_FIRE, [0.65, 0.28, 0.07], [0.70, 0.24, 0.06]];
const CROSS_ACCIDENT: GravityMatrix = [
    SPLIT_ACCIDENT,
    [0.60, 0.33, 0.07],
    [0.65, 0.29, 0.06],
];

/// Immutable calibration value object, built once and shared by reference
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    zero_inflation_alpha: f64,
    target_zero_probability: f64,
    base_intensities: PerType<f64>,
    gravity_split: PerType<[f64; 3]>,
    target_exactly_one: PerType<[f64; 3]>,
    cross_matrices: PerType<GravityMatrix>,
}

impl Calibration {
    pub fn baseline() -> Self {
        Calibration {
            zero_inflation_alpha: ZERO_INFLATION_ALPHA,
            target_zero_probability: TARGET_ZERO_PROBABILITY,
            base_intensities: PerType::new(
                BASE_INTENSITY_AGGRESSION,
                BASE_INTENSITY_FIRE,
                BASE_INTENSITY_ACCIDENT,
            ),
            gravity_split: PerType::new(SPLIT_AGGRESSION, SPLIT_FIRE, SPLIT_ACCIDENT),
            target_exactly_one: PerType::new(
                TARGET_ONE_AGGRESSION,
                TARGET_ONE_FIRE,
                TARGET_ONE_ACCIDENT,
            ),
            cross_matrices: PerType::new(CROSS_AGGRESSION, CROSS_FIRE, CROSS_ACCIDENT),
        }
    }

    /// Same anchors with another zero-inflation steepness
    pub fn with_zero_inflation_alpha(mut self, alpha: f64) -> Self {
        self.zero_inflation_alpha = alpha;
        self
    }

    pub fn zero_inflation_alpha(&self) -> f64 {
        self.zero_inflation_alpha
    }

    /// Structural-zero probability under this calibration's α
    pub fn zero_inflation_probability(&self, intensity: f64, regime_factor: f64) -> f64 {
        zero_inflation_probability_with_alpha(self.zero_inflation_alpha, intensity, regime_factor)
    }

    pub fn target_zero_probability(&self) -> f64 {
        self.target_zero_probability
    }

    pub fn base_intensity(&self, incident_type: IncidentType) -> f64 {
        *self.base_intensities.get(incident_type)
    }

    pub fn base_intensities(&self) -> PerType<f64> {
        self.base_intensities
    }

    /// Gravity split conditional on at least one incident
    pub fn gravity_split(&self, incident_type: IncidentType) -> [f64; 3] {
        *self.gravity_split.get(incident_type)
    }

    /// Target probability of exactly one incident at `gravity` on a zone-day.
    /// Used for validation only.
    pub fn target_exactly_one(&self, incident_type: IncidentType, gravity: Gravity) -> f64 {
        self.target_exactly_one.get(incident_type)[gravity.index()]
    }

    /// Reference intra-type matrix used when none is supplied externally
    pub fn cross_matrix(&self, incident_type: IncidentType) -> &GravityMatrix {
        self.cross_matrices.get(incident_type)
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration::baseline()
    }
}
