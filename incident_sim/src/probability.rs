//! J → J+1 probability orchestration
//!
//! For every microzone and incident type:
//! 1. start from the scalar base probability
//! 2. without an intra-type matrix the result is (base, 0, 0); otherwise run
//!    intra-type → inter-type → neighbours → seasonality
//! 3. fold in dynamic-state effects when a state is supplied
//! 4. apply active patterns last
//!
//! Every optional input degrades to a no-op and all nine values per
//! microzone end up in [0, 1].

use crate::calibration::Calibration;
use crate::dynamic_state::{DynamicState, apply_state_effects};
use crate::matrices::{
    CorrelationMatrices, GravityMatrix, apply_inter_type, apply_intra_type, apply_neighbors,
    apply_seasonality,
};
use crate::patterns::{PatternRegistry, apply_patterns};
use crate::{
    DailyIncidents, GravityProbability, IncidentType, MicrozoneId, PerType, ProbabilityMap,
    Season, clamp_probability,
};
use std::collections::BTreeMap;

/// Runs the probability pipeline against one set of correlation matrices
#[derive(Debug, Clone, Copy)]
pub struct ProbabilityCalculator<'a> {
    matrices: &'a CorrelationMatrices,
    fallback: Option<&'a Calibration>,
}

impl<'a> ProbabilityCalculator<'a> {
    pub fn new(matrices: &'a CorrelationMatrices) -> Self {
        ProbabilityCalculator {
            matrices,
            fallback: None,
        }
    }

    /// Use the calibration cross matrices wherever no external intra-type
    /// matrix exists, instead of collapsing to (base, 0, 0)
    pub fn with_calibration_fallback(mut self, calibration: &'a Calibration) -> Self {
        self.fallback = Some(calibration);
        self
    }

    fn intra_matrix(&self, mz: &str, incident_type: IncidentType) -> Option<&'a GravityMatrix> {
        self.matrices
            .intra_matrix(mz, incident_type)
            .or_else(|| self.fallback.map(|c| c.cross_matrix(incident_type)))
    }

    /// Next-day gravity probabilities of one incident type in one microzone
    #[allow(clippy::too_many_arguments)]
    pub fn zone_probability(
        &self,
        prob_base: f64,
        incidents: &DailyIncidents,
        mz: &str,
        incident_type: IncidentType,
        season: Season,
        dynamic_state: Option<&DynamicState>,
        patterns: Option<&PatternRegistry>,
    ) -> GravityProbability {
        let mut prob = match self.intra_matrix(mz, incident_type) {
            None => GravityProbability::new(clamp_probability(prob_base), 0.0, 0.0),
            Some(matrix) => {
                let today = incidents
                    .get(mz)
                    .map(|zone| *zone.get(incident_type))
                    .unwrap_or_default();
                let prob = apply_intra_type(prob_base, &today, matrix);
                let prob = apply_inter_type(prob, incidents, self.matrices, mz, incident_type);
                let prob = apply_neighbors(prob, incidents, self.matrices, mz);
                apply_seasonality(prob, self.matrices, mz, incident_type, season)
            }
        };

        if let Some(state) = dynamic_state {
            prob = apply_state_effects(prob, mz, incident_type, state);
        }
        if let Some(registry) = patterns {
            prob = apply_patterns(prob, mz, incident_type, registry);
        }

        prob.clamped()
    }

    /// Next-day probabilities of every type for every listed microzone.
    /// A microzone missing from `prob_base` starts from 0.
    pub fn compute(
        &self,
        prob_base: &BTreeMap<MicrozoneId, PerType<f64>>,
        incidents: &DailyIncidents,
        microzones: &[MicrozoneId],
        season: Season,
        dynamic_state: Option<&DynamicState>,
        patterns: Option<&PatternRegistry>,
    ) -> ProbabilityMap {
        microzones
            .iter()
            .map(|mz| {
                let base = prob_base.get(mz).copied().unwrap_or_default();
                let probs = PerType::from_fn(|incident_type| {
                    self.zone_probability(
                        *base.get(incident_type),
                        incidents,
                        mz,
                        incident_type,
                        season,
                        dynamic_state,
                        patterns,
                    )
                });
                (mz.clone(), probs)
            })
            .collect()
    }
}

/// Next-day probabilities straight from externally supplied matrices
pub fn next_day_probabilities(
    prob_base: &BTreeMap<MicrozoneId, PerType<f64>>,
    incidents: &DailyIncidents,
    matrices: &CorrelationMatrices,
    microzones: &[MicrozoneId],
    season: Season,
    dynamic_state: Option<&DynamicState>,
    patterns: Option<&PatternRegistry>,
) -> ProbabilityMap {
    ProbabilityCalculator::new(matrices).compute(
        prob_base,
        incidents,
        microzones,
        season,
        dynamic_state,
        patterns,
    )
}
