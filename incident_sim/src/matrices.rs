//! Fixed correlation matrices and the four modulation stages applied to them
//!
//! The stages form a data pipeline in a fixed order:
//! intra-type → inter-type → neighbours → seasonality.
//! Each stage is pure and clamps its own output to [0, 1] so that later
//! multiplicative stages never compound an overflow.
//!
//! Missing entries for a microzone are neutral: the base probability passes
//! through unchanged, no cross influence, no neighbour effect, season factor 1.

use crate::error::{Result, SimError};
use crate::{
    DailyIncidents, GravityProbability, IncidentType, IncidentVector, MicrozoneId, Season,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Row `g` is tomorrow's gravity distribution given dominant gravity `g` today
pub type GravityMatrix = [[f64; 3]; 3];

/// Cap on the number of source-type incidents that feed cross influence
pub const INTER_TYPE_INCIDENT_CAP: u32 = 3;

/// Multiplier applied when neighbourhood activity exceeds the threshold
pub const NEIGHBOR_AMPLIFICATION: f64 = 1.1;

const DEFAULT_SEVERITY_WEIGHTS: [f64; 3] = [0.2, 0.5, 1.0];
const DEFAULT_NEIGHBOR_THRESHOLD: f64 = 5.0;
const ROW_SUM_TOLERANCE: f64 = 1e-5;

fn default_severity_weights() -> [f64; 3] {
    DEFAULT_SEVERITY_WEIGHTS
}

fn default_neighbor_threshold() -> f64 {
    DEFAULT_NEIGHBOR_THRESHOLD
}

fn neutral_factor() -> f64 {
    1.0
}

/// Spatial neighbourhood of one microzone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborStructure {
    #[serde(rename = "voisins")]
    pub neighbors: Vec<MicrozoneId>,
    /// Weight of one benign, moderate and severe neighbouring incident
    #[serde(rename = "poids", default = "default_severity_weights")]
    pub severity_weights: [f64; 3],
    /// Weighted neighbourhood activity above which amplification kicks in
    #[serde(rename = "seuil", default = "default_neighbor_threshold")]
    pub threshold: f64,
}

impl NeighborStructure {
    pub fn new(neighbors: Vec<MicrozoneId>) -> Self {
        NeighborStructure {
            neighbors,
            severity_weights: DEFAULT_SEVERITY_WEIGHTS,
            threshold: DEFAULT_NEIGHBOR_THRESHOLD,
        }
    }

    fn weighted(&self, vector: &IncidentVector) -> f64 {
        vector
            .as_array()
            .iter()
            .zip(self.severity_weights.iter())
            .map(|(&count, &w)| count as f64 * w)
            .sum()
    }
}

/// Seasonal multipliers for one microzone and incident type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeasonFactors {
    #[serde(rename = "hiver", default = "neutral_factor")]
    pub winter: f64,
    #[serde(rename = "intersaison", default = "neutral_factor")]
    pub interseason: f64,
    #[serde(rename = "ete", default = "neutral_factor")]
    pub summer: f64,
}

impl SeasonFactors {
    pub fn get(&self, season: Season) -> f64 {
        match season {
            Season::Winter => self.winter,
            Season::Interseason => self.interseason,
            Season::Summer => self.summer,
        }
    }
}

impl Default for SeasonFactors {
    fn default() -> Self {
        SeasonFactors {
            winter: 1.0,
            interseason: 1.0,
            summer: 1.0,
        }
    }
}

/// The four read-only lookup structures, keyed by microzone.
///
/// Produced by preprocessing outside this crate; safe to share immutably
/// across concurrent runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrices {
    #[serde(default)]
    pub intra_type: BTreeMap<MicrozoneId, BTreeMap<IncidentType, GravityMatrix>>,
    /// target type → source type → additive influence per gravity
    #[serde(default)]
    pub inter_type: BTreeMap<MicrozoneId, BTreeMap<IncidentType, BTreeMap<IncidentType, [f64; 3]>>>,
    #[serde(default)]
    pub neighbors: BTreeMap<MicrozoneId, NeighborStructure>,
    #[serde(default)]
    pub seasonal: BTreeMap<MicrozoneId, BTreeMap<IncidentType, SeasonFactors>>,
}

impl CorrelationMatrices {
    pub fn empty() -> Self {
        CorrelationMatrices::default()
    }

    pub fn intra_matrix(&self, mz: &str, incident_type: IncidentType) -> Option<&GravityMatrix> {
        self.intra_type.get(mz)?.get(&incident_type)
    }

    pub fn inter_coefficients(
        &self,
        mz: &str,
        target: IncidentType,
        source: IncidentType,
    ) -> Option<&[f64; 3]> {
        self.inter_type.get(mz)?.get(&target)?.get(&source)
    }

    pub fn neighbor_structure(&self, mz: &str) -> Option<&NeighborStructure> {
        self.neighbors.get(mz)
    }

    pub fn season_factor(&self, mz: &str, incident_type: IncidentType, season: Season) -> f64 {
        self.seasonal
            .get(mz)
            .and_then(|by_type| by_type.get(&incident_type))
            .map(|factors| factors.get(season))
            .unwrap_or(1.0)
    }

    /// Check intra-type rows are probability distributions and every other
    /// coefficient is non-negative
    pub fn validate(&self) -> Result<()> {
        for (mz, by_type) in &self.intra_type {
            for (incident_type, matrix) in by_type {
                for (row_idx, row) in matrix.iter().enumerate() {
                    let sum: f64 = row.iter().sum();
                    if row.iter().any(|&p| p < 0.0) || (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
                        return Err(SimError::InvalidConfig(format!(
                            "intra-type matrix {mz}/{incident_type} row {row_idx} is not a distribution (sum {sum})"
                        )));
                    }
                }
            }
        }

        let negative_inter = self.inter_type.iter().find(|(_, targets)| {
            targets
                .values()
                .flat_map(|sources| sources.values())
                .any(|coeffs| coeffs.iter().any(|&c| c < 0.0))
        });
        if let Some((mz, _)) = negative_inter {
            return Err(SimError::InvalidConfig(format!(
                "negative inter-type coefficient for {mz}"
            )));
        }

        for (mz, structure) in &self.neighbors {
            if structure.threshold < 0.0 || structure.severity_weights.iter().any(|&w| w < 0.0) {
                return Err(SimError::InvalidConfig(format!(
                    "negative neighbour weight or threshold for {mz}"
                )));
            }
        }

        for (mz, by_type) in &self.seasonal {
            for factors in by_type.values() {
                if [factors.winter, factors.interseason, factors.summer]
                    .iter()
                    .any(|&f| f < 0.0)
                {
                    return Err(SimError::InvalidConfig(format!(
                        "negative seasonal factor for {mz}"
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let matrices: CorrelationMatrices = serde_json::from_str(json)?;
        matrices.validate()?;
        Ok(matrices)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| SimError::io(path, e))?;
        Self::from_json_str(&json)
    }
}

/// Stage 1: spread a scalar base probability over gravities using the
/// matrix row of today's dominant gravity (ties and all-zero → benign row).
pub fn apply_intra_type(
    prob_base: f64,
    incidents: &IncidentVector,
    matrix: &GravityMatrix,
) -> GravityProbability {
    let row = matrix[incidents.dominant_gravity().index()];
    GravityProbability::new(
        prob_base * row[0],
        prob_base * row[1],
        prob_base * row[2],
    )
    .clamped()
}

/// Stage 2: add the capped influence of every other incident type
pub fn apply_inter_type(
    prob: GravityProbability,
    incidents: &DailyIncidents,
    matrices: &CorrelationMatrices,
    mz: &str,
    target: IncidentType,
) -> GravityProbability {
    let mut values = prob.as_array();

    for source in IncidentType::ALL.into_iter().filter(|&t| t != target) {
        let Some(coeffs) = matrices.inter_coefficients(mz, target, source) else {
            continue;
        };
        let source_total = incidents
            .get(mz)
            .map(|zone| zone.get(source).total())
            .unwrap_or(0);
        let capped = source_total.min(INTER_TYPE_INCIDENT_CAP) as f64;
        for (value, coeff) in values.iter_mut().zip(coeffs.iter()) {
            *value += coeff * capped;
        }
    }

    GravityProbability::from_array(values).clamped()
}

/// Stage 3: amplify when severity-weighted neighbourhood activity across all
/// incident types exceeds the microzone's activation threshold
pub fn apply_neighbors(
    prob: GravityProbability,
    incidents: &DailyIncidents,
    matrices: &CorrelationMatrices,
    mz: &str,
) -> GravityProbability {
    let Some(structure) = matrices.neighbor_structure(mz) else {
        return prob.clamped();
    };

    let activity: f64 = structure
        .neighbors
        .iter()
        .filter_map(|neighbor| incidents.get(neighbor))
        .flat_map(|zone| IncidentType::ALL.map(|t| structure.weighted(zone.get(t))))
        .sum();

    if activity > structure.threshold {
        prob.scaled(NEIGHBOR_AMPLIFICATION)
    } else {
        prob.clamped()
    }
}

/// Stage 4: seasonal scaling (factor 1 when no entry exists)
pub fn apply_seasonality(
    prob: GravityProbability,
    matrices: &CorrelationMatrices,
    mz: &str,
    incident_type: IncidentType,
    season: Season,
) -> GravityProbability {
    prob.scaled(matrices.season_factor(mz, incident_type, season))
}
