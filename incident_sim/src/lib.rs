//! Urban Public-Safety Incident Simulation
//!
//! Generates calibrated synthetic daily incident streams (aggressions, fires,
//! accidents) across the microzones of a city for downstream risk analysis.
//!
//! Key components:
//! - Calibration: frozen targets and fallback gravity-transition matrices
//! - Sampler: zero-inflated Poisson counts split into gravity buckets
//! - Matrices: intra-type, inter-type, neighbour and seasonal modulation stages
//! - DynamicState: traffic, night-time and alcohol-related memory per microzone
//! - Patterns: short (7 day) and long (60 day) trend effects on aggressions
//! - Probability: the J → J+1 orchestration of all of the above
//! - Simulation: the day-step engine owning one `SimulationState` and one RNG
//!
//! A run is strictly sequential (day D+1 depends on day D). Independent runs
//! with different seeds are parallelised by `parallel::BatchRunner`.

pub mod calibration;
pub mod casualties;
pub mod config;
pub mod dynamic_state;
pub mod error;
pub mod events;
pub mod history;
pub mod matrices;
pub mod parallel;
pub mod patterns;
pub mod probability;
pub mod regime;
pub mod sampler;
pub mod simulation;
pub mod state;

pub use calibration::Calibration;
pub use config::SimulationConfig;
pub use error::{Result, SimError};
pub use matrices::CorrelationMatrices;
pub use simulation::{IncidentSimulation, SimulationInputs};
pub use state::SimulationState;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Microzone identifier as produced by the geospatial preprocessing
pub type MicrozoneId = String;

/// One day of recorded incidents, keyed by microzone
pub type DailyIncidents = BTreeMap<MicrozoneId, PerType<IncidentVector>>;

/// Next-day gravity probabilities, keyed by microzone
pub type ProbabilityMap = BTreeMap<MicrozoneId, PerType<GravityProbability>>;

/// Incident families tracked in every microzone
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IncidentType {
    #[serde(rename = "agressions")]
    Aggression,
    #[serde(rename = "incendies")]
    Fire,
    #[serde(rename = "accidents")]
    Accident,
}

impl IncidentType {
    pub const ALL: [IncidentType; 3] = [
        IncidentType::Aggression,
        IncidentType::Fire,
        IncidentType::Accident,
    ];

    pub fn index(self) -> usize {
        match self {
            IncidentType::Aggression => 0,
            IncidentType::Fire => 1,
            IncidentType::Accident => 2,
        }
    }
}

impl fmt::Display for IncidentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncidentType::Aggression => write!(f, "agressions"),
            IncidentType::Fire => write!(f, "incendies"),
            IncidentType::Accident => write!(f, "accidents"),
        }
    }
}

/// Severity level of an incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Gravity {
    Benign,
    Moderate,
    Severe,
}

impl Gravity {
    pub const ALL: [Gravity; 3] = [Gravity::Benign, Gravity::Moderate, Gravity::Severe];

    pub fn index(self) -> usize {
        match self {
            Gravity::Benign => 0,
            Gravity::Moderate => 1,
            Gravity::Severe => 2,
        }
    }
}

/// Season used to select seasonal multipliers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Season {
    #[serde(rename = "hiver")]
    Winter,
    #[serde(rename = "intersaison")]
    Interseason,
    #[serde(rename = "ete")]
    Summer,
}

impl Season {
    /// Season of a day of year in 1..=365 (December to February is winter,
    /// June to August is summer, everything else is interseason)
    pub fn from_day_of_year(day_of_year: u32) -> Self {
        match day_of_year {
            1..=59 => Season::Winter,
            152..=243 => Season::Summer,
            d if d >= 335 => Season::Winter,
            _ => Season::Interseason,
        }
    }
}

/// One value per incident type
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerType<T> {
    #[serde(rename = "agressions")]
    pub aggression: T,
    #[serde(rename = "incendies")]
    pub fire: T,
    #[serde(rename = "accidents")]
    pub accident: T,
}

impl<T> PerType<T> {
    pub fn new(aggression: T, fire: T, accident: T) -> Self {
        PerType {
            aggression,
            fire,
            accident,
        }
    }

    pub fn from_fn(mut f: impl FnMut(IncidentType) -> T) -> Self {
        PerType {
            aggression: f(IncidentType::Aggression),
            fire: f(IncidentType::Fire),
            accident: f(IncidentType::Accident),
        }
    }

    pub fn get(&self, incident_type: IncidentType) -> &T {
        match incident_type {
            IncidentType::Aggression => &self.aggression,
            IncidentType::Fire => &self.fire,
            IncidentType::Accident => &self.accident,
        }
    }

    pub fn get_mut(&mut self, incident_type: IncidentType) -> &mut T {
        match incident_type {
            IncidentType::Aggression => &mut self.aggression,
            IncidentType::Fire => &mut self.fire,
            IncidentType::Accident => &mut self.accident,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (IncidentType, &T)> {
        IncidentType::ALL.into_iter().map(move |t| (t, self.get(t)))
    }
}

impl<T: Clone> PerType<T> {
    pub fn uniform(value: T) -> Self {
        PerType {
            aggression: value.clone(),
            fire: value.clone(),
            accident: value,
        }
    }
}

/// Daily incident counts of one type in one microzone, split by gravity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentVector {
    pub benign: u32,
    pub moderate: u32,
    pub severe: u32,
}

impl IncidentVector {
    pub fn new(benign: u32, moderate: u32, severe: u32) -> Self {
        IncidentVector {
            benign,
            moderate,
            severe,
        }
    }

    pub fn get(&self, gravity: Gravity) -> u32 {
        match gravity {
            Gravity::Benign => self.benign,
            Gravity::Moderate => self.moderate,
            Gravity::Severe => self.severe,
        }
    }

    pub fn total(&self) -> u32 {
        self.benign + self.moderate + self.severe
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn as_array(&self) -> [u32; 3] {
        [self.benign, self.moderate, self.severe]
    }

    /// Gravity with the highest count.
    ///
    /// Ties resolve towards the less severe gravity and an all-zero vector
    /// resolves to benign: the first maximum wins. Intra-type matrices are
    /// indexed by this row, so the tie-break is part of the model.
    pub fn dominant_gravity(&self) -> Gravity {
        let counts = self.as_array();
        let mut best = 0;
        for i in 1..3 {
            if counts[i] > counts[best] {
                best = i;
            }
        }
        Gravity::ALL[best]
    }
}

impl PerType<IncidentVector> {
    /// Incidents of every type and gravity
    pub fn total(&self) -> u32 {
        self.aggression.total() + self.fire.total() + self.accident.total()
    }
}

/// Occurrence probability of each gravity level.
///
/// Components are individually constrained to [0, 1] but need not sum to 1
/// once modulated: each gravity level is modelled semi-independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GravityProbability {
    pub benign: f64,
    pub moderate: f64,
    pub severe: f64,
}

impl GravityProbability {
    pub const ZERO: GravityProbability = GravityProbability {
        benign: 0.0,
        moderate: 0.0,
        severe: 0.0,
    };

    pub fn new(benign: f64, moderate: f64, severe: f64) -> Self {
        GravityProbability {
            benign,
            moderate,
            severe,
        }
    }

    pub fn from_array(values: [f64; 3]) -> Self {
        GravityProbability::new(values[0], values[1], values[2])
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.benign, self.moderate, self.severe]
    }

    pub fn get(&self, gravity: Gravity) -> f64 {
        self.as_array()[gravity.index()]
    }

    pub fn sum(&self) -> f64 {
        self.benign + self.moderate + self.severe
    }

    /// Every component clamped to [0, 1]
    pub fn clamped(&self) -> Self {
        GravityProbability::new(
            clamp_probability(self.benign),
            clamp_probability(self.moderate),
            clamp_probability(self.severe),
        )
    }

    /// Componentwise product with `factor`, clamped
    pub fn scaled(&self, factor: f64) -> Self {
        GravityProbability::new(
            self.benign * factor,
            self.moderate * factor,
            self.severe * factor,
        )
        .clamped()
    }

    /// Same `delta` added to every component, clamped
    pub fn shifted(&self, delta: f64) -> Self {
        GravityProbability::new(
            self.benign + delta,
            self.moderate + delta,
            self.severe + delta,
        )
        .clamped()
    }

    pub fn is_valid(&self) -> bool {
        self.as_array()
            .iter()
            .all(|p| p.is_finite() && (0.0..=1.0).contains(p))
    }
}

pub(crate) fn clamp_probability(p: f64) -> f64 {
    p.clamp(0.0, 1.0)
}

/// Smallest spatial unit of the simulation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Microzone {
    pub id: MicrozoneId,
    /// Arrondissement number (1-20)
    pub arrondissement: u8,
}

impl Microzone {
    pub fn new(id: impl Into<MicrozoneId>, arrondissement: u8) -> Self {
        Microzone {
            id: id.into(),
            arrondissement,
        }
    }
}

/// Observable summary of a simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationStats {
    pub run_id: String,
    pub seed: u64,
    pub days_simulated: u32,
    pub num_microzones: usize,

    // Incident tallies over the whole run
    pub totals: PerType<IncidentVector>,
    pub zone_days: u64,
    pub all_zero_frequency: f64,
    /// Frequency of zone-days with exactly one incident at each gravity
    pub exactly_one_frequency: PerType<[f64; 3]>,

    // Current transient state
    pub active_patterns: usize,
    pub regime_occupancy: [u32; 3],

    // Casualty aggregate: morts + 0.5 × blesses_graves
    pub casualty_score: f64,
}

impl SimulationStats {
    /// Mean daily incidents of one type per microzone
    pub fn mean_daily_rate(&self, incident_type: IncidentType) -> f64 {
        if self.zone_days == 0 {
            return 0.0;
        }
        self.totals.get(incident_type).total() as f64 / self.zone_days as f64
    }
}
