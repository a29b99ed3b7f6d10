//! Simulation configuration
//!
//! Every field has a baseline default so partial TOML files load; named
//! presets adjust the baseline the way scenario constructors do.

use crate::PerType;
use crate::error::{Result, SimError};
use crate::patterns::MAX_PATTERNS_PER_ZONE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Day-to-day evolution of traffic, night and alcohol state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicsParams {
    /// Weight of yesterday's traffic in today's level
    pub traffic_memory: f64,
    /// Level traffic relaxes towards
    pub baseline_traffic: f64,
    /// Traffic increase per accident of the day
    pub accident_traffic_push: f64,
    /// Standard deviation of daily traffic noise
    pub traffic_noise: f64,
    /// Fraction of night/alcohol counts carried to the next day
    pub count_decay: f64,
    pub night_share: PerType<f64>,
    pub alcohol_share: PerType<f64>,
}

impl Default for DynamicsParams {
    fn default() -> Self {
        DynamicsParams {
            traffic_memory: 0.7,
            baseline_traffic: 0.45,
            accident_traffic_push: 0.05,
            traffic_noise: 0.08,
            count_decay: 0.5,
            night_share: PerType::new(0.45, 0.30, 0.25),
            alcohol_share: PerType::new(0.35, 0.05, 0.15),
        }
    }
}

/// Conversion of severe incidents into casualties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CasualtyParams {
    /// Probability that a severe incident is fatal
    pub death_probability: PerType<f64>,
    /// Mean serious injuries per severe incident
    pub mean_serious_injuries: PerType<f64>,
}

impl Default for CasualtyParams {
    fn default() -> Self {
        CasualtyParams {
            death_probability: PerType::new(0.04, 0.08, 0.06),
            mean_serious_injuries: PerType::new(0.6, 0.9, 1.2),
        }
    }
}

/// Hidden regime chain modulating zero inflation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeParams {
    pub enabled: bool,
    /// Row-stochastic transitions over (stable, deteriorating, crisis)
    pub transitions: [[f64; 3]; 3],
    /// Zero-inflation regime factor per regime
    pub factors: [f64; 3],
}

impl RegimeParams {
    /// Regime frozen in `stable` with factor 1
    pub fn disabled() -> Self {
        RegimeParams {
            enabled: false,
            ..RegimeParams::default()
        }
    }
}

impl Default for RegimeParams {
    fn default() -> Self {
        RegimeParams {
            enabled: true,
            transitions: [[0.97, 0.025, 0.005], [0.10, 0.85, 0.05], [0.05, 0.15, 0.80]],
            factors: [1.0, 1.3, 1.7],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub run_name: String,
    pub seed: u64,
    pub num_days: u32,
    /// Day of year (1-365) of simulation day 0
    pub start_day_of_year: u32,
    pub max_patterns_per_zone: usize,
    /// Days of incident history kept per microzone
    pub history_window: usize,
    pub patterns_enabled: bool,
    pub dynamics: DynamicsParams,
    pub casualties: CasualtyParams,
    pub regime: RegimeParams,
}

impl SimulationConfig {
    /// One year from January 1st with every mechanism active
    pub fn baseline() -> Self {
        SimulationConfig {
            run_name: "baseline".to_string(),
            seed: 42,
            num_days: 365,
            start_day_of_year: 1,
            max_patterns_per_zone: MAX_PATTERNS_PER_ZONE,
            history_window: 60,
            patterns_enabled: true,
            dynamics: DynamicsParams::default(),
            casualties: CasualtyParams::default(),
            regime: RegimeParams::default(),
        }
    }

    /// Calibration check: stable regime, no patterns, quiet dynamics
    pub fn calibration(num_days: u32, seed: u64) -> Self {
        SimulationConfig {
            run_name: "calibration".to_string(),
            seed,
            num_days,
            patterns_enabled: false,
            dynamics: DynamicsParams {
                night_share: PerType::uniform(0.0),
                alcohol_share: PerType::uniform(0.0),
                accident_traffic_push: 0.0,
                traffic_noise: 0.0,
                ..DynamicsParams::default()
            },
            regime: RegimeParams::disabled(),
            ..Self::baseline()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn run_id(&self) -> String {
        format!("{}-{}", self.run_name, self.seed)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(SimError::InvalidConfig(msg));

        if self.num_days == 0 {
            return fail("num_days must be positive".to_string());
        }
        if !(1..=365).contains(&self.start_day_of_year) {
            return fail(format!(
                "start_day_of_year {} outside 1..=365",
                self.start_day_of_year
            ));
        }
        if self.history_window < 7 {
            return fail(format!(
                "history_window {} too short for pattern detection",
                self.history_window
            ));
        }

        let d = &self.dynamics;
        let unit = |x: f64| (0.0..=1.0).contains(&x);
        let shares_ok = d
            .night_share
            .iter()
            .chain(d.alcohol_share.iter())
            .all(|(_, &s)| unit(s));
        if !unit(d.traffic_memory) || !unit(d.baseline_traffic) || !unit(d.count_decay) || !shares_ok
        {
            return fail("dynamics memory, baseline, decay and shares must lie in [0, 1]".to_string());
        }
        if d.traffic_noise < 0.0 || d.accident_traffic_push < 0.0 {
            return fail("traffic noise and accident push must be non-negative".to_string());
        }

        let c = &self.casualties;
        if !c.death_probability.iter().all(|(_, &p)| unit(p))
            || c.mean_serious_injuries.iter().any(|(_, &m)| m < 0.0)
        {
            return fail("casualty probabilities must lie in [0, 1], means non-negative".to_string());
        }

        for (i, row) in self.regime.transitions.iter().enumerate() {
            let sum: f64 = row.iter().sum();
            if row.iter().any(|&p| p < 0.0) || (sum - 1.0).abs() > 1e-6 {
                return fail(format!("regime transition row {i} sums to {sum}"));
            }
        }
        if self.regime.factors.iter().any(|&f| f < 0.0) {
            return fail("regime factors must be non-negative".to_string());
        }

        Ok(())
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|e| SimError::io(path, e))?;
        Self::from_toml_str(&source)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig::baseline()
    }
}
