//! Day-step simulation engine
//!
//! One `IncidentSimulation` is one run: it owns its state and its random
//! generator, and only shares the read-only inputs. Each `step()` turns day
//! D-1's incidents into day D's probabilities, samples day D and advances
//! every piece of state that depends on it.

use crate::calibration::Calibration;
use crate::config::SimulationConfig;
use crate::error::{Result, SimError};
use crate::events::ScheduledEvent;
use crate::matrices::CorrelationMatrices;
use crate::patterns::{Pattern, PatternKind, detect_long_trigger, detect_short_trigger};
use crate::probability::ProbabilityCalculator;
use crate::sampler::{sample_count, sample_gravity_split};
use crate::state::SimulationState;
use crate::{
    DailyIncidents, Gravity, IncidentType, Microzone, MicrozoneId, PerType, Season,
    SimulationStats,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const DAYS_PER_YEAR: u32 = 365;

/// Read-only inputs shared by every run over the same city
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationInputs {
    pub microzones: Vec<Microzone>,
    /// Daily base intensity λ per microzone and type
    pub base_intensities: BTreeMap<MicrozoneId, PerType<f64>>,
    pub matrices: CorrelationMatrices,
    /// Zero-inflation α, fallback gravity splits and cross matrices
    pub calibration: Arc<Calibration>,
}

impl SimulationInputs {
    pub fn new(
        microzones: Vec<Microzone>,
        base_intensities: BTreeMap<MicrozoneId, PerType<f64>>,
        matrices: CorrelationMatrices,
        calibration: Arc<Calibration>,
    ) -> Self {
        SimulationInputs {
            microzones,
            base_intensities,
            matrices,
            calibration,
        }
    }

    /// Every microzone at the calibration's "average" intensities, no
    /// external matrices
    pub fn uniform(microzones: Vec<Microzone>, calibration: Arc<Calibration>) -> Self {
        let base = calibration.base_intensities();
        let base_intensities = microzones.iter().map(|mz| (mz.id.clone(), base)).collect();
        Self::new(
            microzones,
            base_intensities,
            CorrelationMatrices::empty(),
            calibration,
        )
    }

    /// `count` microzones "mz001", "mz002", ... spread over the 20 arrondissements
    pub fn numbered(count: usize, calibration: Arc<Calibration>) -> Self {
        let microzones = (0..count)
            .map(|i| Microzone::new(format!("mz{:03}", i + 1), (i % 20) as u8 + 1))
            .collect();
        Self::uniform(microzones, calibration)
    }

    pub fn with_base_intensity(mut self, mz: impl Into<MicrozoneId>, lambda: PerType<f64>) -> Self {
        self.base_intensities.insert(mz.into(), lambda);
        self
    }

    pub fn with_matrices(mut self, matrices: CorrelationMatrices) -> Self {
        self.matrices = matrices;
        self
    }

    pub fn microzone_ids(&self) -> Vec<MicrozoneId> {
        self.microzones.iter().map(|mz| mz.id.clone()).collect()
    }

    /// Base intensities of `mz`; a microzone without an entry is silent
    pub fn base_intensity(&self, mz: &str) -> PerType<f64> {
        self.base_intensities.get(mz).copied().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        for (mz, lambda) in &self.base_intensities {
            if let Some((t, value)) = lambda.iter().find(|(_, v)| !(v.is_finite() && **v >= 0.0)) {
                return Err(SimError::InvalidConfig(format!(
                    "base intensity of {t} in {mz} is {value}"
                )));
            }
        }
        let mut seen = BTreeSet::new();
        for mz in &self.microzones {
            if !seen.insert(mz.id.as_str()) {
                return Err(SimError::InvalidConfig(format!(
                    "duplicate microzone {}",
                    mz.id
                )));
            }
            if !self.base_intensities.contains_key(&mz.id) {
                log::warn!("microzone {} has no base intensity and stays silent", mz.id);
            }
        }
        self.matrices.validate()
    }
}

/// Scale the base intensity by how far the modulated probabilities moved
/// away from the unmodulated occurrence probability 1 - e^(-λ)
pub fn modulated_intensity(lambda_base: f64, probability_sum: f64) -> f64 {
    let prob_base = 1.0 - (-lambda_base).exp();
    if prob_base <= 0.0 {
        return lambda_base;
    }
    lambda_base * probability_sum / prob_base
}

/// Day of year (1..=365) of simulation day `day`
pub fn day_of_year(start_day_of_year: u32, day: u32) -> u32 {
    (start_day_of_year.saturating_sub(1) + day) % DAYS_PER_YEAR + 1
}

pub struct IncidentSimulation {
    state: SimulationState,
    inputs: Arc<SimulationInputs>,
    rng: StdRng,
    microzone_ids: Vec<MicrozoneId>,
    /// 1 - e^(-λ) per microzone and type
    prob_base: BTreeMap<MicrozoneId, PerType<f64>>,
    last_incidents: DailyIncidents,
}

impl IncidentSimulation {
    pub fn new(config: SimulationConfig, inputs: Arc<SimulationInputs>) -> Result<Self> {
        config.validate()?;
        inputs.validate()?;

        let seed = config.seed;
        let ids = inputs.microzone_ids();
        let state = SimulationState::new(config, ids.iter().map(String::as_str));

        Ok(Self::assemble(state, inputs, StdRng::seed_from_u64(seed)))
    }

    /// Rebuild an engine from a checkpoint. The generator is reseeded from
    /// `seed + current_day`, so a resumed run is reproducible but does not
    /// replay the uninterrupted run's draws.
    pub fn resume(mut state: SimulationState, inputs: Arc<SimulationInputs>) -> Result<Self> {
        state.config.validate()?;
        inputs.validate()?;

        let ids = inputs.microzone_ids();
        state.dynamic_state.ensure_microzones(
            ids.iter().map(String::as_str),
            state.config.dynamics.baseline_traffic,
        );
        let seed = state.config.seed.wrapping_add(state.current_day as u64);
        log::info!(
            "resuming run {} at day {}",
            state.run_id,
            state.current_day
        );

        Ok(Self::assemble(state, inputs, StdRng::seed_from_u64(seed)))
    }

    pub fn load(path: impl AsRef<Path>, inputs: Arc<SimulationInputs>) -> Result<Self> {
        let state = SimulationState::load(path)?;
        Self::resume(state, inputs)
    }

    fn assemble(state: SimulationState, inputs: Arc<SimulationInputs>, rng: StdRng) -> Self {
        let microzone_ids = inputs.microzone_ids();
        let prob_base = microzone_ids
            .iter()
            .map(|mz| {
                let lambda = inputs.base_intensity(mz);
                let prob = PerType::from_fn(|t| 1.0 - (-*lambda.get(t)).exp());
                (mz.clone(), prob)
            })
            .collect();
        let last_incidents = state.vectors.last_incidents();

        IncidentSimulation {
            state,
            inputs,
            rng,
            microzone_ids,
            prob_base,
            last_incidents,
        }
    }

    pub fn schedule_event(&mut self, event: ScheduledEvent) {
        log::debug!(
            "scheduled event {} from day {} for {} days",
            event.name,
            event.start_day,
            event.duration
        );
        self.state.events.schedule(event);
    }

    /// Simulate one day and return its incidents
    pub fn step(&mut self) -> &DailyIncidents {
        let day = self.state.current_day;
        let season = Season::from_day_of_year(day_of_year(self.state.config.start_day_of_year, day));

        let inputs = Arc::clone(&self.inputs);
        let calibration = inputs.calibration.as_ref();
        let probabilities = ProbabilityCalculator::new(&inputs.matrices)
            .with_calibration_fallback(calibration)
            .compute(
                &self.prob_base,
                &self.last_incidents,
                &self.microzone_ids,
                season,
                Some(&self.state.dynamic_state),
                Some(&self.state.patterns),
            );

        let regime_factor = self.state.regime.factor(&self.state.config.regime);
        let mut today = DailyIncidents::new();

        for mz in &inputs.microzones {
            let Some(zone_probs) = probabilities.get(&mz.id) else {
                continue;
            };
            let lambda_base = inputs.base_intensity(&mz.id);

            let incidents = PerType::from_fn(|t| {
                let prob = zone_probs.get(t);
                let multiplier = self.state.events.multiplier(day, &mz.id, t);
                let lambda = modulated_intensity(*lambda_base.get(t), prob.sum()) * multiplier;
                let p_zero = calibration.zero_inflation_probability(lambda, regime_factor);
                let total = sample_count(lambda, p_zero, &mut self.rng);
                let split = if prob.sum() > 0.0 {
                    prob.as_array()
                } else {
                    calibration.gravity_split(t)
                };
                sample_gravity_split(total, split, &mut self.rng)
            });

            let severe = PerType::from_fn(|t| incidents.get(t).severe);
            self.state.casualties.convert_severe(
                day,
                mz.arrondissement,
                &severe,
                &self.state.config.casualties,
                &mut self.rng,
            );
            today.insert(mz.id.clone(), incidents);
        }

        self.state.vectors.record(&today);
        self.state
            .dynamic_state
            .evolve(&today, &self.state.config.dynamics, &mut self.rng);

        if self.state.config.patterns_enabled {
            self.advance_patterns(day);
        }

        self.state.events.prune(day + 1);
        if let Some(previous) = self.state.regime.step(&self.state.config.regime, &mut self.rng) {
            log::debug!(
                "day {day}: regime {previous} -> {}",
                self.state.regime.current
            );
        }

        log::trace!(
            "day {day} ({season:?}): {} incidents, {} active patterns",
            today.values().map(|zone| zone.total()).sum::<u32>(),
            self.state.patterns.total_active()
        );

        self.state.current_day += 1;
        self.last_incidents = today;
        &self.last_incidents
    }

    fn advance_patterns(&mut self, day: u32) {
        let registry = &mut self.state.patterns;
        registry.update();
        registry.remove_expired();

        let max = self.state.config.max_patterns_per_zone;
        for mz in &self.microzone_ids {
            let series = self.state.vectors.aggression_series(mz);
            let candidates = [
                (PatternKind::Short, detect_short_trigger(&series)),
                (PatternKind::Long, detect_long_trigger(&series)),
            ];
            for (kind, triggered) in candidates {
                if !triggered || registry.has_kind(mz, kind) {
                    continue;
                }
                let pattern = match kind {
                    PatternKind::Short => Pattern::short(day),
                    PatternKind::Long => Pattern::long(day),
                };
                log::debug!("day {day}: {kind:?} pattern on {mz}");
                registry.add(mz, pattern, max);
            }
        }
    }

    pub fn run(&mut self, days: u32) -> SimulationStats {
        log::info!(
            "run {}: simulating days {}..{} over {} microzones",
            self.state.run_id,
            self.state.current_day,
            self.state.current_day + days,
            self.microzone_ids.len()
        );
        for _ in 0..days {
            self.step();
        }
        let stats = self.stats();
        log::info!(
            "run {} done: all-zero frequency {:.3}, casualty score {:.1}",
            stats.run_id,
            stats.all_zero_frequency,
            stats.casualty_score
        );
        stats
    }

    /// Run the days left before `config.num_days`
    pub fn run_to_end(&mut self) -> SimulationStats {
        let remaining = self
            .state
            .config
            .num_days
            .saturating_sub(self.state.current_day);
        self.run(remaining)
    }

    /// Like `run`, checking `cancel` before every day. Returns the number of
    /// days actually simulated.
    pub fn run_until_cancelled(&mut self, days: u32, cancel: &AtomicBool) -> u32 {
        let mut done = 0;
        while done < days {
            if cancel.load(Ordering::Relaxed) {
                log::info!(
                    "run {} cancelled at day {}",
                    self.state.run_id,
                    self.state.current_day
                );
                break;
            }
            self.step();
            done += 1;
        }
        done
    }

    pub fn stats(&self) -> SimulationStats {
        let vectors = &self.state.vectors;
        SimulationStats {
            run_id: self.state.run_id.clone(),
            seed: self.state.config.seed,
            days_simulated: self.state.current_day,
            num_microzones: self.microzone_ids.len(),
            totals: *vectors.totals(),
            zone_days: vectors.zone_days(),
            all_zero_frequency: vectors.all_zero_frequency(),
            exactly_one_frequency: PerType::from_fn(|t: IncidentType| {
                Gravity::ALL.map(|g| vectors.exactly_one_frequency(t, g))
            }),
            active_patterns: self.state.patterns.total_active(),
            regime_occupancy: self.state.regime.occupancy,
            casualty_score: self.state.casualties.total_score(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.state.save(path)
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn into_state(self) -> SimulationState {
        self.state
    }

    pub fn inputs(&self) -> &Arc<SimulationInputs> {
        &self.inputs
    }

    pub fn calibration(&self) -> &Arc<Calibration> {
        &self.inputs.calibration
    }

    pub fn current_day(&self) -> u32 {
        self.state.current_day
    }

    /// Incidents of the last simulated day (empty before day 0)
    pub fn last_incidents(&self) -> &DailyIncidents {
        &self.last_incidents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_run(seed: u64) -> IncidentSimulation {
        let inputs = Arc::new(SimulationInputs::numbered(5, Arc::new(Calibration::baseline())));
        IncidentSimulation::new(SimulationConfig::baseline().with_seed(seed), inputs).unwrap()
    }

    #[test]
    fn test_day_of_year_wraps() {
        assert_eq!(day_of_year(1, 0), 1);
        assert_eq!(day_of_year(1, 364), 365);
        assert_eq!(day_of_year(1, 365), 1);
        assert_eq!(day_of_year(335, 40), 10);
    }

    #[test]
    fn test_modulated_intensity() {
        let lambda: f64 = 0.3;
        let prob_base = 1.0 - (-lambda).exp();
        assert!((modulated_intensity(lambda, prob_base) - lambda).abs() < 1e-12);
        assert!((modulated_intensity(lambda, 2.0 * prob_base) - 0.6).abs() < 1e-12);
        assert_eq!(modulated_intensity(0.0, 0.4), 0.0);
    }

    #[test]
    fn test_step_covers_every_microzone() {
        let mut sim = small_run(42);
        let day = sim.step().clone();
        assert_eq!(day.len(), 5);
        assert_eq!(sim.current_day(), 1);
        assert_eq!(sim.state().vectors.zone_days(), 5);
    }

    #[test]
    fn test_same_seed_same_run() {
        let mut a = small_run(7);
        let mut b = small_run(7);
        for _ in 0..30 {
            assert_eq!(a.step(), b.step());
        }
        assert_eq!(a.state(), b.state());
    }

    #[test]
    fn test_cancel_before_first_day() {
        let mut sim = small_run(42);
        let cancel = AtomicBool::new(true);
        assert_eq!(sim.run_until_cancelled(10, &cancel), 0);
        assert_eq!(sim.current_day(), 0);

        let cancel = AtomicBool::new(false);
        assert_eq!(sim.run_until_cancelled(10, &cancel), 10);
        assert_eq!(sim.current_day(), 10);
    }

    #[test]
    fn test_rejects_negative_intensity() {
        let inputs = SimulationInputs::numbered(2, Arc::new(Calibration::baseline()))
            .with_base_intensity("mz001", PerType::new(-0.1, 0.1, 0.1));
        let result = IncidentSimulation::new(SimulationConfig::baseline(), Arc::new(inputs));
        assert!(matches!(result, Err(SimError::InvalidConfig(_))));
    }

    #[test]
    fn test_event_multiplier_raises_counts() {
        let inputs = Arc::new(SimulationInputs::numbered(4, Arc::new(Calibration::baseline())));
        let config = SimulationConfig::calibration(200, 11);

        let mut quiet = IncidentSimulation::new(config.clone(), Arc::clone(&inputs)).unwrap();
        let microzones = inputs.microzone_ids();
        let mut busy = IncidentSimulation::new(config, inputs).unwrap();
        busy.schedule_event(ScheduledEvent {
            name: "festival".to_string(),
            start_day: 0,
            duration: 200,
            microzones,
            incident_types: vec![IncidentType::Fire],
            intensity_multiplier: 5.0,
        });

        let quiet_stats = quiet.run(200);
        let busy_stats = busy.run(200);
        assert!(
            busy_stats.mean_daily_rate(IncidentType::Fire)
                > 2.0 * quiet_stats.mean_daily_rate(IncidentType::Fire)
        );
    }

    #[test]
    fn test_runs_share_one_calibration() {
        let calibration = Arc::new(Calibration::baseline());
        let inputs = Arc::new(SimulationInputs::numbered(3, Arc::clone(&calibration)));
        let a = IncidentSimulation::new(SimulationConfig::baseline(), Arc::clone(&inputs)).unwrap();
        let b = IncidentSimulation::new(SimulationConfig::baseline().with_seed(9), inputs).unwrap();
        assert!(Arc::ptr_eq(a.calibration(), &calibration));
        assert!(Arc::ptr_eq(a.calibration(), b.calibration()));
    }

    #[test]
    fn test_engine_uses_calibration_alpha() {
        // A steeper α leaves fewer structurally quiet days
        let run = |calibration: Calibration| {
            let inputs = Arc::new(SimulationInputs::numbered(10, Arc::new(calibration)));
            let mut sim =
                IncidentSimulation::new(SimulationConfig::calibration(300, 5), inputs).unwrap();
            sim.run_to_end().all_zero_frequency
        };
        let baseline = run(Calibration::baseline());
        let steep = run(Calibration::baseline().with_zero_inflation_alpha(20.0));
        assert!(steep < baseline, "steep {steep} vs baseline {baseline}");
    }

    #[test]
    fn test_new_keeps_given_intensities() {
        let microzones = vec![Microzone::new("a", 1), Microzone::new("b", 2)];
        let mut base_intensities = BTreeMap::new();
        base_intensities.insert("a".to_string(), PerType::new(0.2, 0.1, 0.3));
        let inputs = SimulationInputs::new(
            microzones,
            base_intensities,
            CorrelationMatrices::empty(),
            Arc::new(Calibration::baseline()),
        );

        assert_eq!(inputs.base_intensity("a"), PerType::new(0.2, 0.1, 0.3));
        // "b" has no entry: accepted with a warning, and silent
        assert!(inputs.validate().is_ok());
        let mut sim = IncidentSimulation::new(SimulationConfig::baseline(), Arc::new(inputs)).unwrap();
        let stats = sim.run(60);
        assert_eq!(stats.num_microzones, 2);
        let silent: u32 = sim
            .state()
            .vectors
            .aggression_series("b")
            .iter()
            .map(|v| v.total())
            .sum();
        assert_eq!(silent, 0);
    }
}
