//! Per-microzone dynamic state: traffic level, night-time incidents and
//! alcohol-related incidents.
//!
//! The state is evolved once per simulated day from that day's incidents
//! (memory decay plus incident-driven perturbation) and read by the
//! probability pipeline through `apply_state_effects`.

use crate::config::DynamicsParams;
use crate::{DailyIncidents, GravityProbability, IncidentType, MicrozoneId, PerType};
use rand::Rng;
use rand_distr::{Binomial, Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Traffic level above which aggressions and accidents are amplified
pub const TRAFFIC_THRESHOLD: f64 = 0.7;
pub const TRAFFIC_FACTOR: f64 = 1.15;

/// Night-time incidents (all types) above which every type is amplified
pub const NIGHT_THRESHOLD: u32 = 2;
pub const NIGHT_FACTOR: f64 = 1.10;

/// Alcohol-related incidents (all types) above which every type is amplified
pub const ALCOHOL_THRESHOLD: u32 = 2;
pub const ALCOHOL_FACTOR: f64 = 1.08;

/// Dynamic variables of one microzone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MicrozoneDynamics {
    /// Congestion level in [0, 1]
    pub traffic: f64,
    pub night_incidents: PerType<u32>,
    pub alcohol_incidents: PerType<u32>,
}

impl MicrozoneDynamics {
    pub fn night_total(&self) -> u32 {
        self.night_incidents.iter().map(|(_, &n)| n).sum()
    }

    pub fn alcohol_total(&self) -> u32 {
        self.alcohol_incidents.iter().map(|(_, &n)| n).sum()
    }

    /// Multiplicative effect on the probabilities of `incident_type`.
    ///
    /// The three conditions are independent and compose by product.
    pub fn factor(&self, incident_type: IncidentType) -> f64 {
        let mut factor = 1.0;
        let traffic_sensitive = matches!(
            incident_type,
            IncidentType::Aggression | IncidentType::Accident
        );
        if traffic_sensitive && self.traffic > TRAFFIC_THRESHOLD {
            factor *= TRAFFIC_FACTOR;
        }
        if self.night_total() > NIGHT_THRESHOLD {
            factor *= NIGHT_FACTOR;
        }
        if self.alcohol_total() > ALCOHOL_THRESHOLD {
            factor *= ALCOHOL_FACTOR;
        }
        factor
    }
}

/// Dynamic state of every active microzone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicState {
    zones: BTreeMap<MicrozoneId, MicrozoneDynamics>,
}

impl DynamicState {
    pub fn new() -> Self {
        DynamicState::default()
    }

    /// Give every listed microzone an entry; existing entries are untouched
    pub fn ensure_microzones<'a>(
        &mut self,
        ids: impl IntoIterator<Item = &'a str>,
        initial_traffic: f64,
    ) {
        for id in ids {
            self.zones
                .entry(id.to_string())
                .or_insert_with(|| MicrozoneDynamics {
                    traffic: initial_traffic.clamp(0.0, 1.0),
                    ..MicrozoneDynamics::default()
                });
        }
    }

    pub fn get(&self, mz: &str) -> Option<&MicrozoneDynamics> {
        self.zones.get(mz)
    }

    pub fn get_mut(&mut self, mz: &str) -> Option<&mut MicrozoneDynamics> {
        self.zones.get_mut(mz)
    }

    pub fn insert(&mut self, mz: impl Into<MicrozoneId>, dynamics: MicrozoneDynamics) {
        self.zones.insert(mz.into(), dynamics);
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MicrozoneId, &MicrozoneDynamics)> {
        self.zones.iter()
    }

    /// Advance every microzone from day J to J+1 given day J's incidents.
    ///
    /// - traffic relaxes towards its baseline with memory, pushed up by
    ///   accidents, plus Gaussian noise
    /// - night and alcohol counts decay, then absorb a binomial share of
    ///   today's incidents
    pub fn evolve<R: Rng + ?Sized>(
        &mut self,
        incidents: &DailyIncidents,
        params: &DynamicsParams,
        rng: &mut R,
    ) {
        let noise = Normal::new(0.0, params.traffic_noise.max(0.0)).ok();

        for (mz, dynamics) in self.zones.iter_mut() {
            let today = incidents.get(mz).copied().unwrap_or_default();

            let shock = noise.as_ref().map(|n| n.sample(rng)).unwrap_or(0.0);
            let traffic = params.traffic_memory * dynamics.traffic
                + (1.0 - params.traffic_memory) * params.baseline_traffic
                + params.accident_traffic_push * today.accident.total() as f64
                + shock;
            dynamics.traffic = traffic.clamp(0.0, 1.0);

            for incident_type in IncidentType::ALL {
                let total = today.get(incident_type).total();

                let night = dynamics.night_incidents.get_mut(incident_type);
                *night = decay(*night, params.count_decay)
                    + binomial_share(total, *params.night_share.get(incident_type), rng);

                let alcohol = dynamics.alcohol_incidents.get_mut(incident_type);
                *alcohol = decay(*alcohol, params.count_decay)
                    + binomial_share(total, *params.alcohol_share.get(incident_type), rng);
            }
        }
    }
}

fn decay(count: u32, rate: f64) -> u32 {
    (count as f64 * rate.clamp(0.0, 1.0)).floor() as u32
}

fn binomial_share<R: Rng + ?Sized>(total: u32, share: f64, rng: &mut R) -> u32 {
    if total == 0 {
        return 0;
    }
    match Binomial::new(total as u64, share.clamp(0.0, 1.0)) {
        Ok(binomial) => binomial.sample(rng) as u32,
        Err(_) => 0,
    }
}

/// Fold traffic, night and alcohol effects into `prob` (clamped).
/// A microzone without an entry is unaffected.
pub fn apply_state_effects(
    prob: GravityProbability,
    mz: &str,
    incident_type: IncidentType,
    state: &DynamicState,
) -> GravityProbability {
    match state.get(mz) {
        Some(dynamics) => prob.scaled(dynamics.factor(incident_type)),
        None => prob.clamped(),
    }
}
