//! Weekly casualty aggregation per arrondissement
//!
//! Severe incidents convert into deaths and serious injuries; scoring uses
//! morts + 0.5 × blesses_graves.

use crate::config::CasualtyParams;
use crate::{IncidentType, PerType};
use rand::Rng;
use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DAYS_PER_WEEK: u32 = 7;
const SERIOUS_INJURY_WEIGHT: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasualtyCount {
    #[serde(rename = "morts")]
    pub deaths: u32,
    #[serde(rename = "blesses_graves")]
    pub serious_injuries: u32,
}

impl CasualtyCount {
    pub fn score(&self) -> f64 {
        self.deaths as f64 + SERIOUS_INJURY_WEIGHT * self.serious_injuries as f64
    }
}

/// week → arrondissement → casualties
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CasualtiesState {
    weeks: BTreeMap<u32, BTreeMap<u8, CasualtyCount>>,
}

impl CasualtiesState {
    pub fn new() -> Self {
        CasualtiesState::default()
    }

    pub fn week_of(day: u32) -> u32 {
        day / DAYS_PER_WEEK
    }

    pub fn record(&mut self, day: u32, arrondissement: u8, count: CasualtyCount) {
        let entry = self
            .weeks
            .entry(Self::week_of(day))
            .or_default()
            .entry(arrondissement)
            .or_default();
        entry.deaths += count.deaths;
        entry.serious_injuries += count.serious_injuries;
    }

    /// Draw casualties for one microzone-day's severe incidents and record them
    pub fn convert_severe<R: Rng + ?Sized>(
        &mut self,
        day: u32,
        arrondissement: u8,
        severe: &PerType<u32>,
        params: &CasualtyParams,
        rng: &mut R,
    ) -> CasualtyCount {
        let mut count = CasualtyCount::default();
        for incident_type in IncidentType::ALL {
            let n = *severe.get(incident_type);
            if n == 0 {
                continue;
            }
            let p_death = params.death_probability.get(incident_type).clamp(0.0, 1.0);
            let mean_injuries = *params.mean_serious_injuries.get(incident_type);
            let injuries = Poisson::new(mean_injuries).ok();
            for _ in 0..n {
                if rng.random_bool(p_death) {
                    count.deaths += 1;
                }
                if let Some(poisson) = &injuries {
                    count.serious_injuries += poisson.sample(rng) as u32;
                }
            }
        }
        if count != CasualtyCount::default() {
            self.record(day, arrondissement, count);
        }
        count
    }

    pub fn get(&self, week: u32, arrondissement: u8) -> CasualtyCount {
        self.weeks
            .get(&week)
            .and_then(|by_arr| by_arr.get(&arrondissement))
            .copied()
            .unwrap_or_default()
    }

    pub fn score(&self, week: u32, arrondissement: u8) -> f64 {
        self.get(week, arrondissement).score()
    }

    pub fn week_totals(&self, week: u32) -> CasualtyCount {
        self.weeks
            .get(&week)
            .map(|by_arr| {
                by_arr.values().fold(CasualtyCount::default(), |acc, c| CasualtyCount {
                    deaths: acc.deaths + c.deaths,
                    serious_injuries: acc.serious_injuries + c.serious_injuries,
                })
            })
            .unwrap_or_default()
    }

    pub fn total_score(&self) -> f64 {
        self.weeks
            .values()
            .flat_map(|by_arr| by_arr.values())
            .map(CasualtyCount::score)
            .sum()
    }

    pub fn weeks(&self) -> impl Iterator<Item = u32> + '_ {
        self.weeks.keys().copied()
    }
}
