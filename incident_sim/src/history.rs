//! Bounded incident history and run tallies
//!
//! Each microzone keeps the last `window` days of incident vectors, which is
//! what pattern detection reads. Tallies cover the whole run and back the
//! calibration frequencies reported in `SimulationStats`.

use crate::{DailyIncidents, Gravity, IncidentType, IncidentVector, MicrozoneId, PerType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentHistory {
    window: usize,
    zones: BTreeMap<MicrozoneId, VecDeque<PerType<IncidentVector>>>,

    totals: PerType<IncidentVector>,
    zone_days: u64,
    all_zero_zone_days: u64,
    exactly_one: PerType<[u64; 3]>,
}

impl IncidentHistory {
    pub fn new(window: usize) -> Self {
        IncidentHistory {
            window: window.max(1),
            zones: BTreeMap::new(),
            totals: PerType::default(),
            zone_days: 0,
            all_zero_zone_days: 0,
            exactly_one: PerType::default(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Append one day for every microzone in `day`
    pub fn record(&mut self, day: &DailyIncidents) {
        for (mz, incidents) in day {
            let series = self.zones.entry(mz.clone()).or_default();
            series.push_back(*incidents);
            while series.len() > self.window {
                series.pop_front();
            }

            self.zone_days += 1;
            if incidents.total() == 0 {
                self.all_zero_zone_days += 1;
            }
            for incident_type in IncidentType::ALL {
                let vector = incidents.get(incident_type);
                let total = self.totals.get_mut(incident_type);
                total.benign += vector.benign;
                total.moderate += vector.moderate;
                total.severe += vector.severe;

                let exactly_one = self.exactly_one.get_mut(incident_type);
                for gravity in Gravity::ALL {
                    if vector.get(gravity) == 1 {
                        exactly_one[gravity.index()] += 1;
                    }
                }
            }
        }
    }

    /// Most recent recorded day of `mz`
    pub fn last_day(&self, mz: &str) -> Option<&PerType<IncidentVector>> {
        self.zones.get(mz).and_then(|series| series.back())
    }

    /// Last day of every microzone with history, as a `DailyIncidents` map
    pub fn last_incidents(&self) -> DailyIncidents {
        self.zones
            .iter()
            .filter_map(|(mz, series)| series.back().map(|day| (mz.clone(), *day)))
            .collect()
    }

    /// Aggression vectors of `mz`, oldest to newest
    pub fn aggression_series(&self, mz: &str) -> Vec<IncidentVector> {
        self.zones
            .get(mz)
            .map(|series| series.iter().map(|day| day.aggression).collect())
            .unwrap_or_default()
    }

    pub fn days_held(&self, mz: &str) -> usize {
        self.zones.get(mz).map(VecDeque::len).unwrap_or(0)
    }

    pub fn totals(&self) -> &PerType<IncidentVector> {
        &self.totals
    }

    pub fn zone_days(&self) -> u64 {
        self.zone_days
    }

    pub fn all_zero_frequency(&self) -> f64 {
        if self.zone_days == 0 {
            return 0.0;
        }
        self.all_zero_zone_days as f64 / self.zone_days as f64
    }

    /// Frequency of zone-days with exactly one incident of `incident_type` at
    /// `gravity`, whatever the counts at the other gravities
    pub fn exactly_one_frequency(&self, incident_type: IncidentType, gravity: Gravity) -> f64 {
        if self.zone_days == 0 {
            return 0.0;
        }
        self.exactly_one.get(incident_type)[gravity.index()] as f64 / self.zone_days as f64
    }
}
