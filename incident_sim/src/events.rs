//! Scheduled special events (concerts, demonstrations, holidays)
//!
//! An event multiplies the intensity of selected incident types in selected
//! microzones for a fixed number of days.

use crate::{IncidentType, MicrozoneId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub name: String,
    pub start_day: u32,
    pub duration: u32,
    pub microzones: Vec<MicrozoneId>,
    pub incident_types: Vec<IncidentType>,
    pub intensity_multiplier: f64,
}

impl ScheduledEvent {
    pub fn is_active(&self, day: u32) -> bool {
        day >= self.start_day && day < self.start_day.saturating_add(self.duration)
    }

    pub fn is_over(&self, day: u32) -> bool {
        day >= self.start_day.saturating_add(self.duration)
    }

    pub fn covers(&self, mz: &str, incident_type: IncidentType) -> bool {
        self.microzones.iter().any(|m| m == mz) && self.incident_types.contains(&incident_type)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventsState {
    events: Vec<ScheduledEvent>,
}

impl EventsState {
    pub fn new() -> Self {
        EventsState::default()
    }

    pub fn schedule(&mut self, event: ScheduledEvent) {
        self.events.push(event);
    }

    /// Product of the multipliers of events active on `day` covering the
    /// microzone and type; 1.0 when none
    pub fn multiplier(&self, day: u32, mz: &str, incident_type: IncidentType) -> f64 {
        self.events
            .iter()
            .filter(|e| e.is_active(day) && e.covers(mz, incident_type))
            .map(|e| e.intensity_multiplier.max(0.0))
            .product()
    }

    /// Drop events finished before `day`; returns how many were removed
    pub fn prune(&mut self, day: u32) -> usize {
        let before = self.events.len();
        self.events.retain(|e| !e.is_over(day));
        before - self.events.len()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduledEvent> {
        self.events.iter()
    }
}
