//! Transient trend patterns on aggression probabilities
//!
//! Two shapes exist:
//! - "7j": a 7 day bump with a single-day spike on day 3, triggered by four
//!   consecutive days with aggressions
//! - "60j": a 60 day three-phase trend (+0.05, -0.05, +0.10), triggered by a
//!   full week without aggressions
//!
//! Each microzone holds at most `MAX_PATTERNS_PER_ZONE` active patterns; 7j
//! patterns take priority over 60j when slots run out.

use crate::{GravityProbability, IncidentType, IncidentVector, MicrozoneId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MAX_PATTERNS_PER_ZONE: usize = 3;

/// Consecutive days with at least one aggression that start a 7j pattern
pub const SHORT_TRIGGER_DAYS: usize = 4;
/// Consecutive days without aggression that start a 60j pattern
pub const LONG_TRIGGER_QUIET_DAYS: usize = 7;

const SHORT_DURATION: u32 = 7;
const SHORT_BASE_AMPLITUDE: f64 = 0.1;
const SHORT_PEAK_AMPLITUDE: f64 = 0.15;
const SHORT_PEAK_DAY: u32 = 3;

const LONG_DURATION: u32 = 60;
const LONG_PHASE_AMPLITUDES: [f64; 3] = [0.05, -0.05, 0.10];
const LONG_PHASE_TWO_START: u32 = 20;
const LONG_PHASE_THREE_START: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Short,
    Long,
}

/// Shape-specific amplitude fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PatternShape {
    #[serde(rename = "7j")]
    Short {
        amplitude_base: f64,
        amplitude_peak: f64,
        /// 1-based day of the spike
        peak_day: u32,
    },
    #[serde(rename = "60j")]
    Long {
        /// 1, 2 or 3
        phase: u8,
        phase_amplitudes: [f64; 3],
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    #[serde(flatten)]
    pub shape: PatternShape,
    #[serde(rename = "type_incident")]
    pub incident_type: IncidentType,
    #[serde(rename = "jour_debut")]
    pub start_day: u32,
    /// Days elapsed since creation (0 on the creation day)
    #[serde(rename = "jour_actuel")]
    pub current_day: u32,
    #[serde(rename = "duree")]
    pub duration: u32,
}

impl Pattern {
    pub fn short(day: u32) -> Self {
        Pattern {
            shape: PatternShape::Short {
                amplitude_base: SHORT_BASE_AMPLITUDE,
                amplitude_peak: SHORT_PEAK_AMPLITUDE,
                peak_day: SHORT_PEAK_DAY,
            },
            incident_type: IncidentType::Aggression,
            start_day: day,
            current_day: 0,
            duration: SHORT_DURATION,
        }
    }

    pub fn long(day: u32) -> Self {
        Pattern {
            shape: PatternShape::Long {
                phase: 1,
                phase_amplitudes: LONG_PHASE_AMPLITUDES,
            },
            incident_type: IncidentType::Aggression,
            start_day: day,
            current_day: 0,
            duration: LONG_DURATION,
        }
    }

    pub fn kind(&self) -> PatternKind {
        match self.shape {
            PatternShape::Short { .. } => PatternKind::Short,
            PatternShape::Long { .. } => PatternKind::Long,
        }
    }

    /// Lower sorts first and survives eviction
    pub fn priority(&self) -> u8 {
        match self.kind() {
            PatternKind::Short => 0,
            PatternKind::Long => 1,
        }
    }

    /// Additive probability delta for the current day
    pub fn amplitude(&self) -> f64 {
        match &self.shape {
            PatternShape::Short {
                amplitude_base,
                amplitude_peak,
                peak_day,
            } => {
                if self.current_day + 1 == *peak_day {
                    *amplitude_peak
                } else {
                    *amplitude_base
                }
            }
            PatternShape::Long {
                phase,
                phase_amplitudes,
            } => {
                let idx = (*phase as usize).clamp(1, 3) - 1;
                phase_amplitudes[idx]
            }
        }
    }

    /// Move one day forward; 60j patterns recompute their phase from the
    /// updated day count (day 20 is already phase 2)
    pub fn advance(&mut self) {
        self.current_day += 1;
        if let PatternShape::Long { phase, .. } = &mut self.shape {
            *phase = long_phase(self.current_day);
        }
    }

    pub fn is_expired(&self) -> bool {
        self.current_day >= self.duration
    }
}

fn long_phase(day: u32) -> u8 {
    if day < LONG_PHASE_TWO_START {
        1
    } else if day < LONG_PHASE_THREE_START {
        2
    } else {
        3
    }
}

/// Last `SHORT_TRIGGER_DAYS` days (oldest to newest) all had an aggression
pub fn detect_short_trigger(history: &[IncidentVector]) -> bool {
    history.len() >= SHORT_TRIGGER_DAYS
        && history[history.len() - SHORT_TRIGGER_DAYS..]
            .iter()
            .all(|day| day.total() >= 1)
}

/// Last `LONG_TRIGGER_QUIET_DAYS` days (oldest to newest) had no aggression
pub fn detect_long_trigger(history: &[IncidentVector]) -> bool {
    history.len() >= LONG_TRIGGER_QUIET_DAYS
        && history[history.len() - LONG_TRIGGER_QUIET_DAYS..]
            .iter()
            .all(|day| day.total() == 0)
}

/// Active patterns of every microzone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternRegistry {
    zones: BTreeMap<MicrozoneId, Vec<Pattern>>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        PatternRegistry::default()
    }

    /// Append, sort by priority (stable) and evict from the tail beyond `max`
    pub fn add(&mut self, mz: &str, pattern: Pattern, max: usize) {
        let patterns = self.zones.entry(mz.to_string()).or_default();
        patterns.push(pattern);
        patterns.sort_by_key(Pattern::priority);
        patterns.truncate(max);
        if patterns.is_empty() {
            self.zones.remove(mz);
        }
    }

    pub fn update(&mut self) {
        for pattern in self.zones.values_mut().flatten() {
            pattern.advance();
        }
    }

    /// Drop expired patterns and microzones left without any
    pub fn remove_expired(&mut self) {
        for patterns in self.zones.values_mut() {
            patterns.retain(|p| !p.is_expired());
        }
        self.zones.retain(|_, patterns| !patterns.is_empty());
    }

    pub fn patterns(&self, mz: &str) -> &[Pattern] {
        self.zones.get(mz).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_kind(&self, mz: &str, kind: PatternKind) -> bool {
        self.patterns(mz).iter().any(|p| p.kind() == kind)
    }

    pub fn total_active(&self) -> usize {
        self.zones.values().map(Vec::len).sum()
    }

    pub fn microzones(&self) -> impl Iterator<Item = &MicrozoneId> {
        self.zones.keys()
    }

    /// Sum of today's amplitudes of aggression patterns on `mz`
    pub fn aggression_delta(&self, mz: &str) -> f64 {
        self.patterns(mz)
            .iter()
            .filter(|p| p.incident_type == IncidentType::Aggression)
            .map(Pattern::amplitude)
            .sum()
    }
}

/// Shift all three gravities of an aggression probability by the active
/// pattern delta; other incident types pass through untouched
pub fn apply_patterns(
    prob: GravityProbability,
    mz: &str,
    incident_type: IncidentType,
    registry: &PatternRegistry,
) -> GravityProbability {
    if incident_type != IncidentType::Aggression {
        return prob;
    }
    prob.shifted(registry.aggression_delta(mz))
}
