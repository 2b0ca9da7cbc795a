//! Virtual pet progress.
//!
//! The pet changes only through [`PetState::on_session_complete`] and
//! [`PetState::on_distraction`]. Level is never stored: it is derived from experience on
//! every read.

use serde::{Deserialize, Serialize};

pub const XP_PER_LEVEL: f64 = 1000.0;
pub const XP_PER_MINUTE: f64 = 10.0;

const STAT_MAX: f64 = 100.0;
const STAT_MIN: f64 = 0.0;

const HAPPINESS_ON_COMPLETE: f64 = 15.0;
const HEALTH_ON_COMPLETE: f64 = 5.0;
const HAPPINESS_ON_DISTRACTION: f64 = 10.0;
const HEALTH_ON_DISTRACTION: f64 = 2.0;
const HEALTH_ON_DISTRACTION_STRICT: f64 = 5.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PetMood {
    Happy,
    Sad,
    Focusing,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PetState {
    pub name: String,
    #[serde(alias = "xp")]
    pub experience: f64,
    pub health: f64,
    pub happiness: f64,
}

impl Default for PetState {
    fn default() -> Self {
        Self {
            name: "Mochi".into(),
            experience: 0.0,
            health: 100.0,
            happiness: 80.0,
        }
    }
}

impl PetState {
    pub fn level(&self) -> u32 {
        level_for(self.experience)
    }

    pub fn on_session_complete(&mut self, minutes: u32) {
        self.experience = self.experience.max(0.0) + f64::from(minutes) * XP_PER_MINUTE;
        self.happiness = clamp_stat(self.happiness + HAPPINESS_ON_COMPLETE);
        self.health = clamp_stat(self.health + HEALTH_ON_COMPLETE);
    }

    pub fn on_distraction(&mut self, strict_mode: bool) {
        let health_penalty = if strict_mode {
            HEALTH_ON_DISTRACTION_STRICT
        } else {
            HEALTH_ON_DISTRACTION
        };
        self.happiness = clamp_stat(self.happiness - HAPPINESS_ON_DISTRACTION);
        self.health = clamp_stat(self.health - health_penalty);
    }

    pub fn mood(&self, is_focusing: bool) -> PetMood {
        if is_focusing {
            PetMood::Focusing
        } else if self.health < 30.0 || self.happiness < 30.0 {
            PetMood::Sad
        } else if self.happiness >= 70.0 {
            PetMood::Happy
        } else {
            PetMood::Neutral
        }
    }

    /// Experience still needed to reach the next level.
    pub fn xp_to_next_level(&self) -> f64 {
        f64::from(self.level()) * XP_PER_LEVEL - self.experience.max(0.0)
    }
}

pub fn level_for(experience: f64) -> u32 {
    (experience.max(0.0) / XP_PER_LEVEL).floor() as u32 + 1
}

fn clamp_stat(value: f64) -> f64 {
    value.clamp(STAT_MIN, STAT_MAX)
}
