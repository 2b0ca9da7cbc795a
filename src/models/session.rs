use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timer::TimerMode;

/// A finished focus run. Appended to the history once and never edited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FocusSession {
    pub id: String,
    pub date: DateTime<Utc>,
    pub duration_minutes: u32,
    pub mode: TimerMode,
    pub completed: bool,
    #[serde(alias = "distractionCount")]
    pub distractions: u32,
}

impl FocusSession {
    pub fn completed(
        mode: TimerMode,
        duration_minutes: u32,
        distractions: u32,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            date,
            duration_minutes,
            mode,
            completed: true,
            distractions,
        }
    }
}
