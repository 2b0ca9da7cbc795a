use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::FocusSession;

pub const SERIES_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyFocus {
    pub date: NaiveDate,
    /// Short weekday label, e.g. "Mon".
    pub label: String,
    pub minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FocusStats {
    pub total_focus_minutes: u32,
    pub total_sessions: usize,
    pub total_distractions: u32,
    pub today_minutes: u32,
    pub daily_goal_minutes: u32,
    /// Today's minutes against the goal, capped at 100.
    pub goal_progress_percent: f64,
    /// Oldest day first, ending today.
    pub last_seven_days: Vec<DailyFocus>,
}

pub fn compute(sessions: &[FocusSession], daily_goal_minutes: u32, now: DateTime<Utc>) -> FocusStats {
    let today = now.date_naive();

    let last_seven_days = (0..SERIES_DAYS)
        .rev()
        .map(|offset| {
            let date = today - Duration::days(offset);
            DailyFocus {
                date,
                label: date.format("%a").to_string(),
                minutes: completed_minutes_on(sessions, date),
            }
        })
        .collect();

    let today_minutes = completed_minutes_on(sessions, today);
    let goal_progress_percent = if daily_goal_minutes == 0 {
        0.0
    } else {
        (f64::from(today_minutes) / f64::from(daily_goal_minutes) * 100.0).min(100.0)
    };

    FocusStats {
        total_focus_minutes: sessions
            .iter()
            .filter(|s| s.completed)
            .map(|s| s.duration_minutes)
            .sum(),
        total_sessions: sessions.len(),
        total_distractions: sessions.iter().map(|s| s.distractions).sum(),
        today_minutes,
        daily_goal_minutes,
        goal_progress_percent,
        last_seven_days,
    }
}

fn completed_minutes_on(sessions: &[FocusSession], date: NaiveDate) -> u32 {
    sessions
        .iter()
        .filter(|s| s.completed && s.date.date_naive() == date)
        .map(|s| s.duration_minutes)
        .sum()
}
