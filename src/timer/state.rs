use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DURATION_MINUTES: u32 = 25;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    Ready,
    Running,
    Stopped,
}

impl Default for TimerStatus {
    fn default() -> Self {
        TimerStatus::Ready
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerMode {
    Pomodoro,
    Countdown,
    Stopwatch,
}

impl Default for TimerMode {
    fn default() -> Self {
        TimerMode::Pomodoro
    }
}

impl TimerMode {
    pub fn counts_down(self) -> bool {
        matches!(self, TimerMode::Pomodoro | TimerMode::Countdown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimerMode::Pomodoro => "POMODORO",
            TimerMode::Countdown => "COUNTDOWN",
            TimerMode::Stopwatch => "STOPWATCH",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Result of advancing the timer by one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Timer was not running; nothing changed.
    Idle,
    Advanced,
    /// Countdown reached zero. The state is already back to `Ready`.
    Completed { minutes: u32, distractions: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub status: TimerStatus,
    pub mode: TimerMode,
    pub duration_secs: u64,
    pub remaining_secs: u64,
    pub elapsed_secs: u64,
    /// Distractions raised during the current run.
    pub distractions: u32,
    #[serde(skip)]
    hidden: bool,
}

impl Default for TimerState {
    fn default() -> Self {
        Self::new(TimerMode::default(), DEFAULT_DURATION_MINUTES)
    }
}

impl TimerState {
    pub fn new(mode: TimerMode, minutes: u32) -> Self {
        let duration_secs = u64::from(minutes) * 60;
        Self {
            status: TimerStatus::Ready,
            mode,
            duration_secs,
            remaining_secs: duration_secs,
            elapsed_secs: 0,
            distractions: 0,
            hidden: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    /// Minutes reported to the completion callback.
    pub fn duration_minutes(&self) -> u32 {
        (self.duration_secs as f64 / 60.0).round() as u32
    }

    /// Returns `false` when the timer was already running.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        self.status = TimerStatus::Running;
        self.distractions = 0;
        true
    }

    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_running() {
            return TickOutcome::Idle;
        }

        if !self.mode.counts_down() {
            self.elapsed_secs = self.elapsed_secs.saturating_add(1);
            return TickOutcome::Advanced;
        }

        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs > 0 {
            return TickOutcome::Advanced;
        }

        let outcome = TickOutcome::Completed {
            minutes: self.duration_minutes(),
            distractions: self.distractions,
        };
        self.status = TimerStatus::Ready;
        self.remaining_secs = self.duration_secs;
        self.distractions = 0;
        outcome
    }

    /// Manual pause/stop. Progress is discarded, not kept for resume.
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.status = TimerStatus::Stopped;
        self.remaining_secs = self.duration_secs;
        self.elapsed_secs = 0;
        true
    }

    pub fn change_duration(&mut self, minutes: u32) -> Result<()> {
        if self.is_running() {
            bail!("cannot change duration while the timer is running");
        }
        if minutes == 0 {
            bail!("duration must be greater than zero");
        }
        self.duration_secs = u64::from(minutes) * 60;
        self.remaining_secs = self.duration_secs;
        Ok(())
    }

    pub fn switch_mode(&mut self, mode: TimerMode) -> Result<()> {
        if self.is_running() {
            bail!("cannot switch mode while the timer is running");
        }
        self.mode = mode;
        self.status = TimerStatus::Ready;
        self.remaining_secs = self.duration_secs;
        self.elapsed_secs = 0;
        Ok(())
    }

    /// Records a visibility change. Returns `true` when this change is a distraction:
    /// a visible → hidden transition while running.
    pub fn set_visibility(&mut self, visibility: Visibility) -> bool {
        let now_hidden = visibility == Visibility::Hidden;
        let became_hidden = now_hidden && !self.hidden;
        self.hidden = now_hidden;

        if became_hidden && self.is_running() {
            self.distractions = self.distractions.saturating_add(1);
            true
        } else {
            false
        }
    }

    /// Seconds to display: remaining for countdowns, elapsed for the stopwatch.
    pub fn display_secs(&self) -> u64 {
        if self.mode.counts_down() {
            self.remaining_secs
        } else {
            self.elapsed_secs
        }
    }

    pub fn progress_percent(&self) -> f64 {
        if !self.mode.counts_down() || self.duration_secs == 0 {
            return 0.0;
        }
        (self.duration_secs - self.remaining_secs) as f64 / self.duration_secs as f64 * 100.0
    }
}

pub fn format_clock(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
