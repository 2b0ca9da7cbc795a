use std::{sync::Arc, time::Duration};

use anyhow::Result;
use serde::Serialize;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::{log_debug, log_info};

use super::{TickOutcome, TimerMode, TimerState, Visibility};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub state: TimerState,
    pub display_secs: u64,
}

impl From<TimerState> for TimerSnapshot {
    fn from(state: TimerState) -> Self {
        Self {
            display_secs: state.display_secs(),
            state,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimerEvent {
    StateChanged(TimerSnapshot),
    Tick(TimerSnapshot),
    Completed {
        mode: TimerMode,
        minutes: u32,
        distractions: u32,
    },
    Distraction {
        count: u32,
    },
}

/// Owns the timer state and the one-second ticker task.
///
/// The ticker is aborted and respawned on every transition and cancelled once the last
/// clone of the controller is dropped.
#[derive(Clone)]
pub struct TimerController {
    state: Arc<Mutex<TimerState>>,
    events: mpsc::UnboundedSender<TimerEvent>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    tick_interval: Duration,
    shutdown: CancellationToken,
    _shutdown_guard: Arc<DropGuard>,
}

impl TimerController {
    pub fn new(
        mode: TimerMode,
        minutes: u32,
        tick_interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let controller = Self {
            state: Arc::new(Mutex::new(TimerState::new(mode, minutes))),
            events,
            ticker: Arc::new(Mutex::new(None)),
            tick_interval,
            _shutdown_guard: Arc::new(shutdown.clone().drop_guard()),
            shutdown,
        };
        (controller, receiver)
    }

    pub async fn get_state(&self) -> TimerState {
        self.state.lock().await.clone()
    }

    pub async fn get_snapshot(&self) -> TimerSnapshot {
        TimerSnapshot::from(self.get_state().await)
    }

    pub async fn start(&self) -> Result<TimerState> {
        let snapshot = {
            let mut state = self.state.lock().await;
            if !state.start() {
                return Ok(state.clone());
            }
            state.clone()
        };

        self.spawn_ticker().await;
        log_info!(
            "Timer started: mode={} duration={}s",
            snapshot.mode.as_str(),
            snapshot.duration_secs
        );
        self.emit(TimerEvent::StateChanged(snapshot.clone().into()));
        Ok(snapshot)
    }

    /// Pause and stop are the same transition: progress resets to the full duration.
    pub async fn stop(&self) -> Result<TimerState> {
        let (changed, snapshot) = {
            let mut state = self.state.lock().await;
            let changed = state.stop();
            (changed, state.clone())
        };
        self.cancel_ticker().await;

        if changed {
            log_info!("Timer stopped");
            self.emit(TimerEvent::StateChanged(snapshot.clone().into()));
        }
        Ok(snapshot)
    }

    pub async fn pause(&self) -> Result<TimerState> {
        self.stop().await
    }

    pub async fn change_duration(&self, minutes: u32) -> Result<TimerState> {
        let snapshot = {
            let mut state = self.state.lock().await;
            state.change_duration(minutes)?;
            state.clone()
        };
        self.cancel_ticker().await;
        self.emit(TimerEvent::StateChanged(snapshot.clone().into()));
        Ok(snapshot)
    }

    pub async fn switch_mode(&self, mode: TimerMode) -> Result<TimerState> {
        let snapshot = {
            let mut state = self.state.lock().await;
            state.switch_mode(mode)?;
            state.clone()
        };
        self.cancel_ticker().await;
        self.emit(TimerEvent::StateChanged(snapshot.clone().into()));
        Ok(snapshot)
    }

    /// Feeds a host visibility change. Returns `true` if a distraction was raised.
    pub async fn set_visibility(&self, visibility: Visibility) -> bool {
        let (raised, count) = {
            let mut state = self.state.lock().await;
            let raised = state.set_visibility(visibility);
            (raised, state.distractions)
        };

        if raised {
            log_info!("Distraction detected ({} this run)", count);
            self.emit(TimerEvent::Distraction { count });
        }
        raised
    }

    /// Cancels the ticker for good. Later transitions still update state but no longer
    /// tick.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.cancel_ticker().await;
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }
        if self.shutdown.is_cancelled() {
            return;
        }

        let state = self.state.clone();
        let events = self.events.clone();
        let tick_interval = self.tick_interval;
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + tick_interval, tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let (outcome, snapshot) = {
                    let mut guard = state.lock().await;
                    let outcome = guard.tick();
                    (outcome, guard.clone())
                };

                match outcome {
                    TickOutcome::Idle => break,
                    TickOutcome::Advanced => {
                        log_debug!("tick: {}s", snapshot.display_secs());
                        let _ = events.send(TimerEvent::Tick(snapshot.into()));
                    }
                    TickOutcome::Completed {
                        minutes,
                        distractions,
                    } => {
                        log_info!("Timer completed after {} minutes", minutes);
                        let _ = events.send(TimerEvent::Completed {
                            mode: snapshot.mode,
                            minutes,
                            distractions,
                        });
                        let _ = events.send(TimerEvent::StateChanged(snapshot.into()));
                        break;
                    }
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }

    fn emit(&self, event: TimerEvent) {
        let _ = self.events.send(event);
    }
}
