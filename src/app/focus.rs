//! Focus timer with a virtual pet.
//!
//! [`FocusApp`] owns the persisted snapshot and the timer. A background pump consumes
//! timer events and applies them to the pet and the session history, saving after each
//! change. Everything else mutates the snapshot through the methods below. The snapshot
//! lock is held until each save returns, so stored blobs never go back in time.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};

use crate::{
    ai::{AiGateway, RequestTracker},
    config::AppConfig,
    log_info, log_warn,
    models::{FocusSession, FocusSettings, PetState},
    notify::{distraction_body, Notifier, DISTRACTION_TITLE},
    stats::{self, FocusStats},
    storage::{FocusSnapshot, ImportError, Persistence},
    timer::{
        TimerController, TimerEvent, TimerMode, TimerSnapshot, TimerState, Visibility,
        DEFAULT_DURATION_MINUTES,
    },
};

const ENABLE_LOGS: bool = true;
const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// What observers of the focus app get told about.
#[derive(Debug, Clone, PartialEq)]
pub enum FocusUpdate {
    Timer(TimerSnapshot),
    SessionRecorded(FocusSession),
    Distraction { count: u32, pet: PetState },
    PetChanged(PetState),
}

/// The part of the app the event pump needs. Holds no timer handle, so dropping the app
/// closes the event channel and ends the pump.
#[derive(Clone)]
struct SessionRecorder {
    data: Arc<Mutex<FocusSnapshot>>,
    persistence: Persistence,
    notifier: Arc<dyn Notifier>,
    updates: broadcast::Sender<FocusUpdate>,
}

impl SessionRecorder {
    async fn handle(&self, event: TimerEvent) {
        match event {
            TimerEvent::Tick(snapshot) | TimerEvent::StateChanged(snapshot) => {
                self.publish(FocusUpdate::Timer(snapshot));
            }
            TimerEvent::Completed {
                mode,
                minutes,
                distractions,
            } => self.record_completion(mode, minutes, distractions, Utc::now()).await,
            TimerEvent::Distraction { count } => self.record_distraction(count).await,
        }
    }

    async fn record_completion(
        &self,
        mode: TimerMode,
        minutes: u32,
        distractions: u32,
        date: DateTime<Utc>,
    ) {
        let session = FocusSession::completed(mode, minutes, distractions, date);
        let pet = {
            let mut data = self.data.lock().await;
            data.pet.on_session_complete(minutes);
            data.sessions.push(session.clone());
            self.persistence.save(&*data).await;
            data.pet.clone()
        };

        log_info!(
            "Session recorded: {} minutes, {} distractions, pet level {}",
            minutes,
            distractions,
            pet.level()
        );
        self.publish(FocusUpdate::SessionRecorded(session));
        self.publish(FocusUpdate::PetChanged(pet));
    }

    async fn record_distraction(&self, count: u32) {
        let (pet, notify) = {
            let mut data = self.data.lock().await;
            let strict = data.settings.strict_mode;
            data.pet.on_distraction(strict);
            self.persistence.save(&*data).await;
            (data.pet.clone(), data.settings.notifications_enabled)
        };

        if notify {
            self.notifier
                .notify(DISTRACTION_TITLE, &distraction_body(&pet.name));
        }
        self.publish(FocusUpdate::Distraction { count, pet });
    }

    fn publish(&self, update: FocusUpdate) {
        // No subscribers is fine.
        let _ = self.updates.send(update);
    }
}

#[derive(Clone)]
pub struct FocusApp {
    recorder: SessionRecorder,
    timer: TimerController,
    gateway: Arc<AiGateway>,
    config: AppConfig,
    coaching: RequestTracker,
    pump: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl FocusApp {
    /// Loads the stored snapshot (or defaults) and starts the event pump.
    pub async fn load(
        persistence: Persistence,
        gateway: Arc<AiGateway>,
        notifier: Arc<dyn Notifier>,
        config: AppConfig,
    ) -> Self {
        let snapshot: FocusSnapshot = persistence.load().await;
        let (timer, events) = TimerController::new(
            TimerMode::Pomodoro,
            DEFAULT_DURATION_MINUTES,
            config.tick_interval(),
        );
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        let recorder = SessionRecorder {
            data: Arc::new(Mutex::new(snapshot)),
            persistence,
            notifier,
            updates,
        };
        let pump = spawn_pump(recorder.clone(), events);

        Self {
            recorder,
            timer,
            gateway,
            config,
            coaching: RequestTracker::new(),
            pump: Arc::new(std::sync::Mutex::new(Some(pump))),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FocusUpdate> {
        self.recorder.updates.subscribe()
    }

    pub fn timer(&self) -> &TimerController {
        &self.timer
    }

    pub async fn start_timer(&self) -> Result<TimerState> {
        self.timer.start().await
    }

    pub async fn stop_timer(&self) -> Result<TimerState> {
        self.timer.stop().await
    }

    pub async fn change_duration(&self, minutes: u32) -> Result<TimerState> {
        self.timer.change_duration(minutes).await
    }

    pub async fn switch_mode(&self, mode: TimerMode) -> Result<TimerState> {
        self.timer.switch_mode(mode).await
    }

    pub async fn set_visibility(&self, visibility: Visibility) -> bool {
        self.timer.set_visibility(visibility).await
    }

    pub async fn snapshot(&self) -> FocusSnapshot {
        self.recorder.data.lock().await.clone()
    }

    pub async fn pet(&self) -> PetState {
        self.recorder.data.lock().await.pet.clone()
    }

    pub async fn sessions(&self) -> Vec<FocusSession> {
        self.recorder.data.lock().await.sessions.clone()
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> FocusStats {
        let data = self.recorder.data.lock().await;
        stats::compute(&data.sessions, data.settings.daily_goal_minutes, now)
    }

    pub async fn update_settings<F>(&self, change: F) -> FocusSettings
    where
        F: FnOnce(&mut FocusSettings),
    {
        let mut data = self.recorder.data.lock().await;
        change(&mut data.settings);
        self.recorder.persistence.save(&*data).await;
        data.settings.clone()
    }

    pub async fn rename_pet(&self, name: &str) -> Result<PetState> {
        let name = name.trim();
        if name.is_empty() {
            bail!("pet name must not be empty");
        }
        let pet = {
            let mut data = self.recorder.data.lock().await;
            data.pet.name = name.to_string();
            self.recorder.persistence.save(&*data).await;
            data.pet.clone()
        };
        self.recorder.publish(FocusUpdate::PetChanged(pet.clone()));
        Ok(pet)
    }

    /// Adds `site` in normalised form. Returns `false` if it was already listed.
    pub async fn add_blocked_site(&self, site: &str) -> Result<bool> {
        let site = normalize_site(site);
        if site.is_empty() {
            bail!("site must not be empty");
        }

        let mut data = self.recorder.data.lock().await;
        if data.settings.blocklist.contains(&site) {
            return Ok(false);
        }
        data.settings.blocklist.push(site);
        self.recorder.persistence.save(&*data).await;
        Ok(true)
    }

    pub async fn remove_blocked_site(&self, site: &str) -> bool {
        let site = normalize_site(site);
        let mut data = self.recorder.data.lock().await;
        let before = data.settings.blocklist.len();
        data.settings.blocklist.retain(|entry| *entry != site);
        if data.settings.blocklist.len() == before {
            return false;
        }
        self.recorder.persistence.save(&*data).await;
        true
    }

    /// A short message from the pet. `None` when a newer coaching request superseded
    /// this one before it finished.
    pub async fn coaching(&self) -> Option<String> {
        let ticket = self.coaching.begin();
        let (pet, last_session, blocklist, api_key) = {
            let data = self.recorder.data.lock().await;
            (
                data.pet.clone(),
                data.sessions.last().cloned(),
                data.settings.blocklist.clone(),
                self.config
                    .effective_api_key(&data.settings.api_key)
                    .to_string(),
            )
        };

        let message = self
            .gateway
            .pet_coaching_or_fallback(&api_key, &pet, last_session.as_ref(), &blocklist)
            .await;

        if ticket.is_current() {
            Some(message)
        } else {
            log_warn!("Dropping superseded coaching reply");
            None
        }
    }

    pub async fn export(&self, dir: &Path) -> Result<PathBuf> {
        let snapshot = self.snapshot().await;
        self.recorder.persistence.export(&snapshot, dir).await
    }

    /// Replaces all app data with the backup at `path`.
    pub async fn import(&self, path: &Path) -> Result<(), ImportError> {
        let imported: FocusSnapshot = self.recorder.persistence.import(path).await?;
        let pet = imported.pet.clone();
        {
            let mut data = self.recorder.data.lock().await;
            *data = imported;
            self.recorder.persistence.save(&*data).await;
        }
        self.recorder.publish(FocusUpdate::PetChanged(pet));
        Ok(())
    }

    /// Stops the ticker and the event pump. Pending events are dropped.
    pub async fn shutdown(&self) {
        self.coaching.invalidate();
        self.timer.shutdown().await;
        let pump = match self.pump.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = pump {
            handle.abort();
        }
    }
}

fn spawn_pump(
    recorder: SessionRecorder,
    mut events: mpsc::UnboundedReceiver<TimerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            recorder.handle(event).await;
        }
    })
}

fn normalize_site(site: &str) -> String {
    site.trim().to_lowercase()
}
