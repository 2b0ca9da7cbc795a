use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Result};
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    ai::{normalize, AiGateway, GatewayResult, RequestTracker},
    config::AppConfig,
    log_debug, log_info,
    models::{
        Appointment, AppointmentStatus, ChatTurn, DiagnosisEntry, DocbookSettings, DonationKind,
        ListingKind, ProviderListing,
    },
    storage::{DocbookSnapshot, ImportError, Persistence},
};

const ENABLE_LOGS: bool = true;

pub const USER_SENDER: &str = "user";
pub const AI_SENDER: &str = "ai";

/// One directory lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectorySearch {
    Doctors {
        symptoms: String,
        location: String,
        preferred_gender: String,
    },
    Hospitals {
        need: String,
        location: String,
    },
    Therapists {
        issue: String,
        location: String,
    },
    Labs {
        test_type: String,
        location: String,
    },
    Donation {
        kind: DonationKind,
        location: String,
        blood_group: Option<String>,
    },
}

impl DirectorySearch {
    pub fn kind(&self) -> ListingKind {
        match self {
            DirectorySearch::Doctors { .. } => ListingKind::Doctor,
            DirectorySearch::Hospitals { .. } => ListingKind::Hospital,
            DirectorySearch::Therapists { .. } => ListingKind::Therapy,
            DirectorySearch::Labs { .. } => ListingKind::Lab,
            DirectorySearch::Donation { .. } => ListingKind::Donation,
        }
    }
}

/// Medical directory app: profile, tracked appointments and AI lookups.
///
/// Each lookup family has its own [`RequestTracker`], so a newer search only supersedes
/// older searches and never an in-flight diagnosis. Superseded results come back as
/// `Ok(None)`. Mutations hold the data lock until their save lands, so writes reach
/// storage in the order they were made.
#[derive(Clone)]
pub struct DocbookApp {
    data: Arc<Mutex<DocbookSnapshot>>,
    chat_history: Arc<Mutex<Vec<ChatTurn>>>,
    persistence: Persistence,
    gateway: Arc<AiGateway>,
    config: AppConfig,
    searches: RequestTracker,
    diagnoses: RequestTracker,
}

impl DocbookApp {
    pub async fn load(persistence: Persistence, gateway: Arc<AiGateway>, config: AppConfig) -> Self {
        let snapshot: DocbookSnapshot = persistence.load().await;
        Self {
            data: Arc::new(Mutex::new(snapshot)),
            chat_history: Arc::new(Mutex::new(Vec::new())),
            persistence,
            gateway,
            config,
            searches: RequestTracker::new(),
            diagnoses: RequestTracker::new(),
        }
    }

    pub async fn snapshot(&self) -> DocbookSnapshot {
        self.data.lock().await.clone()
    }

    pub async fn settings(&self) -> DocbookSettings {
        self.data.lock().await.settings.clone()
    }

    pub async fn appointments(&self) -> Vec<Appointment> {
        self.data.lock().await.appointments.clone()
    }

    pub async fn update_settings<F>(&self, change: F) -> DocbookSettings
    where
        F: FnOnce(&mut DocbookSettings),
    {
        let mut data = self.data.lock().await;
        change(&mut data.settings);
        self.persistence.save(&*data).await;
        data.settings.clone()
    }

    pub async fn complete_onboarding(&self, username: &str, age: &str, gender: &str) -> DocbookSettings {
        let (username, age, gender) = (username.trim(), age.trim(), gender.trim());
        self.update_settings(|settings| {
            settings.username = username.to_string();
            settings.age = age.to_string();
            if !gender.is_empty() {
                settings.gender = gender.to_string();
            }
            settings.onboarding_complete = true;
        })
        .await
    }

    pub async fn search(&self, query: DirectorySearch) -> GatewayResult<Option<Vec<ProviderListing>>> {
        let ticket = self.searches.begin();
        let api_key = self.api_key().await;

        let result = match &query {
            DirectorySearch::Doctors {
                symptoms,
                location,
                preferred_gender,
            } => {
                self.gateway
                    .find_doctors(&api_key, symptoms, location, preferred_gender)
                    .await
            }
            DirectorySearch::Hospitals { need, location } => {
                self.gateway.find_hospitals(&api_key, need, location).await
            }
            DirectorySearch::Therapists { issue, location } => {
                self.gateway.find_therapists(&api_key, issue, location).await
            }
            DirectorySearch::Labs {
                test_type,
                location,
            } => self.gateway.find_labs(&api_key, test_type, location).await,
            DirectorySearch::Donation {
                kind,
                location,
                blood_group,
            } => {
                self.gateway
                    .find_donation_centers(&api_key, *kind, location, blood_group.as_deref())
                    .await
            }
        };

        if !ticket.is_current() {
            log_debug!("Dropping superseded {:?} search result", query.kind());
            return Ok(None);
        }
        result.map(Some)
    }

    pub async fn diagnose(&self, description: &str) -> GatewayResult<Option<Vec<DiagnosisEntry>>> {
        let ticket = self.diagnoses.begin();
        let api_key = self.api_key().await;
        let result = self.gateway.diagnose(&api_key, description).await;
        if !ticket.is_current() {
            return Ok(None);
        }
        result.map(Some)
    }

    pub async fn analyze_certificate(&self, image: &[u8], mime_type: &str) -> GatewayResult<String> {
        let api_key = self.api_key().await;
        self.gateway
            .analyze_certificate(&api_key, image, mime_type)
            .await
    }

    /// Sends `message` with the conversation so far and records both turns. Blank
    /// messages are ignored and yield `None`.
    pub async fn chat(&self, message: &str) -> Option<String> {
        let message = message.trim();
        if message.is_empty() {
            return None;
        }

        let api_key = self.api_key().await;
        let history = self.chat_history.lock().await.clone();
        self.push_turn(USER_SENDER, message).await;

        let reply = self
            .gateway
            .chat_or_fallback(&api_key, message, &history)
            .await;
        self.push_turn(AI_SENDER, &reply).await;
        Some(reply)
    }

    pub async fn chat_history(&self) -> Vec<ChatTurn> {
        self.chat_history.lock().await.clone()
    }

    /// Tracks an appointment with `provider`. The booking link is the provider's website,
    /// or a search link when the provider has none.
    pub async fn book(
        &self,
        provider: &ProviderListing,
        time_slot: &str,
        symptoms: &str,
        kind: ListingKind,
    ) -> Appointment {
        let booking_url = if provider.website.trim().is_empty() {
            normalize::search_url(&provider.name, &provider.location, kind)
        } else {
            provider.website.clone()
        };

        let appointment = Appointment {
            id: Uuid::new_v4().to_string(),
            provider_id: provider.id.clone(),
            provider_name: provider.name.clone(),
            provider_specialty: provider.specialty.clone(),
            date: Utc::now(),
            time_slot: time_slot.to_string(),
            status: AppointmentStatus::Upcoming,
            symptoms: symptoms.to_string(),
            kind,
            booking_url,
        };

        {
            let mut data = self.data.lock().await;
            data.appointments.push(appointment.clone());
            self.persistence.save(&*data).await;
        }
        log_info!("Tracked appointment with {}", appointment.provider_name);
        appointment
    }

    pub async fn cancel_appointment(&self, id: &str) -> Result<()> {
        let mut data = self.data.lock().await;
        let before = data.appointments.len();
        data.appointments.retain(|appointment| appointment.id != id);
        if data.appointments.len() == before {
            return Err(anyhow!("no appointment with id {id}"));
        }
        self.persistence.save(&*data).await;
        Ok(())
    }

    pub async fn export(&self, dir: &Path) -> Result<PathBuf> {
        let snapshot = self.snapshot().await;
        self.persistence.export(&snapshot, dir).await
    }

    pub async fn import(&self, path: &Path) -> Result<(), ImportError> {
        let imported: DocbookSnapshot = self.persistence.import(path).await?;
        let mut data = self.data.lock().await;
        *data = imported;
        self.persistence.save(&*data).await;
        Ok(())
    }

    /// Drops every in-flight result.
    pub fn shutdown(&self) {
        self.searches.invalidate();
        self.diagnoses.invalidate();
    }

    async fn api_key(&self) -> String {
        let data = self.data.lock().await;
        self.config
            .effective_api_key(&data.settings.api_key)
            .to_string()
    }

    async fn push_turn(&self, sender: &str, text: &str) {
        self.chat_history.lock().await.push(ChatTurn {
            sender: sender.to_string(),
            text: text.to_string(),
        });
    }
}
