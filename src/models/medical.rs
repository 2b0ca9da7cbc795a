//! Docbook records.
//!
//! Listings and diagnoses come from free model output, so they are built from loose
//! JSON values field by field and never fail: anything missing gets an empty default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which directory a listing belongs to. Drives the prompt and the search-link suffix.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingKind {
    Doctor,
    Hospital,
    Therapy,
    Lab,
    Donation,
}

impl ListingKind {
    pub fn search_suffix(self) -> &'static str {
        match self {
            ListingKind::Doctor => "appointment booking",
            ListingKind::Lab => "test booking contact",
            ListingKind::Donation => "contact number location",
            ListingKind::Hospital => "emergency contact directions",
            ListingKind::Therapy => "therapy session booking",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DonationKind {
    Blood,
    Organ,
}

impl DonationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DonationKind::Blood => "BLOOD",
            DonationKind::Organ => "ORGAN",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderListing {
    pub id: String,
    pub name: String,
    pub specialty: String,
    pub location: String,
    pub rating: Option<f64>,
    pub gender: String,
    pub bio: String,
    pub phone: String,
    pub email: String,
    pub website: String,
    pub map_url: String,
    pub available_slots: Vec<String>,
}

impl ProviderListing {
    /// `index` seeds the id when the model omitted one.
    pub fn from_value(index: usize, value: &Value) -> Self {
        let id = match value.get("id") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => format!("result-{index}"),
        };

        Self {
            id,
            name: text_field(value, "name"),
            specialty: text_field(value, "specialty"),
            location: text_field(value, "location"),
            rating: number_field(value, "rating"),
            gender: text_field(value, "gender"),
            bio: text_field(value, "bio"),
            phone: text_field(value, "phone"),
            email: text_field(value, "email"),
            website: text_field(value, "website"),
            map_url: text_field(value, "mapUrl"),
            available_slots: string_list(value, "availableSlots"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Likelihood {
    High,
    Medium,
    Low,
    Unknown,
}

impl Likelihood {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Likelihood::High,
            "medium" | "moderate" => Likelihood::Medium,
            "low" => Likelihood::Low,
            _ => Likelihood::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisEntry {
    pub condition: String,
    pub likelihood: Likelihood,
    pub reasoning: String,
    pub recommendation: String,
}

impl DiagnosisEntry {
    pub fn from_value(value: &Value) -> Self {
        Self {
            condition: text_field(value, "condition"),
            likelihood: Likelihood::parse(&text_field(value, "likelihood")),
            reasoning: text_field(value, "reasoning"),
            recommendation: text_field(value, "recommendation"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Upcoming,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    #[serde(alias = "doctorId")]
    pub provider_id: String,
    #[serde(alias = "doctorName")]
    pub provider_name: String,
    #[serde(alias = "doctorSpecialty")]
    pub provider_specialty: String,
    pub date: DateTime<Utc>,
    pub time_slot: String,
    pub status: AppointmentStatus,
    pub symptoms: String,
    #[serde(alias = "type")]
    pub kind: ListingKind,
    pub booking_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub sender: String,
    pub text: String,
}

fn text_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn number_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    match value.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}
