use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThemeType {
    Bubble,
    Minimal,
    Dark,
    Forest,
    Ocean,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PetType {
    Dog,
    Cat,
    Robot,
    Plant,
    Blob,
}

/// Settings of the focus app, persisted wholesale inside its snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FocusSettings {
    pub username: String,
    pub theme: ThemeType,
    pub pet_type: PetType,
    pub daily_goal_minutes: u32,
    /// Focus lock: distractions cost the pet more health.
    pub strict_mode: bool,
    pub blocklist: Vec<String>,
    pub sound_enabled: bool,
    pub api_key: String,
    pub notifications_enabled: bool,
    pub focus_start_hour: String,
    pub focus_end_hour: String,
    /// Minutes.
    pub daily_screen_time_limit: u32,
}

impl Default for FocusSettings {
    fn default() -> Self {
        Self {
            username: String::new(),
            theme: ThemeType::Bubble,
            pet_type: PetType::Cat,
            daily_goal_minutes: 120,
            strict_mode: false,
            blocklist: Vec::new(),
            sound_enabled: true,
            api_key: String::new(),
            notifications_enabled: true,
            focus_start_hour: "09:00".into(),
            focus_end_hour: "17:00".into(),
            daily_screen_time_limit: 240,
        }
    }
}

/// Profile of the medical directory app.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DocbookSettings {
    pub username: String,
    pub age: String,
    pub gender: String,
    pub api_key: String,
    pub notifications_enabled: bool,
    pub onboarding_complete: bool,
}

impl Default for DocbookSettings {
    fn default() -> Self {
        Self {
            username: String::new(),
            age: String::new(),
            gender: "Not Specified".into(),
            api_key: String::new(),
            notifications_enabled: false,
            onboarding_complete: false,
        }
    }
}
