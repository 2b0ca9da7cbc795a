use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use log::{error, warn};
use thiserror::Error;

use crate::models::{
    ChatTurn, DiagnosisEntry, DonationKind, FocusSession, ListingKind, PetState, ProviderListing,
};

use super::{
    client::{ContentPart, GenerativeModel},
    normalize, prompts,
};

pub const CHAT_NO_KEY_REPLY: &str = "Please set your API Key in Profile.";
pub const CHAT_EMPTY_REPLY: &str = "I didn't catch that.";
pub const CHAT_FAILURE_REPLY: &str = "Sorry, I couldn't reach the assistant. Please try again.";
pub const CERTIFICATE_EMPTY_REPLY: &str = "Could not analyze image.";
pub const COACHING_NO_KEY_REPLY: &str = "Let's focus together! (Add API Key in settings)";
pub const COACHING_EMPTY_REPLY: &str = "Let's focus together!";
pub const COACHING_FAILURE_REPLY: &str = "I'm ready to focus when you are!";

/// Every way a gateway call can fail. Callers branch on this instead of inspecting
/// empty results.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("API key is missing")]
    CredentialsMissing,
    #[error("model request failed: {0}")]
    Network(String),
    #[error("model response could not be parsed: {0}")]
    Parse(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone)]
pub struct ModelNames {
    pub text: String,
    pub image: String,
}

impl Default for ModelNames {
    fn default() -> Self {
        Self {
            text: "gemini-2.5-flash".into(),
            image: "gemini-2.5-flash-image".into(),
        }
    }
}

/// Builds prompts, makes exactly one model call per operation and normalises the reply.
pub struct AiGateway {
    model: Arc<dyn GenerativeModel>,
    names: ModelNames,
}

impl AiGateway {
    pub fn new(model: Arc<dyn GenerativeModel>, names: ModelNames) -> Self {
        Self { model, names }
    }

    pub async fn find_doctors(
        &self,
        api_key: &str,
        symptoms: &str,
        location: &str,
        preferred_gender: &str,
    ) -> GatewayResult<Vec<ProviderListing>> {
        let prompt = prompts::doctors(symptoms, location, preferred_gender);
        self.listings(api_key, prompt, ListingKind::Doctor).await
    }

    pub async fn find_hospitals(
        &self,
        api_key: &str,
        need: &str,
        location: &str,
    ) -> GatewayResult<Vec<ProviderListing>> {
        self.listings(api_key, prompts::hospitals(need, location), ListingKind::Hospital)
            .await
    }

    pub async fn find_therapists(
        &self,
        api_key: &str,
        issue: &str,
        location: &str,
    ) -> GatewayResult<Vec<ProviderListing>> {
        self.listings(api_key, prompts::therapists(issue, location), ListingKind::Therapy)
            .await
    }

    pub async fn find_labs(
        &self,
        api_key: &str,
        test_type: &str,
        location: &str,
    ) -> GatewayResult<Vec<ProviderListing>> {
        self.listings(api_key, prompts::labs(test_type, location), ListingKind::Lab)
            .await
    }

    pub async fn find_donation_centers(
        &self,
        api_key: &str,
        kind: DonationKind,
        location: &str,
        blood_group: Option<&str>,
    ) -> GatewayResult<Vec<ProviderListing>> {
        let prompt = prompts::donation_centers(kind, location, blood_group);
        self.listings(api_key, prompt, ListingKind::Donation).await
    }

    pub async fn diagnose(
        &self,
        api_key: &str,
        description: &str,
    ) -> GatewayResult<Vec<DiagnosisEntry>> {
        let text = self
            .call(api_key, &self.names.text, vec![ContentPart::text(prompts::diagnosis(description))])
            .await?;
        let records = normalize::extract_records(&text)
            .map_err(|err| GatewayError::Parse(err.to_string()))?;
        Ok(records
            .iter()
            .filter(|record| record.is_object())
            .map(DiagnosisEntry::from_value)
            .collect())
    }

    /// Sends the image inline together with extraction instructions.
    pub async fn analyze_certificate(
        &self,
        api_key: &str,
        image: &[u8],
        mime_type: &str,
    ) -> GatewayResult<String> {
        let parts = vec![
            ContentPart::inline(mime_type, image),
            ContentPart::text(prompts::CERTIFICATE_INSTRUCTIONS),
        ];
        let text = self.call(api_key, &self.names.image, parts).await?;
        Ok(non_empty_or(text, CERTIFICATE_EMPTY_REPLY))
    }

    pub async fn chat(
        &self,
        api_key: &str,
        message: &str,
        history: &[ChatTurn],
    ) -> GatewayResult<String> {
        let prompt = prompts::chat(message, history);
        let text = self
            .call(api_key, &self.names.text, vec![ContentPart::text(prompt)])
            .await?;
        Ok(non_empty_or(text, CHAT_EMPTY_REPLY))
    }

    /// Chat that always produces a reply to show.
    pub async fn chat_or_fallback(&self, api_key: &str, message: &str, history: &[ChatTurn]) -> String {
        match self.chat(api_key, message, history).await {
            Ok(reply) => reply,
            Err(GatewayError::CredentialsMissing) => CHAT_NO_KEY_REPLY.to_string(),
            Err(_) => CHAT_FAILURE_REPLY.to_string(),
        }
    }

    pub async fn pet_coaching(
        &self,
        api_key: &str,
        pet: &PetState,
        last_session: Option<&FocusSession>,
        blocklist: &[String],
    ) -> GatewayResult<String> {
        let prompt = prompts::pet_coaching(pet, last_session, blocklist);
        let text = self
            .call(api_key, &self.names.text, vec![ContentPart::text(prompt)])
            .await?;
        Ok(non_empty_or(text, COACHING_EMPTY_REPLY))
    }

    pub async fn pet_coaching_or_fallback(
        &self,
        api_key: &str,
        pet: &PetState,
        last_session: Option<&FocusSession>,
        blocklist: &[String],
    ) -> String {
        match self.pet_coaching(api_key, pet, last_session, blocklist).await {
            Ok(message) => message,
            Err(GatewayError::CredentialsMissing) => COACHING_NO_KEY_REPLY.to_string(),
            Err(_) => COACHING_FAILURE_REPLY.to_string(),
        }
    }

    async fn listings(
        &self,
        api_key: &str,
        prompt: String,
        kind: ListingKind,
    ) -> GatewayResult<Vec<ProviderListing>> {
        let text = self
            .call(api_key, &self.names.text, vec![ContentPart::text(prompt)])
            .await?;
        let records = normalize::normalize_listings(&text, kind)
            .map_err(|err| GatewayError::Parse(err.to_string()))?;

        Ok(records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.is_object())
            .map(|(index, record)| ProviderListing::from_value(index, record))
            .collect())
    }

    /// Checks the key, then makes the one and only attempt.
    async fn call(&self, api_key: &str, model: &str, parts: Vec<ContentPart>) -> GatewayResult<String> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            warn!("AI request rejected: API key is missing");
            return Err(GatewayError::CredentialsMissing);
        }

        self.model
            .generate_content(api_key, model, parts)
            .await
            .map_err(|err| {
                error!("AI request to {model} failed: {err:#}");
                GatewayError::Network(err.to_string())
            })
    }
}

fn non_empty_or(text: String, fallback: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Hands out request generations so only the newest in-flight result is applied.
#[derive(Debug, Clone, Default)]
pub struct RequestTracker {
    generation: Arc<AtomicU64>,
}

#[derive(Debug, Clone)]
pub struct RequestTicket {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new request, superseding every earlier ticket.
    pub fn begin(&self) -> RequestTicket {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        RequestTicket {
            generation,
            current: self.generation.clone(),
        }
    }

    /// Supersedes all outstanding tickets without starting a request (view teardown).
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

impl RequestTicket {
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedModel {
        reply: Result<String, String>,
        calls: Mutex<Vec<(String, usize)>>,
    }

    impl ScriptedModel {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl GenerativeModel for ScriptedModel {
        async fn generate_content(
            &self,
            _api_key: &str,
            model: &str,
            parts: Vec<ContentPart>,
        ) -> anyhow::Result<String> {
            self.calls.lock().unwrap().push((model.to_string(), parts.len()));
            self.reply.clone().map_err(|e| anyhow!(e))
        }
    }

    fn gateway(model: Arc<ScriptedModel>) -> AiGateway {
        AiGateway::new(model, ModelNames::default())
    }

    #[tokio::test]
    async fn empty_key_is_rejected_before_any_call() {
        let model = ScriptedModel::replying("[]");
        let gw = gateway(model.clone());

        let result = gw.find_doctors("  ", "fever", "Boston", "Any").await;
        assert!(matches!(result, Err(GatewayError::CredentialsMissing)));
        assert_eq!(model.call_count(), 0);
        assert_eq!(gw.chat_or_fallback("", "hi", &[]).await, CHAT_NO_KEY_REPLY);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn doctor_search_returns_linked_listings() {
        let model = ScriptedModel::replying(
            "```json\n{\"doctors\": [{\"id\": 7, \"name\": \"Dr. Ada\", \"location\": \"Austin\", \"website\": \"x\"}]}\n```",
        );
        let gw = gateway(model.clone());

        let listings = gw.find_doctors("key", "migraine", "Austin", "Any").await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].id, "7");
        assert!(listings[0].website.starts_with("https://www.google.com/search?q=Dr.%20Ada"));
        assert!(listings[0].map_url.contains("destination=Dr.%20Ada%20Austin"));
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn network_and_parse_failures_are_distinct() {
        let gw = gateway(ScriptedModel::failing("connection reset"));
        assert!(matches!(
            gw.find_labs("key", "CBC", "Delhi").await,
            Err(GatewayError::Network(_))
        ));

        let gw = gateway(ScriptedModel::replying("No results today."));
        assert!(matches!(
            gw.find_labs("key", "CBC", "Delhi").await,
            Err(GatewayError::Parse(_))
        ));

        let gw = gateway(ScriptedModel::replying(""));
        assert!(gw.find_labs("key", "CBC", "Delhi").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn diagnosis_entries_skip_link_synthesis() {
        let gw = gateway(ScriptedModel::replying(
            r#"[{"condition": "Tension headache", "likelihood": "Medium", "reasoning": "r", "recommendation": "rest"}]"#,
        ));
        let entries = gw.diagnose("key", "headache").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].condition, "Tension headache");
    }

    #[tokio::test]
    async fn certificate_uses_image_model_and_two_parts() {
        let model = ScriptedModel::replying("  ");
        let gw = gateway(model.clone());
        let summary = gw.analyze_certificate("key", b"png-bytes", "image/png").await.unwrap();
        assert_eq!(summary, CERTIFICATE_EMPTY_REPLY);
        let calls = model.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("gemini-2.5-flash-image".to_string(), 2)]);
    }

    #[tokio::test]
    async fn coaching_fallbacks() {
        let pet = PetState::default();
        let gw = gateway(ScriptedModel::failing("boom"));
        assert_eq!(
            gw.pet_coaching_or_fallback("key", &pet, None, &[]).await,
            COACHING_FAILURE_REPLY
        );
        assert_eq!(
            gw.pet_coaching_or_fallback("", &pet, None, &[]).await,
            COACHING_NO_KEY_REPLY
        );
    }

    #[test]
    fn newer_ticket_supersedes_older() {
        let tracker = RequestTracker::new();
        let first = tracker.begin();
        assert!(first.is_current());
        let second = tracker.begin();
        assert!(!first.is_current());
        assert!(second.is_current());
        tracker.invalidate();
        assert!(!second.is_current());
    }
}
