use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use focuspal_lib::{
    ai::{AiGateway, ContentPart, GatewayError, GenerativeModel, ModelNames},
    app::{DirectorySearch, DocbookApp, FocusApp},
    config::AppConfig,
    models::{DonationKind, ListingKind, ProviderListing},
    notify::LogNotifier,
    storage::{
        DocbookSnapshot, FocusSnapshot, LocalStorage, MemoryStorage, Persistence, Snapshot,
        SqliteStorage,
    },
    timer::{TimerMode, TimerStatus, Visibility},
};
use tempfile::tempdir;

struct CannedModel {
    reply: String,
    calls: AtomicUsize,
}

impl CannedModel {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl GenerativeModel for CannedModel {
    async fn generate_content(
        &self,
        _api_key: &str,
        _model: &str,
        _parts: Vec<ContentPart>,
    ) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

fn gateway(model: Arc<CannedModel>) -> Arc<AiGateway> {
    Arc::new(AiGateway::new(model, ModelNames::default()))
}

async fn focus_app(persistence: Persistence) -> FocusApp {
    FocusApp::load(
        persistence,
        gateway(CannedModel::new("Go!")),
        Arc::new(LogNotifier),
        AppConfig::default(),
    )
    .await
}

#[tokio::test(start_paused = true)]
async fn pomodoro_with_distraction_records_one_session() {
    let app = focus_app(Persistence::new(Arc::new(MemoryStorage::new()))).await;
    app.change_duration(2).await.unwrap();
    app.start_timer().await.unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(app.set_visibility(Visibility::Hidden).await);
    app.set_visibility(Visibility::Visible).await;
    tokio::time::sleep(Duration::from_secs(100)).await;

    let snapshot = app.snapshot().await;
    assert_eq!(snapshot.sessions.len(), 1);
    assert_eq!(snapshot.sessions[0].duration_minutes, 2);
    assert_eq!(snapshot.sessions[0].distractions, 1);
    assert_eq!(snapshot.sessions[0].mode, TimerMode::Pomodoro);
    // 100 - 2 + 5, capped at 100.
    assert_eq!(snapshot.pet.health, 100.0);
    assert_eq!(snapshot.pet.experience, 20.0);

    let timer = app.timer().get_state().await;
    assert_eq!(timer.status, TimerStatus::Ready);
    assert_eq!(timer.remaining_secs, 120);
    app.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn stopwatch_never_records_a_session() {
    let app = focus_app(Persistence::new(Arc::new(MemoryStorage::new()))).await;
    app.switch_mode(TimerMode::Stopwatch).await.unwrap();
    app.start_timer().await.unwrap();

    tokio::time::sleep(Duration::from_millis(125_500)).await;
    assert_eq!(app.timer().get_state().await.elapsed_secs, 125);
    let stopped = app.stop_timer().await.unwrap();
    assert_eq!(stopped.elapsed_secs, 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(app.sessions().await.is_empty());
}

#[tokio::test]
async fn focus_backup_restores_into_fresh_database() {
    let dir = tempdir().unwrap();
    let source = SqliteStorage::open(dir.path().join("a.sqlite3"), "focuspal").unwrap();
    let app = focus_app(Persistence::new(Arc::new(source))).await;
    app.add_blocked_site("reddit.com").await.unwrap();
    app.update_settings(|s| s.daily_goal_minutes = 90).await;
    let exported = app.export(dir.path()).await.unwrap();
    let original: FocusSnapshot = app.snapshot().await;

    let target = SqliteStorage::open(dir.path().join("b.sqlite3"), "focuspal").unwrap();
    let restored = focus_app(Persistence::new(Arc::new(target.clone()))).await;
    restored.import(&exported).await.unwrap();
    assert_eq!(restored.snapshot().await, original);

    let reloaded = focus_app(Persistence::new(Arc::new(target))).await;
    assert_eq!(reloaded.snapshot().await, original);
}

#[tokio::test]
async fn docbook_import_rejects_foreign_files() {
    let dir = tempdir().unwrap();
    let storage = SqliteStorage::open(dir.path().join("db.sqlite3"), "docbook").unwrap();
    let app = DocbookApp::load(
        Persistence::new(Arc::new(storage)),
        gateway(CannedModel::new("[]")),
        AppConfig::default(),
    )
    .await;

    let focus_backup = dir.path().join("focus.json");
    std::fs::write(
        &focus_backup,
        serde_json::to_string(&FocusSnapshot::default()).unwrap(),
    )
    .unwrap();
    assert!(app.import(&focus_backup).await.is_err());
    assert_eq!(app.snapshot().await, DocbookSnapshot::default());
}

#[tokio::test]
async fn config_key_is_used_when_profile_has_none() {
    let model = CannedModel::new(
        r#"Sure! {"centers": [{"name": "City Blood Bank", "location": "Lima", "mapUrl": "http://x"}]}"#,
    );
    let config = AppConfig {
        api_key: "from-config".into(),
        ..AppConfig::default()
    };
    let app = DocbookApp::load(
        Persistence::new(Arc::new(MemoryStorage::new())),
        gateway(model.clone()),
        config,
    )
    .await;

    let listings = app
        .search(DirectorySearch::Donation {
            kind: DonationKind::Blood,
            location: "Lima".into(),
            blood_group: Some("O+".into()),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    assert_eq!(listings[0].id, "result-0");
    assert_eq!(
        listings[0].map_url,
        "https://www.google.com/maps/dir/?api=1&destination=City%20Blood%20Bank%20Lima"
    );

    let appointment = app
        .book(&listings[0], "Walk-in", "", ListingKind::Donation)
        .await;
    assert_eq!(appointment.booking_url, listings[0].website);
}

#[tokio::test]
async fn blank_keys_everywhere_mean_no_calls() {
    let model = CannedModel::new("[]");
    let app = DocbookApp::load(
        Persistence::new(Arc::new(MemoryStorage::new())),
        gateway(model.clone()),
        AppConfig::default(),
    )
    .await;

    assert!(matches!(app.diagnose("cough").await, Err(GatewayError::CredentialsMissing)));
    assert!(matches!(
        app.analyze_certificate(b"img", "image/png").await,
        Err(GatewayError::CredentialsMissing)
    ));
    assert_eq!(
        app.chat("hello").await.as_deref(),
        Some("Please set your API Key in Profile.")
    );
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

/// Holds back its first write long enough for a second one to finish.
#[derive(Default)]
struct LaggingStorage {
    inner: MemoryStorage,
    lagged: AtomicBool,
}

#[async_trait]
impl LocalStorage for LaggingStorage {
    async fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()> {
        if !self.lagged.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> anyhow::Result<()> {
        self.inner.remove_item(key).await
    }
}

#[tokio::test]
async fn overlapping_bookings_are_all_stored() {
    let storage = Arc::new(LaggingStorage::default());
    let app = DocbookApp::load(
        Persistence::new(storage.clone()),
        gateway(CannedModel::new("[]")),
        AppConfig::default(),
    )
    .await;

    let clinic = ProviderListing::from_value(0, &serde_json::json!({"name": "Clinic"}));
    let lab = ProviderListing::from_value(1, &serde_json::json!({"name": "Lab"}));
    tokio::join!(
        app.book(&clinic, "9:00", "", ListingKind::Doctor),
        app.book(&lab, "10:00", "", ListingKind::Lab),
    );

    let stored = storage
        .inner
        .get_item(DocbookSnapshot::STORAGE_KEY)
        .await
        .unwrap()
        .unwrap();
    let stored: DocbookSnapshot = serde_json::from_str(&stored).unwrap();
    assert_eq!(stored.appointments.len(), 2);
    assert_eq!(stored, app.snapshot().await);
}
