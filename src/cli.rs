use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use crate::{
    ai::{AiGateway, GatewayError, GeminiClient, ModelNames},
    app::{DirectorySearch, DocbookApp, FocusApp, FocusUpdate},
    config::{resolve_data_dir, AppConfig, ConfigStore, STORAGE_FILE_NAME},
    models::{DonationKind, ProviderListing},
    notify::LogNotifier,
    storage::{Persistence, SqliteStorage},
    timer::{format_clock, TimerMode, TimerStatus, Visibility},
};

const FOCUS_NAMESPACE: &str = "focuspal";
const DOCBOOK_NAMESPACE: &str = "docbook";

#[derive(Debug, Parser)]
#[command(name = "focuspal", version, about = "Focus timer with a virtual pet, plus an AI medical directory")]
pub struct Cli {
    /// Where config and data live. Defaults to FOCUSPAL_DATA_DIR or the platform data dir.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a focus session. Type p (stop), s (start), h (hidden), v (visible), q (quit).
    Focus {
        #[arg(long, default_value_t = crate::timer::DEFAULT_DURATION_MINUTES)]
        minutes: u32,
        #[arg(long, value_enum, default_value_t = ModeArg::Pomodoro)]
        mode: ModeArg,
    },
    /// Show the pet.
    Pet {
        /// Rename the pet first.
        #[arg(long)]
        rename: Option<String>,
    },
    Stats,
    /// Ask the pet for a motivating line.
    Coach,
    Block {
        #[command(subcommand)]
        action: BlockAction,
    },
    Doctors {
        symptoms: String,
        #[arg(long)]
        location: String,
        #[arg(long, default_value = "Any")]
        gender: String,
    },
    Hospitals {
        need: String,
        #[arg(long)]
        location: String,
    },
    Therapists {
        issue: String,
        #[arg(long)]
        location: String,
    },
    Labs {
        test: String,
        #[arg(long)]
        location: String,
    },
    Donation {
        #[arg(value_enum)]
        kind: DonationArg,
        #[arg(long)]
        location: String,
        #[arg(long)]
        blood_group: Option<String>,
    },
    Diagnose {
        description: String,
    },
    /// Interactive medical chat. An empty line ends it.
    Chat,
    /// Summarise a medical certificate image.
    Scan {
        image: PathBuf,
        /// Overrides the type guessed from the file extension.
        #[arg(long)]
        mime: Option<String>,
    },
    /// Set up the docbook profile.
    Onboard {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        age: String,
        #[arg(long, default_value = "")]
        gender: String,
    },
    /// Store the fallback API key in config.json.
    SetKey {
        key: String,
    },
    Appointments,
    Cancel {
        id: String,
    },
    Export {
        #[arg(long, value_enum, default_value_t = AppArg::Focus)]
        app: AppArg,
        dir: Option<PathBuf>,
    },
    Import {
        #[arg(long, value_enum, default_value_t = AppArg::Focus)]
        app: AppArg,
        file: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
pub enum BlockAction {
    Add { site: String },
    Remove { site: String },
    List,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Pomodoro,
    Countdown,
    Stopwatch,
}

impl From<ModeArg> for TimerMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Pomodoro => TimerMode::Pomodoro,
            ModeArg::Countdown => TimerMode::Countdown,
            ModeArg::Stopwatch => TimerMode::Stopwatch,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DonationArg {
    Blood,
    Organ,
}

impl From<DonationArg> for DonationKind {
    fn from(kind: DonationArg) -> Self {
        match kind {
            DonationArg::Blood => DonationKind::Blood,
            DonationArg::Organ => DonationKind::Organ,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AppArg {
    Focus,
    Docbook,
}

/// Shared handles every command is built from.
struct Workspace {
    config_store: ConfigStore,
    config: AppConfig,
    storage: SqliteStorage,
    gateway: Arc<AiGateway>,
}

impl Workspace {
    fn open(data_dir: Option<&Path>) -> Result<Self> {
        let data_dir = resolve_data_dir(data_dir)?;
        let config_store = ConfigStore::open(&data_dir)?;
        let config = config_store.get();
        let storage = SqliteStorage::open(data_dir.join(STORAGE_FILE_NAME), FOCUS_NAMESPACE)?;
        let client = GeminiClient::new(config.api_base_url.clone(), config.request_timeout())?;
        let gateway = Arc::new(AiGateway::new(
            Arc::new(client),
            ModelNames {
                text: config.text_model.clone(),
                image: config.image_model.clone(),
            },
        ));
        Ok(Self {
            config_store,
            config,
            storage,
            gateway,
        })
    }

    async fn focus(&self) -> FocusApp {
        FocusApp::load(
            Persistence::new(Arc::new(self.storage.clone())),
            self.gateway.clone(),
            Arc::new(LogNotifier),
            self.config.clone(),
        )
        .await
    }

    async fn docbook(&self) -> DocbookApp {
        DocbookApp::load(
            Persistence::new(Arc::new(self.storage.with_namespace(DOCBOOK_NAMESPACE))),
            self.gateway.clone(),
            self.config.clone(),
        )
        .await
    }
}

pub async fn execute(cli: Cli) -> Result<()> {
    let ctx = Workspace::open(cli.data_dir.as_deref())?;

    match cli.command {
        Command::Focus { minutes, mode } => run_focus(&ctx.focus().await, minutes, mode.into()).await,
        Command::Pet { rename } => {
            let app = ctx.focus().await;
            let pet = match rename {
                Some(name) => app.rename_pet(&name).await?,
                None => app.pet().await,
            };
            println!("{} (level {})", pet.name, pet.level());
            println!(
                "  health {:.0}/100  happiness {:.0}/100  mood {:?}",
                pet.health,
                pet.happiness,
                pet.mood(false)
            );
            println!(
                "  xp {:.0} ({:.0} to next level)",
                pet.experience,
                pet.xp_to_next_level()
            );
            Ok(())
        }
        Command::Stats => {
            let stats = ctx.focus().await.stats(Utc::now()).await;
            println!(
                "Total focus: {} min over {} sessions ({} distractions)",
                stats.total_focus_minutes, stats.total_sessions, stats.total_distractions
            );
            println!(
                "Today: {}/{} min ({:.0}%)",
                stats.today_minutes, stats.daily_goal_minutes, stats.goal_progress_percent
            );
            for day in &stats.last_seven_days {
                println!("  {} {:>4} min", day.label, day.minutes);
            }
            Ok(())
        }
        Command::Coach => {
            if let Some(message) = ctx.focus().await.coaching().await {
                println!("{message}");
            }
            Ok(())
        }
        Command::Block { action } => {
            let app = ctx.focus().await;
            match action {
                BlockAction::Add { site } => {
                    if !app.add_blocked_site(&site).await? {
                        println!("Already blocked");
                    }
                }
                BlockAction::Remove { site } => {
                    if !app.remove_blocked_site(&site).await {
                        println!("Not in the blocklist");
                    }
                }
                BlockAction::List => {}
            }
            for site in app.snapshot().await.settings.blocklist {
                println!("{site}");
            }
            Ok(())
        }
        Command::Doctors {
            symptoms,
            location,
            gender,
        } => {
            search(
                &ctx,
                DirectorySearch::Doctors {
                    symptoms,
                    location,
                    preferred_gender: gender,
                },
            )
            .await
        }
        Command::Hospitals { need, location } => {
            search(&ctx, DirectorySearch::Hospitals { need, location }).await
        }
        Command::Therapists { issue, location } => {
            search(&ctx, DirectorySearch::Therapists { issue, location }).await
        }
        Command::Labs { test, location } => {
            search(
                &ctx,
                DirectorySearch::Labs {
                    test_type: test,
                    location,
                },
            )
            .await
        }
        Command::Donation {
            kind,
            location,
            blood_group,
        } => {
            search(
                &ctx,
                DirectorySearch::Donation {
                    kind: kind.into(),
                    location,
                    blood_group,
                },
            )
            .await
        }
        Command::Diagnose { description } => {
            let entries = ctx
                .docbook()
                .await
                .diagnose(&description)
                .await
                .map_err(explain)?
                .unwrap_or_default();
            for entry in entries {
                println!("{} [{:?}]", entry.condition, entry.likelihood);
                println!("  why: {}", entry.reasoning);
                println!("  next: {}", entry.recommendation);
            }
            println!("For informational purposes only. Consult a doctor.");
            Ok(())
        }
        Command::Chat => run_chat(&ctx.docbook().await).await,
        Command::Scan { image, mime } => {
            let mime = match mime {
                Some(mime) => mime,
                None => guess_mime(&image)?.to_string(),
            };
            let bytes = tokio::fs::read(&image)
                .await
                .with_context(|| format!("failed to read {}", image.display()))?;
            let summary = ctx
                .docbook()
                .await
                .analyze_certificate(&bytes, &mime)
                .await
                .map_err(explain)?;
            println!("{summary}");
            Ok(())
        }
        Command::Onboard { name, age, gender } => {
            let settings = ctx
                .docbook()
                .await
                .complete_onboarding(&name, &age, &gender)
                .await;
            println!("Welcome, {}!", settings.username);
            Ok(())
        }
        Command::SetKey { key } => {
            let key = key.trim().to_string();
            if key.is_empty() {
                bail!("API key must not be empty");
            }
            ctx.config_store.update(|config| config.api_key = key)?;
            println!("API key saved to {}", ctx.config_store.path().display());
            Ok(())
        }
        Command::Appointments => {
            for appointment in ctx.docbook().await.appointments().await {
                println!(
                    "{}  {} ({})  {}  {:?}",
                    appointment.id,
                    appointment.provider_name,
                    appointment.provider_specialty,
                    appointment.time_slot,
                    appointment.status
                );
            }
            Ok(())
        }
        Command::Cancel { id } => ctx.docbook().await.cancel_appointment(&id).await,
        Command::Export { app, dir } => {
            let dir = match dir {
                Some(dir) => dir,
                None => std::env::current_dir().context("failed to read current directory")?,
            };
            let path = match app {
                AppArg::Focus => ctx.focus().await.export(&dir).await?,
                AppArg::Docbook => ctx.docbook().await.export(&dir).await?,
            };
            println!("Exported to {}", path.display());
            Ok(())
        }
        Command::Import { app, file } => {
            match app {
                AppArg::Focus => ctx.focus().await.import(&file).await?,
                AppArg::Docbook => ctx.docbook().await.import(&file).await?,
            }
            println!("Data restored from {}", file.display());
            Ok(())
        }
    }
}

async fn run_focus(app: &FocusApp, minutes: u32, mode: TimerMode) -> Result<()> {
    app.switch_mode(mode).await?;
    if mode.counts_down() {
        app.change_duration(minutes).await?;
    }

    let mut updates = app.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    app.start_timer().await?;

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(FocusUpdate::Timer(snapshot)) => {
                    let status = match snapshot.state.status {
                        TimerStatus::Running => "running",
                        TimerStatus::Stopped => "stopped",
                        TimerStatus::Ready => "ready",
                    };
                    print!("\r{} {:<8}", format_clock(snapshot.display_secs), status);
                    std::io::stdout().flush().ok();
                }
                Ok(FocusUpdate::SessionRecorded(session)) => {
                    println!("\nSession complete: {} minutes", session.duration_minutes);
                }
                Ok(FocusUpdate::PetChanged(pet)) => {
                    println!("{} is now level {} (health {:.0})", pet.name, pet.level(), pet.health);
                }
                Ok(FocusUpdate::Distraction { count, pet }) => {
                    println!("\nDistraction #{count}! {} health {:.0}", pet.name, pet.health);
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else { break };
                match line.trim() {
                    "p" => { app.stop_timer().await?; }
                    "s" => { app.start_timer().await?; }
                    "h" => { app.set_visibility(Visibility::Hidden).await; }
                    "v" => { app.set_visibility(Visibility::Visible).await; }
                    "q" => break,
                    "" => {}
                    other => println!("\nunknown command '{other}' (p, s, h, v, q)"),
                }
            }
        }
    }

    app.shutdown().await;
    println!();
    Ok(())
}

async fn run_chat(app: &DocbookApp) -> Result<()> {
    let username = app.settings().await.username;
    println!("Hi {username}! I'm DocBook AI. How can I help you today?");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        match app.chat(&line).await {
            Some(reply) => println!("{reply}"),
            None => break,
        }
    }
    Ok(())
}

async fn search(ctx: &Workspace, query: DirectorySearch) -> Result<()> {
    let listings = ctx
        .docbook()
        .await
        .search(query)
        .await
        .map_err(explain)?
        .unwrap_or_default();
    if listings.is_empty() {
        println!("No results.");
    }
    for listing in &listings {
        print_listing(listing);
    }
    Ok(())
}

fn print_listing(listing: &ProviderListing) {
    let rating = listing
        .rating
        .map(|r| format!("{r:.1}"))
        .unwrap_or_else(|| "-".into());
    println!("{} | {} | {} | rating {}", listing.name, listing.specialty, listing.location, rating);
    if !listing.bio.is_empty() {
        println!("  {}", listing.bio);
    }
    if !listing.phone.is_empty() {
        println!("  phone: {}", listing.phone);
    }
    if !listing.available_slots.is_empty() {
        println!("  slots: {}", listing.available_slots.join(", "));
    }
    println!("  book: {}", listing.website);
    println!("  map:  {}", listing.map_url);
}

fn explain(err: GatewayError) -> anyhow::Error {
    match err {
        GatewayError::CredentialsMissing => {
            anyhow!("API key is missing. Set it in config.json or FOCUSPAL_API_KEY.")
        }
        other => anyhow!(other),
    }
}

fn guess_mime(path: &Path) -> Result<&'static str> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    Ok(match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "gif" => "image/gif",
        _ => bail!("cannot tell the image type of {}; pass --mime", path.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_and_backup_commands() {
        let cli = Cli::parse_from(["focuspal", "doctors", "chest pain", "--location", "Pune"]);
        assert!(matches!(
            cli.command,
            Command::Doctors { ref gender, .. } if gender == "Any"
        ));

        let cli = Cli::parse_from(["focuspal", "import", "--app", "docbook", "backup.json"]);
        assert!(matches!(cli.command, Command::Import { app: AppArg::Docbook, .. }));
    }

    #[test]
    fn focus_defaults_to_pomodoro() {
        let cli = Cli::parse_from(["focuspal", "focus"]);
        match cli.command {
            Command::Focus { minutes, mode } => {
                assert_eq!(minutes, 25);
                assert_eq!(TimerMode::from(mode), TimerMode::Pomodoro);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn mime_is_guessed_from_extension() {
        assert_eq!(guess_mime(Path::new("cert.JPG")).unwrap(), "image/jpeg");
        assert!(guess_mime(Path::new("cert")).is_err());
    }
}
