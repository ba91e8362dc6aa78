pub mod bridge;
mod console;
pub mod db;
pub mod error;
pub mod models;
pub mod predictor;
pub mod settings;
pub mod tasks;
pub mod timer;
pub mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use bridge::{LocalWindowHost, WindowHost};
use db::Database;
use predictor::{
    CategorySuggester, FeedbackReporter, FeedbackService, HttpFeedbackSink, HttpPredictor,
    PredictionService,
};
use settings::{AppSettings, SettingsOverrides, SettingsStore, SETTINGS_FILE};
use tasks::TaskReconciler;
use timer::TimerController;

const DATABASE_FILE: &str = "smartsynch.sqlite3";

#[derive(Parser, Debug)]
#[command(name = "smartsynch")]
#[command(about = "Task tracking with a live timer overlay")]
#[command(version)]
struct Cli {
    /// Directory holding the task database and settings.json
    #[arg(long, env = "SMARTSYNCH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Category prediction endpoint
    #[arg(long, env = "SMARTSYNCH_PREDICTOR_URL")]
    predictor_url: Option<String>,

    /// Prediction feedback endpoint
    #[arg(long, env = "SMARTSYNCH_FEEDBACK_URL")]
    feedback_url: Option<String>,

    /// Run without the timer overlay
    #[arg(long, env = "SMARTSYNCH_NO_OVERLAY")]
    no_overlay: bool,
}

impl Cli {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            predictor_url: self.predictor_url.clone(),
            feedback_url: self.feedback_url.clone(),
            no_overlay: self.no_overlay,
        }
    }
}

/// Everything the intent commands need.
pub struct AppState {
    pub tasks: TaskReconciler,
    pub timer: TimerController,
    pub suggester: CategorySuggester,
    pub feedback: FeedbackReporter,
}

impl AppState {
    pub fn new(
        tasks: TaskReconciler,
        host: Arc<dyn WindowHost>,
        predictor: Arc<dyn PredictionService>,
        feedback: Arc<dyn FeedbackService>,
        settings: &AppSettings,
    ) -> Self {
        Self {
            timer: TimerController::new(tasks.clone(), host, settings.timer_config()),
            tasks,
            suggester: CategorySuggester::new(predictor, settings.confidence_threshold),
            feedback: FeedbackReporter::new(feedback),
        }
    }

    /// Loads the task collection and wires up the HTTP collaborators.
    pub async fn open(
        database: Database,
        host: Arc<dyn WindowHost>,
        settings: &AppSettings,
    ) -> Result<Self> {
        let tasks = TaskReconciler::load(database).await?;
        let predictor = Arc::new(HttpPredictor::new(
            settings.predictor_url.clone(),
            settings.http_timeout(),
        ));
        let feedback = Arc::new(HttpFeedbackSink::new(
            settings.feedback_url.clone(),
            settings.http_timeout(),
        ));
        Ok(Self::new(tasks, host, predictor, feedback, settings))
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    utils::logging::init();

    info!("SmartSynch starting up...");

    let data_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => default_data_dir(),
    };
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let store = SettingsStore::new(data_dir.join(SETTINGS_FILE))?;
    if !store.path().exists() {
        store.update(store.get())?;
    }
    let mut settings = store.get();
    settings.apply(&cli.overrides());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("smartsynch")
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(async move {
        let database = Database::new(data_dir.join(DATABASE_FILE))?;
        let overlay = LocalWindowHost::new(settings.overlay.enabled);
        let state = AppState::open(database, Arc::new(overlay.clone()), &settings).await?;
        console::run(state, overlay).await
    })
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".smartsynch")
}
