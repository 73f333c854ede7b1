mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use legalmate_core::{
    ClientConfig, CredentialStore, Credentials, FileStore, KeyValueStore, MemoryStore, SendMode,
    SessionIdentity,
};
use tracing::{info, warn};

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "legalmate")]
#[command(version, about = "Terminal client for the LegalMate legal assistant")]
struct Cli {
    /// Backend base URL (overrides config and LEGALMATE_API_URL)
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Start a fresh chat instead of resuming the last one
    #[arg(long)]
    new: bool,

    /// Use the simple endpoint (answers without metadata)
    #[arg(long)]
    simple: bool,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Keep keys and session in memory only
    #[arg(long)]
    ephemeral: bool,
}

impl Cli {
    fn apply(&self, config: &mut ClientConfig) {
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if self.simple {
            config.send_mode = SendMode::Simple;
        }
        if let Some(secs) = self.timeout {
            config.request_timeout_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = logging::init_logging(&ClientConfig::config_dir()?.join("logs"))?;

    let mut config = ClientConfig::load().unwrap_or_else(|err| {
        warn!(error = %err, "Could not read config, using defaults");
        ClientConfig::new()
    });
    cli.apply(&mut config);

    let store: Arc<dyn KeyValueStore> = if cli.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(FileStore::open_default()?)
    };

    seed_credentials_from_env(&store);

    if cli.new {
        SessionIdentity::new(store.clone()).reset()?;
    }

    info!(base_url = %config.base_url, mode = ?config.send_mode, "Starting legalmate");

    let mut app = App::new(config, store);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, &mut app).await;
    tui::restore()?;

    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App) -> Result<()> {
    let mut events = EventHandler::new(app.api.subscribe());
    handler::start(app).await?;

    loop {
        terminal.draw(|frame| ui::render(app, frame))?;

        let Some(event) = events.next().await else {
            break;
        };
        handler::handle_event(app, event).await?;

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

fn seed_credentials_from_env(store: &Arc<dyn KeyValueStore>) {
    let credentials = CredentialStore::new(store.clone());
    if credentials.load().is_some() {
        return;
    }

    if let Some(keys) = Credentials::from_env() {
        match credentials.save(&keys) {
            Ok(()) => info!("Loaded API keys from environment"),
            Err(err) => warn!(error = %err, "Ignoring API keys from environment"),
        }
    }
}
