/*!
 * KYANOS Bluetooth Management TUI
 * Device discovery, pairing and connection control over BlueZ
 * Onyx Digital Intelligence Development LLC
 */

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::fs::{self, OpenOptions};
use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use kyanos_core::agent::{register_agent, AgentManager, AGENT_PATH};
use kyanos_core::bluez::{export_agent, BluezGateway};
use kyanos_core::events::{self, EventReceiver};
use kyanos_core::{Config, PairingCoordinator};

mod app;
mod ui;
mod worker;

#[cfg(test)]
mod testing;

use app::App;
use ui::render_ui;
use worker::Worker;

#[derive(Parser)]
#[command(name = "kyanos")]
#[command(about = "KYANOS Bluetooth Management TUI")]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log file path
    #[arg(short, long)]
    log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Do not start scanning on launch
    #[arg(long)]
    no_scan: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_path = cli.log_file.clone().unwrap_or_else(default_log_path);
    init_logging(&log_path, cli.debug)?;
    info!("KYANOS starting...");

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    if cli.no_scan {
        config.auto_start_scanning = false;
    }

    let gateway = Arc::new(
        BluezGateway::connect()
            .await
            .context("Cannot start without a Bluetooth daemon and adapter")?,
    );

    let (events, mut event_rx) = events::channel();
    let coordinator = Arc::new(PairingCoordinator::new(
        events.clone(),
        config.pairing_timeout(),
    ));

    export_agent(&gateway.connection(), AGENT_PATH, coordinator.clone());
    if let Err(e) = register_agent(gateway.as_ref(), AGENT_PATH).await {
        warn!("Pairing agent unavailable, passkey pairing will fail: {}", e);
    }

    let worker = Worker::new(gateway.clone(), events, &config);
    let mut app = App::new(config.clone(), worker.clone(), coordinator);

    if config.auto_start_scanning {
        worker.set_scanning(true);
    }
    worker.poll();

    // Initialize terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run(
        &mut terminal,
        &mut app,
        &mut event_rx,
        &worker,
        config.refresh_interval(),
    )
    .await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if app.scanning {
        if let Err(e) = worker.stop_discovery().await {
            warn!("Could not stop discovery: {}", e);
        }
    }
    if let Err(e) = gateway.unregister_agent(AGENT_PATH).await {
        debug!("Agent unregister on exit: {}", e);
    }

    info!("KYANOS stopped");
    result
}

async fn run(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    event_rx: &mut EventReceiver,
    worker: &Worker,
    refresh_interval: Duration,
) -> Result<()> {
    // Create ticker for UI updates
    let mut ticker = interval(Duration::from_millis(100));
    let mut last_poll = Instant::now();

    loop {
        // Handle keys
        if event::poll(Duration::from_millis(0))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key);
                }
            }
        }

        // Apply everything the workers and the agent reported
        while let Ok(event) = event_rx.try_recv() {
            app.handle_event(event);
        }

        if app.should_quit {
            return Ok(());
        }

        if last_poll.elapsed() >= refresh_interval {
            worker.poll();
            last_poll = Instant::now();
        }

        ticker.tick().await;

        // Render UI
        terminal.draw(|f| render_ui(f, app))?;
    }
}

fn init_logging(path: &Path, debug: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let log_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("kyanos={0},kyanos_core={0}", log_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();

    Ok(())
}

fn default_log_path() -> PathBuf {
    let base = std::env::var_os("XDG_STATE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local/state")))
        .unwrap_or_else(std::env::temp_dir);
    base.join("kyanos").join("kyanos.log")
}
