mod app;
mod ui;

use anyhow::{bail, Result};
use app::{poll_event, App, AppAction};
use clap::Parser;
use crossterm::event::Event;
use ratatui::DefaultTerminal;
use speedprobe::report::Report;
use speedprobe::settings::{Settings, Timeouts, DEFAULT_SERVER};
use speedprobe::speedtest::{Controller, TestPhase};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use ui::draw_ui;

/// Measure latency, download and upload speed against a speed test server.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Base URL serving api/ping, api/download and api/upload
    #[arg(default_value = DEFAULT_SERVER)]
    server: String,

    /// Number of ping probes
    #[arg(long, default_value_t = 5)]
    pings: usize,

    /// Delay between ping probes
    #[arg(long, default_value_t = 100)]
    ping_interval_ms: u64,

    /// Payload size the download endpoint serves
    #[arg(long, default_value_t = 10)]
    download_mib: u64,

    /// Payload size to upload
    #[arg(long, default_value_t = 5)]
    upload_mib: u64,

    #[arg(long, default_value_t = 5)]
    ping_timeout_secs: u64,

    #[arg(long, default_value_t = 60)]
    download_timeout_secs: u64,

    #[arg(long, default_value_t = 60)]
    upload_timeout_secs: u64,

    /// Run once and print the results instead of opening the terminal UI
    #[arg(long)]
    headless: bool,

    /// Print the results as JSON (implies --headless)
    #[arg(long)]
    json: bool,

    /// Write logs here; the terminal UI discards them otherwise
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn headless(&self) -> bool {
        self.headless || self.json
    }

    fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::with_server(&self.server)?;
        settings.ping_count = self.pings;
        settings.ping_interval = Duration::from_millis(self.ping_interval_ms);
        settings.download_size_mib = self.download_mib;
        settings.upload_size_mib = self.upload_mib;
        settings.timeouts = Timeouts {
            ping_probe: Duration::from_secs(self.ping_timeout_secs),
            download: Duration::from_secs(self.download_timeout_secs),
            upload: Duration::from_secs(self.upload_timeout_secs),
        };
        Ok(settings)
    }
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("speedprobe=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match &cli.log_file {
        Some(path) => builder
            .with_ansi(false)
            .with_writer(Mutex::new(File::create(path)?))
            .init(),
        None if cli.headless() => builder.with_writer(std::io::stderr).init(),
        // Anything written to the terminal would tear the UI
        None => builder.with_writer(std::io::sink).init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let controller = Controller::new(cli.settings()?)?;

    if cli.headless() {
        return run_headless(&controller, cli.json).await;
    }

    let mut terminal = ratatui::init();
    terminal.clear()?;

    let result = run_app(&mut terminal, controller).await;

    ratatui::restore();
    result
}

async fn run_headless(controller: &Controller, json: bool) -> Result<()> {
    let state = controller.start().await;
    let report = Report::new(&state.results);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }

    if state.phase != TestPhase::Complete {
        bail!("speed test stopped early");
    }
    Ok(())
}

async fn run_app(terminal: &mut DefaultTerminal, controller: Controller) -> Result<()> {
    let mut app = App::new(controller.settings());
    let mut state_rx = controller.subscribe();

    loop {
        if state_rx.has_changed()? {
            app.state = state_rx.borrow_and_update().clone();
        }

        terminal.draw(|frame| draw_ui(frame, &app))?;

        if let Some(Event::Key(key)) = poll_event(Duration::from_millis(30))? {
            if let Some(action) = app.handle_key_event(key) {
                match action {
                    AppAction::Quit => break,
                    AppAction::StartTest => {
                        controller.set_settings(app.settings.clone());
                        let controller = controller.clone();
                        tokio::spawn(async move {
                            controller.start().await;
                        });
                    }
                    AppAction::CancelTest | AppAction::Reset => controller.reset(),
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
