mod app;
mod config;
mod constants;
mod display;
mod graphics;
mod input;
mod player;
mod results;
mod search;
mod session;
mod theme;
mod ui;
mod voice;
mod youtube;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use ratatui::{
  DefaultTerminal,
  crossterm::event::{self, Event, KeyEventKind},
};
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use app::App;
use config::Config;
use constants::constants;
use display::CliDisplayMode;
use input::handle_key_event;
use search::SearchClient;
use voice::{Capability, CaptureSettings, VoiceCapture};

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// Search backend URL (overrides prefs.toml)
  #[arg(short, long)]
  endpoint: Option<String>,

  /// Speech locale for voice search, e.g. en-IN (overrides prefs.toml)
  #[arg(short, long)]
  locale: Option<String>,

  /// Thumbnail display mode: 'auto', 'direct', 'ascii', or 'off' (default: auto-detect)
  #[arg(short, long, default_value = "auto")]
  display_mode: CliDisplayMode,

  /// Give up on a search after this many seconds (default: wait indefinitely)
  #[arg(short, long)]
  timeout: Option<u64>,

  /// Print shell completions and exit
  #[arg(long, value_name = "SHELL")]
  completions: Option<Shell>,
}

// --- Logging ---

/// Log to a file in the data dir; the terminal belongs to the UI.
fn init_logging() -> Option<WorkerGuard> {
  let dir = config::log_dir();
  std::fs::create_dir_all(&dir).ok()?;
  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(&dir, "vidfind.log"));
  let filter = EnvFilter::try_from_env("VIDFIND_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).try_init().ok()?;
  Some(guard)
}

// --- Entry Point ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  if let Some(shell) = args.completions {
    let mut cmd = Args::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
    return Ok(());
  }

  let _log_guard = init_logging();
  info!(version = env!("CARGO_PKG_VERSION"), "vidfind starting");

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    ratatui::restore();
    default_hook(info);
  }));

  let app = build_app(args)?;
  let mut terminal = ratatui::init();
  let result = run(&mut terminal, app).await;
  ratatui::restore();
  result
}

/// CLI flags win over prefs.toml, which wins over built-in defaults.
fn build_app(args: Args) -> Result<App> {
  let config = Config::load();
  let endpoint =
    args.endpoint.or_else(|| config.endpoint.clone()).unwrap_or_else(|| constants().default_endpoint.clone());
  let locale = args.locale.or_else(|| config.locale.clone()).unwrap_or_else(|| constants().default_locale.clone());
  let timeout = args.timeout.map(Duration::from_secs);

  let client = SearchClient::new(endpoint, timeout).context("Failed to build search client")?;
  let capability = Capability::detect();
  info!(endpoint = %client.endpoint(), locale = %locale, voice = ?capability, "configuration resolved");

  let settings = CaptureSettings { locale, ..CaptureSettings::default() };
  let voice = VoiceCapture::new(capability, settings);
  let display_mode = display::resolve_display_mode(args.display_mode);
  Ok(App::new(client, voice, display_mode, config))
}

async fn run(terminal: &mut DefaultTerminal, mut app: App) -> Result<()> {
  loop {
    app.check_pending().await;

    terminal.draw(|frame| ui::ui(frame, &mut app)).context("Failed to draw frame")?;

    if event::poll(Duration::from_millis(100)).context("Failed to poll terminal events")? {
      match event::read().context("Failed to read terminal event")? {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
          handle_key_event(&mut app, key).await?;
        }
        _ => {}
      }
    }

    if app.should_quit {
      break;
    }
  }

  info!("vidfind shutting down");
  app.shutdown().await;
  Ok(())
}
