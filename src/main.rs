use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::info;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{io, sync::Arc, time::Duration};
use tokio::sync::RwLock;

mod alert;
mod api;
mod config;
mod metrics;
mod model;
mod monitor;
mod notify;
mod ui;

use api::binance::BinanceProvider;
use api::demo::DemoProvider;
use api::provider::MarketDataProvider;
use config::Config;
use model::AlertEvent;
use monitor::MarketState;
use notify::{DesktopNotifier, LogNotifier, Notifier};
use ui::ui::UIState;

#[derive(Parser)]
#[command(name = "coinwatch")]
#[command(about = "Live terminal monitor for Binance spot and futures positions")]
struct Args {
    /// Path to the TOML configuration file (default: config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Write a sample config.toml and exit
    #[arg(long)]
    generate_config: bool,

    /// Run against simulated prices instead of the exchange
    #[arg(long)]
    demo: bool,

    /// Log to stderr instead of the in-dashboard log pane
    #[arg(long)]
    debug: bool,

    /// Disable desktop notifications for price alerts
    #[arg(long)]
    no_notify: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        tui_logger::init_logger(log::LevelFilter::Debug)
            .map_err(|e| anyhow::anyhow!("failed to init logger: {e}"))?;
        tui_logger::set_default_level(log::LevelFilter::Debug);
    }

    if args.generate_config {
        config::generate_sample_config("config.toml")?;
        println!("Sample configuration written to config.toml");
        return Ok(());
    }

    print_startup_banner();

    // Configuration problems are fatal before the loop starts; nothing has
    // touched the terminal yet, so the error surfaces as a plain message.
    let config = config::load_config(args.config.as_deref())?;

    let notifier: Arc<dyn Notifier> = if config.notifications_enabled && !args.no_notify {
        Arc::new(DesktopNotifier)
    } else {
        Arc::new(LogNotifier)
    };

    if args.demo {
        info!("starting in demo mode with simulated prices");
        let provider = Arc::new(DemoProvider::new(&config));
        run_dashboard(provider, config, notifier).await
    } else {
        let provider = Arc::new(BinanceProvider::new(&config.binance)?);
        run_dashboard(provider, config, notifier).await
    }
}

fn print_startup_banner() {
    println!("╔══════════════════════════════════════════════╗");
    println!("║                  COINWATCH                   ║");
    println!("║                                              ║");
    println!("║   Spot & futures monitor with P&L tracking   ║");
    println!("║        and hysteresis price alerting         ║");
    println!("╚══════════════════════════════════════════════╝");
    println!();
}

async fn run_dashboard<P: MarketDataProvider + Send + Sync + 'static>(
    provider: Arc<P>,
    config: Config,
    notifier: Arc<dyn Notifier>,
) -> Result<()> {
    let state = Arc::new(RwLock::new(MarketState::new(&config)));
    let alerts = Arc::new(RwLock::new(Vec::<AlertEvent>::new()));

    let state_clone = state.clone();
    let alerts_clone = alerts.clone();
    let schedule = config.schedule.clone();
    tokio::spawn(async move {
        monitor::run(provider, state_clone, alerts_clone, notifier, schedule).await;
    });

    run_ui(state, alerts, &config).await?;

    println!("Monitor stopped. Goodbye.");
    Ok(())
}

async fn run_ui(
    state: Arc<RwLock<MarketState>>,
    alerts: Arc<RwLock<Vec<AlertEvent>>>,
    config: &Config,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut ui_state = UIState::new(config.ui.show_logs);

    let result = ui_loop(&mut terminal, &mut ui_state, &state, &alerts, config).await;

    // Always restore the terminal, even when the loop errored, so a failure
    // never leaves the shell in raw mode.
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn ui_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ui_state: &mut UIState,
    state: &RwLock<MarketState>,
    alerts: &RwLock<Vec<AlertEvent>>,
    config: &Config,
) -> Result<()> {
    loop {
        {
            let state_guard = state.read().await;
            let alerts_guard = alerts.read().await;
            terminal.draw(|f| ui::ui::draw(f, ui_state, &state_guard, &alerts_guard))?;
        }

        if event::poll(Duration::from_millis(config.ui.refresh_rate_ms))? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                        info!("shutdown requested");
                        break;
                    }
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        info!("interrupted");
                        break;
                    }
                    KeyCode::Char('l') | KeyCode::Char('L') => ui_state.toggle_logs(),
                    _ => {}
                }
            }
        }
    }

    Ok(())
}
