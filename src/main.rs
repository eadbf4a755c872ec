//! atvtui - Apple TV and HomePod remote for the terminal
//!
//! Discovers devices on the local network, pairs them service by service and
//! drives them like a physical remote. Device work goes through `atvremote`
//! (pyatv) and runs off the event loop, so the interface never blocks.
//!
//! # Usage
//!
//! ```bash
//! # Launch interactive TUI
//! atvtui
//!
//! # CLI mode (for automation)
//! atvtui devices
//! atvtui pair "Living Room"
//! atvtui -d "Living Room" toggle --json
//! ```

use std::io::{stdout, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{info, warn};

use atvtui::app::{Action, App};
use atvtui::backend::AtvRemote;
use atvtui::cli::{Cli, Command, ExitCode, Output};
use atvtui::commands::{self, Context};
use atvtui::config::Config;
use atvtui::controller::Controller;
use atvtui::models::RemoteCommand;
use atvtui::store::FileStore;
use atvtui::{logging, ui};

/// Terminal type alias for convenience
type Tui = Terminal<CrosstermBackend<Stdout>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.is_cli_mode() {
        // CLI mode: execute command and exit
        logging::init_cli(cli.verbose);
        let exit_code = run_cli(cli).await;
        std::process::exit(exit_code.into());
    } else {
        // TUI mode: launch interactive interface
        if let Some(path) = logging::init_tui() {
            info!("Logging to {}", path.display());
        }
        run_tui(load_config(&cli)).await
    }
}

fn load_config(cli: &Cli) -> Config {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    if let Some(path) = &cli.atvremote {
        config.atvremote_path = path.clone();
    }
    config
}

/// Run CLI command and return exit code
async fn run_cli(cli: Cli) -> ExitCode {
    let output = Output::new(&cli);
    let config = load_config(&cli);
    let backend = Arc::new(AtvRemote::with_path(config.atvremote_path.clone()));
    let mut ctx = Context::new(config, backend, Box::new(FileStore::open_default()));
    let device = cli.device.as_deref();

    let Some(command) = cli.command else {
        // Handled by is_cli_mode
        return ExitCode::Success;
    };

    match command {
        Command::Devices(cmd) => commands::devices_cmd(cmd, &mut ctx, &output).await,

        Command::Known => commands::known_cmd(&mut ctx, &output).await,

        Command::Pair(cmd) => commands::pair_cmd(cmd, &cli.device, &mut ctx, &output).await,

        Command::Forget(cmd) => commands::forget_cmd(cmd, &cli.device, &mut ctx, &output).await,

        Command::Nav(cmd) => {
            if cmd.repeat == 0 {
                return output.error("--repeat must be at least 1", ExitCode::InvalidArgs);
            }
            let commands = vec![RemoteCommand::from(cmd.key); cmd.repeat as usize];
            commands::remote_cmd(commands, device, &mut ctx, &output).await
        }

        Command::Play => commands::remote_cmd(vec![RemoteCommand::Play], device, &mut ctx, &output).await,

        Command::Pause => commands::remote_cmd(vec![RemoteCommand::Pause], device, &mut ctx, &output).await,

        Command::Toggle => {
            commands::remote_cmd(vec![RemoteCommand::PlayPause], device, &mut ctx, &output).await
        }

        Command::Stop => commands::remote_cmd(vec![RemoteCommand::Stop], device, &mut ctx, &output).await,

        Command::Next => commands::remote_cmd(vec![RemoteCommand::Next], device, &mut ctx, &output).await,

        Command::Previous => {
            commands::remote_cmd(vec![RemoteCommand::Previous], device, &mut ctx, &output).await
        }

        Command::Volume(cmd) => commands::volume_cmd(cmd, device, &mut ctx, &output).await,

        Command::Playing(cmd) => commands::playing_cmd(cmd, device, &mut ctx, &output).await,
    }
}

// =============================================================================
// TUI Mode
// =============================================================================

/// Initialize the terminal for TUI mode
fn init_terminal() -> Result<Tui> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

/// Restore terminal to normal state
fn restore_terminal(terminal: &mut Tui) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Run interactive TUI
async fn run_tui(config: Config) -> Result<()> {
    let backend = Arc::new(AtvRemote::with_path(config.atvremote_path.clone()));
    let store = FileStore::open_default();
    info!("Device store at {}", store.path().display());

    let mut app = App::new(config.highlight_duration());
    let mut controller = Controller::new(backend, Box::new(store), config);
    controller.load_known(&mut app);
    // Scan once on start so fresh devices show up without a key press
    controller.perform(Action::Discover, &mut app);

    let mut terminal = init_terminal()?;

    let result = run_event_loop(&mut terminal, &mut app, &mut controller).await;

    controller.shutdown();
    // Always restore terminal, even on error
    restore_terminal(&mut terminal)?;

    result
}

/// Main event loop - handles input, applies completed work, renders UI
async fn run_event_loop(terminal: &mut Tui, app: &mut App, controller: &mut Controller) -> Result<()> {
    const TICK_RATE: Duration = Duration::from_millis(50);

    while app.running {
        let now = Instant::now();
        terminal.draw(|frame| ui::draw(frame, app, now))?;

        // crossterm's poll blocks; keep it short so completions land promptly
        let ready = tokio::task::block_in_place(|| event::poll(TICK_RATE))?;
        if ready {
            if let Event::Key(key) = event::read()? {
                // Only handle key press events (ignore releases on Windows)
                if key.kind == KeyEventKind::Press {
                    if let Some(action) = app.handle_key(key) {
                        controller.perform(action, app);
                    }
                }
            }
        }

        // Let spawned work make progress before draining
        tokio::task::yield_now().await;
        let handled = controller.drain(app);
        if handled > 0 {
            tracing::trace!("Applied {} event(s)", handled);
        }

        let now = Instant::now();
        app.ui.tick(now);
        controller.poll_now_playing(now);
    }

    if !controller.dispatcher().in_flight().is_empty() {
        warn!(
            "Quitting with work in flight: {:?}",
            controller.dispatcher().in_flight()
        );
    }
    Ok(())
}
