//! CLI - Command Line Interface for atvtui
//!
//! Every TUI action is scriptable. Output is human-readable on a terminal
//! and JSON otherwise (or with `--json`).
//!
//! # Examples
//!
//! ```bash
//! # Find devices and pair one
//! atvtui devices
//! atvtui pair "Living Room"
//!
//! # Remote control
//! atvtui -d "Living Room" nav up
//! atvtui -d "Living Room" toggle
//! atvtui -d "Living Room" volume +10
//! atvtui -d "Living Room" playing --watch
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::PathBuf;

use crate::error::RemoteError;
use crate::models::{Direction, RemoteCommand, Service};

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for scripting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    /// General error
    Error = 1,
    InvalidArgs = 2,
    /// Scan, pairing step or command timed out
    Timeout = 3,
    DeviceNotFound = 4,
    /// Device unreachable or refused the connection
    ConnectionError = 5,
    /// Device rejected the handshake or command
    ProtocolError = 6,
    /// atvremote is not installed
    ToolMissing = 7,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code as u8)
    }
}

impl From<&RemoteError> for ExitCode {
    fn from(err: &RemoteError) -> Self {
        match err {
            RemoteError::Timeout(_) => ExitCode::Timeout,
            RemoteError::Connection(_) => ExitCode::ConnectionError,
            RemoteError::Protocol(_) => ExitCode::ProtocolError,
            RemoteError::ToolMissing(_) => ExitCode::ToolMissing,
            RemoteError::ConcurrencyRejected(_) | RemoteError::Cancelled | RemoteError::Io(_) => {
                ExitCode::Error
            }
        }
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// atvtui - control Apple TV and HomePod from the terminal
///
/// Run without arguments to launch the interactive TUI.
/// Use subcommands for scriptable automation.
#[derive(Parser, Debug)]
#[command(
    name = "atvtui",
    version,
    about = "Apple TV and HomePod remote for the terminal",
    long_about = "Discover, pair and control Apple TV and HomePod devices \
                  through atvremote (pyatv).\n\n\
                  Run without arguments to launch the interactive TUI.\n\
                  Use subcommands for automation and scripting.",
    after_help = "EXAMPLES:\n\
                  atvtui                              Launch interactive TUI\n\
                  atvtui devices                      Scan the network\n\
                  atvtui pair \"Living Room\"           Pair every required service\n\
                  atvtui -d \"Living Room\" toggle      Play/pause"
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Target device name, identifier or address
    #[arg(long, short = 'd', global = true)]
    pub device: Option<String>,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Path to the atvremote binary (overrides config and ATVREMOTE_PATH)
    #[arg(long, global = true)]
    pub atvremote: Option<String>,

    /// Log to stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Subcommand to run (omit for TUI mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Check if running in CLI mode (has subcommand)
    pub fn is_cli_mode(&self) -> bool {
        self.command.is_some()
    }

    /// Check if JSON output should be used
    pub fn should_json(&self) -> bool {
        self.json || !std::io::stdout().is_terminal()
    }
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan the network for devices
    #[command(visible_alias = "scan")]
    Devices(DevicesCmd),

    /// List devices stored from earlier pairings
    Known,

    /// Pair a device (every required service, or one with --service)
    Pair(PairCmd),

    /// Forget a stored device and its credentials
    Forget(ForgetCmd),

    /// Send a navigation key
    Nav(NavCmd),

    /// Resume playback
    Play,

    /// Pause playback
    Pause,

    /// Toggle play/pause
    #[command(visible_alias = "pp")]
    Toggle,

    /// Stop playback
    Stop,

    /// Skip to next item
    Next,

    /// Go to previous item
    #[command(visible_alias = "prev")]
    Previous,

    /// Set volume level
    #[command(visible_alias = "vol")]
    Volume(VolumeCmd),

    /// Show what is playing
    #[command(visible_alias = "status")]
    Playing(PlayingCmd),
}

// =============================================================================
// Device Commands
// =============================================================================

/// Scan for Apple TV and HomePod devices
#[derive(Args, Debug)]
pub struct DevicesCmd {
    /// Scan timeout in seconds (default from config)
    #[arg(long, short = 't')]
    pub timeout: Option<u64>,
}

/// Pair a device
#[derive(Args, Debug)]
pub struct PairCmd {
    /// Device name, identifier or address (overrides --device)
    pub device: Option<String>,

    /// Pair only this service, even if it already has a credential
    #[arg(long, short = 's')]
    pub service: Option<Service>,

    /// Stop at the first failed step instead of asking
    #[arg(long)]
    pub no_retry: bool,
}

impl PairCmd {
    pub fn effective_device<'a>(&'a self, global: &'a Option<String>) -> Option<&'a str> {
        self.device.as_deref().or(global.as_deref())
    }
}

/// Forget a stored device
#[derive(Args, Debug)]
pub struct ForgetCmd {
    /// Device name, identifier or address (overrides --device)
    pub device: Option<String>,
}

// =============================================================================
// Remote Commands
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NavKey {
    Up,
    Down,
    Left,
    Right,
    Select,
    Menu,
    Home,
}

impl From<NavKey> for RemoteCommand {
    fn from(key: NavKey) -> Self {
        match key {
            NavKey::Up => RemoteCommand::Navigate(Direction::Up),
            NavKey::Down => RemoteCommand::Navigate(Direction::Down),
            NavKey::Left => RemoteCommand::Navigate(Direction::Left),
            NavKey::Right => RemoteCommand::Navigate(Direction::Right),
            NavKey::Select => RemoteCommand::Select,
            NavKey::Menu => RemoteCommand::Menu,
            NavKey::Home => RemoteCommand::Home,
        }
    }
}

/// Send a navigation key
#[derive(Args, Debug)]
pub struct NavCmd {
    #[arg(value_enum)]
    pub key: NavKey,

    /// Press the key this many times
    #[arg(long, short = 'n', default_value = "1")]
    pub repeat: u8,
}

/// Set volume level
#[derive(Args, Debug)]
pub struct VolumeCmd {
    /// Volume level (0-100) or relative (+/- N)
    #[arg(required = true, allow_hyphen_values = true)]
    pub level: String,
}

/// Volume units moved by one volume_up/volume_down press
pub const VOLUME_STEP: u8 = 5;

impl VolumeCmd {
    /// Parse the volume argument
    pub fn parse_level(&self) -> VolumeLevel {
        let s = self.level.trim();
        if let Some(stripped) = s.strip_prefix('+') {
            if let Ok(delta) = stripped.parse::<i8>() {
                return VolumeLevel::Relative(delta);
            }
        } else if let Some(stripped) = s.strip_prefix('-') {
            if let Ok(delta) = stripped.parse::<i8>() {
                return VolumeLevel::Relative(-delta);
            }
        } else if let Ok(vol) = s.parse::<u8>() {
            return VolumeLevel::Absolute(vol.min(100));
        }
        VolumeLevel::Invalid(self.level.clone())
    }
}

/// Parsed volume level
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeLevel {
    /// Absolute volume (0-100)
    Absolute(u8),
    /// Relative volume change
    Relative(i8),
    /// Invalid level string
    Invalid(String),
}

impl VolumeLevel {
    /// Commands that realize this level
    pub fn commands(&self) -> Vec<RemoteCommand> {
        match self {
            VolumeLevel::Absolute(level) => vec![RemoteCommand::SetVolume(*level)],
            VolumeLevel::Relative(0) | VolumeLevel::Invalid(_) => Vec::new(),
            VolumeLevel::Relative(delta) => {
                let presses = (delta.unsigned_abs()).div_ceil(VOLUME_STEP).max(1);
                let command = if *delta > 0 {
                    RemoteCommand::VolumeUp
                } else {
                    RemoteCommand::VolumeDown
                };
                vec![command; presses as usize]
            }
        }
    }
}

/// Show what is playing
#[derive(Args, Debug)]
pub struct PlayingCmd {
    /// Watch mode: continuously update
    #[arg(long, short = 'w')]
    pub watch: bool,

    /// Update interval in seconds (for watch mode)
    #[arg(long, short = 'i', default_value = "2")]
    pub interval: u64,
}

// =============================================================================
// JSON Output Types
// =============================================================================

/// Generic JSON output wrapper with status
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub exit_code: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

impl<T: Serialize> JsonOutput<T> {
    /// Create success output with data
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            exit_code: 0,
        }
    }

    /// Create error output (no data)
    pub fn error_msg(msg: impl Into<String>, code: ExitCode) -> JsonOutput<()> {
        JsonOutput::<()> {
            data: None,
            error: Some(msg.into()),
            exit_code: code.into(),
        }
    }
}

/// Response for a sent command
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandOk {
    pub status: String,
    pub device: String,
    pub command: String,
}

// =============================================================================
// Output Helpers
// =============================================================================

/// Output handler for consistent formatting
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.should_json(),
            quiet: cli.quiet,
        }
    }

    /// Print success data as JSON, or `human` on a terminal
    pub fn print<T: Serialize>(&self, data: T, human: impl FnOnce() -> String) -> anyhow::Result<()> {
        if self.json {
            let output = JsonOutput::success(data);
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else if !self.quiet {
            println!("{}", human());
        }
        Ok(())
    }

    /// Print error and return exit code
    pub fn error(&self, msg: impl Into<String>, code: ExitCode) -> ExitCode {
        let msg = msg.into();
        if self.json {
            let output = JsonOutput::<()>::error_msg(&msg, code);
            if let Ok(json) = serde_json::to_string_pretty(&output) {
                eprintln!("{}", json);
            }
        } else if !self.quiet {
            eprintln!("Error: {}", msg);
        }
        code
    }

    /// Print a classified backend error
    pub fn remote_error(&self, context: &str, err: &RemoteError) -> ExitCode {
        self.error(format!("{}: {}", context, err), ExitCode::from(err))
    }

    /// Print info message (suppressed in quiet and JSON mode)
    pub fn info(&self, msg: impl std::fmt::Display) {
        if !self.quiet && !self.json {
            eprintln!("{}", msg);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
