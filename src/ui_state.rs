//! Presentation state
//!
//! Everything the renderer needs besides the device list: activity of
//! discovery and pairing, connection status, the dismissible notice, and
//! the transient button highlight.
//!
//! [`UiState::report`] applies a completion to this state. It is idempotent:
//! reporting the same completion twice leaves the state as after the first.

use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::dispatch::{Completion, Outcome};
use crate::error::{ErrorKind, RemoteError};
use crate::models::{CommandKind, Direction, NowPlaying, RemoteCommand};
use crate::pairing::PairingState;

// =============================================================================
// Loading State
// =============================================================================

/// Loading state for async operations
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LoadingState {
    /// Idle - no loading in progress
    #[default]
    Idle,
    /// Loading with optional message
    Loading(Option<String>),
    /// Error with message
    Error(String),
}

impl LoadingState {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadingState::Loading(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LoadingState::Error(_))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            LoadingState::Loading(Some(msg)) => Some(msg),
            LoadingState::Error(msg) => Some(msg),
            _ => None,
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting(String),
    Connected { identifier: String, name: String },
    Failed(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }

    pub fn label(&self) -> String {
        match self {
            ConnectionState::Disconnected => "Not connected".to_string(),
            ConnectionState::Connecting(name) => format!("Connecting to {}...", name),
            ConnectionState::Connected { name, .. } => format!("Connected: {}", name),
            ConnectionState::Failed(msg) => format!("Connection failed: {}", msg),
        }
    }
}

// =============================================================================
// Buttons and Notices
// =============================================================================

/// On-screen remote button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Up,
    Down,
    Left,
    Right,
    Select,
    Menu,
    Home,
    PlayPause,
    Stop,
    Next,
    Previous,
    VolumeUp,
    VolumeDown,
}

impl From<RemoteCommand> for Button {
    fn from(command: RemoteCommand) -> Self {
        match command {
            RemoteCommand::Navigate(Direction::Up) => Button::Up,
            RemoteCommand::Navigate(Direction::Down) => Button::Down,
            RemoteCommand::Navigate(Direction::Left) => Button::Left,
            RemoteCommand::Navigate(Direction::Right) => Button::Right,
            RemoteCommand::Select => Button::Select,
            RemoteCommand::Menu => Button::Menu,
            RemoteCommand::Home => Button::Home,
            RemoteCommand::Play | RemoteCommand::Pause | RemoteCommand::PlayPause => {
                Button::PlayPause
            }
            RemoteCommand::Stop => Button::Stop,
            RemoteCommand::Next => Button::Next,
            RemoteCommand::Previous => Button::Previous,
            RemoteCommand::VolumeUp | RemoteCommand::SetVolume(_) => Button::VolumeUp,
            RemoteCommand::VolumeDown => Button::VolumeDown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Highlight {
    pub button: Button,
    pub until: Instant,
}

/// Dismissible message shown over the main view
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub title: String,
    pub message: String,
    /// `None` for informational notices
    pub kind: Option<ErrorKind>,
}

impl Notice {
    pub fn error(title: impl Into<String>, error: &RemoteError) -> Self {
        Self {
            title: title.into(),
            message: error.to_string(),
            kind: Some(error.kind()),
        }
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            kind: None,
        }
    }
}

// =============================================================================
// UI State
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct UiState {
    pub discovery: LoadingState,
    pub pairing: LoadingState,
    pub connection: ConnectionState,
    pub now_playing: Option<NowPlaying>,
    pub notice: Option<Notice>,
    pub highlight: Option<Highlight>,
    pub last_command: Option<RemoteCommand>,
    highlight_duration: Duration,
}

impl Default for UiState {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::config::DEFAULT_HIGHLIGHT_MS))
    }
}

impl UiState {
    pub fn new(highlight_duration: Duration) -> Self {
        Self {
            discovery: LoadingState::Idle,
            pairing: LoadingState::Idle,
            connection: ConnectionState::Disconnected,
            now_playing: None,
            notice: None,
            highlight: None,
            last_command: None,
            highlight_duration,
        }
    }

    /// Whether remote buttons can be used
    pub fn controls_enabled(&self) -> bool {
        self.connection.is_connected()
    }

    /// Highlight `button` until `highlight_duration` past `now`
    pub fn flash(&mut self, button: Button, now: Instant) {
        self.highlight = Some(Highlight {
            button,
            until: now + self.highlight_duration,
        });
    }

    pub fn is_highlighted(&self, button: Button, now: Instant) -> bool {
        self.highlight
            .map(|h| h.button == button && now < h.until)
            .unwrap_or(false)
    }

    /// Expire the highlight. Returns true if anything changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.highlight {
            Some(h) if now >= h.until => {
                self.highlight = None;
                true
            }
            _ => false,
        }
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn show_notice(&mut self, notice: Notice) {
        self.notice = Some(notice);
    }

    /// Mark an operation as started
    pub fn begin(&mut self, kind: CommandKind, label: &str) {
        match kind {
            CommandKind::Discovery => {
                self.discovery = LoadingState::Loading(Some("Scanning...".to_string()))
            }
            CommandKind::Pairing => {
                self.pairing = LoadingState::Loading(Some(format!("Pairing {}...", label)))
            }
            CommandKind::Connect => self.connection = ConnectionState::Connecting(label.to_string()),
            _ => {}
        }
    }

    /// Apply a completion
    pub fn report(&mut self, completion: &Completion) {
        let kind = completion.kind;
        match &completion.result {
            Ok(outcome) => self.report_success(kind, outcome),
            Err(err) => self.report_failure(kind, err),
        }
    }

    fn report_success(&mut self, kind: CommandKind, outcome: &Outcome) {
        match outcome {
            Outcome::Discovered(_) => self.discovery = LoadingState::Idle,
            Outcome::Paired(report) => {
                self.pairing = LoadingState::Idle;
                match report.state {
                    PairingState::FullyPaired => {}
                    PairingState::Cancelled => debug!("pairing with {} cancelled", report.device.name),
                    PairingState::PartiallyPaired => {
                        let pending: Vec<String> = report
                            .device
                            .unpaired_services()
                            .iter()
                            .map(|s| s.to_string())
                            .collect();
                        let mut notice = Notice::info(
                            "Partially paired",
                            format!(
                                "{} still needs: {}. Pair again to resume.",
                                report.device.name,
                                pending.join(", ")
                            ),
                        );
                        // Skipped steps alone are not an error
                        notice.kind = report.failed.first().map(|(_, e)| e.kind());
                        self.notice = Some(notice);
                    }
                }
            }
            Outcome::Connected(session) => {
                let device = session.device();
                self.connection = ConnectionState::Connected {
                    identifier: device.identifier.clone(),
                    name: device.name.clone(),
                };
            }
            Outcome::CommandSent(command) => self.last_command = Some(*command),
            Outcome::NowPlaying(playing) => self.now_playing = Some(playing.clone()),
        }
        debug!("{} completed", kind);
    }

    fn report_failure(&mut self, kind: CommandKind, err: &RemoteError) {
        match kind {
            CommandKind::Discovery => {
                if err.is_silent() {
                    self.discovery = LoadingState::Idle;
                } else {
                    self.discovery = LoadingState::Error(err.to_string());
                    self.notice = Some(Notice::error("Discovery failed", err));
                }
            }
            CommandKind::Pairing => {
                if err.is_silent() {
                    self.pairing = LoadingState::Idle;
                } else {
                    self.pairing = LoadingState::Error(err.to_string());
                    self.notice = Some(Notice::error("Pairing failed", err));
                }
            }
            CommandKind::Connect => {
                if err.is_silent() {
                    self.connection = ConnectionState::Disconnected;
                } else {
                    self.connection = ConnectionState::Failed(err.to_string());
                    self.notice = Some(Notice::error("Could not connect", err));
                }
            }
            CommandKind::NowPlaying => debug!("now playing unavailable: {}", err),
            CommandKind::Navigate | CommandKind::Transport | CommandKind::Volume => {
                if !err.is_silent() {
                    warn!("{} command failed: {}", kind, err);
                }
            }
        }
    }
}
