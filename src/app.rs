//! App state and core application logic
//!
//! Manages the screen state machine, the device list, and translates key
//! presses into [`Action`]s for the controller. The app never starts work
//! itself; it only records what the user asked for.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::time::Duration;

use crate::error::RemoteError;
use crate::models::*;
use crate::pairing::PairingReply;
use crate::ui_state::UiState;

pub use crate::ui_state::LoadingState;

// =============================================================================
// App State Enum
// =============================================================================

/// Screen with keyboard focus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppState {
    /// Device list
    #[default]
    Devices,
    /// Remote control pad and now playing
    Remote,
}

// =============================================================================
// Input Mode
// =============================================================================

/// Current input mode for keyboard handling
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InputMode {
    /// Normal navigation mode
    #[default]
    Normal,
    /// PIN entry for a pairing step
    Pin,
}

// =============================================================================
// Actions
// =============================================================================

/// Work requested by the user
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Discover,
    CancelDiscovery,
    Connect(String),
    Pair(String),
    Forget(String),
    Remote(RemoteCommand),
    PairingReply(PairingReply),
}

// =============================================================================
// Selection State
// =============================================================================

/// Selection state for list views
#[derive(Debug, Clone, Default)]
pub struct ListState {
    /// Currently selected index
    pub selected: usize,
    /// Scroll offset for viewport
    pub offset: usize,
    /// Total number of items
    pub len: usize,
}

impl ListState {
    pub fn new(len: usize) -> Self {
        Self {
            selected: 0,
            offset: 0,
            len,
        }
    }

    /// Move selection up
    pub fn up(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            if self.selected < self.offset {
                self.offset = self.selected;
            }
        }
    }

    /// Move selection down
    pub fn down(&mut self) {
        if self.len > 0 && self.selected < self.len - 1 {
            self.selected += 1;
        }
    }

    /// Jump to first item
    pub fn first(&mut self) {
        self.selected = 0;
        self.offset = 0;
    }

    /// Jump to last item
    pub fn last(&mut self) {
        if self.len > 0 {
            self.selected = self.len - 1;
        }
    }

    /// Update offset to keep selected item visible
    pub fn scroll_into_view(&mut self, visible_height: usize) {
        if self.selected < self.offset {
            self.offset = self.selected;
        } else if visible_height > 0 && self.selected >= self.offset + visible_height {
            self.offset = self.selected - visible_height + 1;
        }
    }

    /// Update length (e.g., when a scan replaces the list)
    pub fn set_len(&mut self, len: usize) {
        self.len = len;
        if len == 0 {
            self.selected = 0;
            self.offset = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }
}

// =============================================================================
// Pairing Prompt
// =============================================================================

/// What the pairing overlay is showing
#[derive(Debug, Clone, PartialEq)]
pub enum PairingPrompt {
    /// Waiting on the device
    Working { device: String, service: Service },
    /// Device shows a PIN the user must type
    Pin {
        device: String,
        service: Service,
        length: usize,
        input: String,
    },
    /// User types `pin` on the device, then confirms here
    DevicePin {
        device: String,
        service: Service,
        pin: String,
    },
    /// Step failed; user chooses retry, skip, stop or cancel
    Failed {
        device: String,
        service: Service,
        error: RemoteError,
    },
}

// =============================================================================
// App
// =============================================================================

/// Main application state
#[derive(Debug)]
pub struct App {
    /// Screen with focus
    pub state: AppState,
    /// Navigation history stack
    pub nav_stack: Vec<AppState>,
    /// Whether the app is running
    pub running: bool,
    /// Current input mode
    pub input_mode: InputMode,

    /// Devices from the last scan, or the known devices before any scan
    pub devices: Vec<DeviceRecord>,
    pub list: ListState,
    pub pairing: Option<PairingPrompt>,
    pub ui: UiState,
}

impl Default for App {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::config::DEFAULT_HIGHLIGHT_MS))
    }
}

impl App {
    pub fn new(highlight_duration: Duration) -> Self {
        Self {
            state: AppState::Devices,
            nav_stack: Vec::new(),
            running: true,
            input_mode: InputMode::Normal,
            devices: Vec::new(),
            list: ListState::default(),
            pairing: None,
            ui: UiState::new(highlight_duration),
        }
    }

    /// Navigate to a new state, pushing current to stack
    pub fn navigate(&mut self, state: AppState) {
        if self.state != state {
            self.nav_stack.push(self.state);
            self.state = state;
        }
    }

    /// Go back to previous state
    pub fn back(&mut self) -> bool {
        if let Some(prev) = self.nav_stack.pop() {
            self.state = prev;
            true
        } else {
            false
        }
    }

    /// Quit the application
    pub fn quit(&mut self) {
        self.running = false;
    }

    /// Replace the device list, keeping the selection on the same device if present
    pub fn set_devices(&mut self, devices: Vec<DeviceRecord>) {
        let selected_id = self.selected_device().map(|d| d.identifier.clone());
        self.devices = devices;
        self.list.set_len(self.devices.len());
        if let Some(id) = selected_id {
            if let Some(i) = self.devices.iter().position(|d| d.identifier == id) {
                self.list.selected = i;
            }
        }
    }

    /// Insert or update one device by identifier
    pub fn upsert_device(&mut self, device: DeviceRecord) {
        match self
            .devices
            .iter_mut()
            .find(|d| d.identifier == device.identifier)
        {
            Some(existing) => *existing = device,
            None => {
                self.devices.push(device);
                self.list.set_len(self.devices.len());
            }
        }
    }

    pub fn remove_device(&mut self, identifier: &str) {
        self.devices.retain(|d| d.identifier != identifier);
        self.list.set_len(self.devices.len());
    }

    pub fn selected_device(&self) -> Option<&DeviceRecord> {
        self.devices.get(self.list.selected)
    }

    pub fn device(&self, identifier: &str) -> Option<&DeviceRecord> {
        self.devices.iter().find(|d| d.identifier == identifier)
    }

    /// Show a pairing prompt; PIN prompts switch to PIN input mode
    pub fn set_pairing_prompt(&mut self, prompt: Option<PairingPrompt>) {
        self.input_mode = match prompt {
            Some(PairingPrompt::Pin { .. }) => InputMode::Pin,
            _ => InputMode::Normal,
        };
        self.pairing = prompt;
    }

    // -------------------------------------------------------------------------
    // Keyboard Event Handling
    // -------------------------------------------------------------------------

    /// Handle keyboard event, returning the action it requests (if any)
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.quit();
            return None;
        }

        // A notice swallows the key that dismisses it
        if self.ui.notice.is_some() {
            self.ui.dismiss_notice();
            return None;
        }

        if self.input_mode == InputMode::Pin {
            return self.handle_pin_key(key);
        }
        if matches!(self.pairing, Some(PairingPrompt::Failed { .. })) {
            return self.handle_failed_step_key(key);
        }
        if matches!(self.pairing, Some(PairingPrompt::DevicePin { .. })) {
            let reply = match key.code {
                KeyCode::Enter => PairingReply::Confirm,
                KeyCode::Tab => PairingReply::Skip,
                KeyCode::Esc => PairingReply::Cancel,
                _ => return None,
            };
            return Some(Action::PairingReply(reply));
        }
        if matches!(self.pairing, Some(PairingPrompt::Working { .. })) {
            return match key.code {
                KeyCode::Esc => Some(Action::PairingReply(PairingReply::Cancel)),
                _ => None,
            };
        }

        match key.code {
            KeyCode::Char('q') => {
                self.quit();
                return None;
            }
            KeyCode::Tab => {
                let next = match self.state {
                    AppState::Devices => AppState::Remote,
                    AppState::Remote => AppState::Devices,
                };
                self.navigate(next);
                return None;
            }
            _ => {}
        }

        match self.state {
            AppState::Devices => self.handle_devices_key(key),
            AppState::Remote => self.handle_remote_key(key),
        }
    }

    fn handle_pin_key(&mut self, key: KeyEvent) -> Option<Action> {
        let Some(PairingPrompt::Pin { length, input, .. }) = &mut self.pairing else {
            self.input_mode = InputMode::Normal;
            return None;
        };
        match key.code {
            KeyCode::Char(c) if c.is_ascii_digit() => {
                if input.len() < *length {
                    input.push(c);
                }
                None
            }
            KeyCode::Backspace => {
                input.pop();
                None
            }
            KeyCode::Enter if input.len() == *length => {
                let pin = input.clone();
                Some(Action::PairingReply(PairingReply::Pin(pin)))
            }
            KeyCode::Tab => Some(Action::PairingReply(PairingReply::Skip)),
            KeyCode::Esc => Some(Action::PairingReply(PairingReply::Cancel)),
            _ => None,
        }
    }

    fn handle_failed_step_key(&mut self, key: KeyEvent) -> Option<Action> {
        let reply = match key.code {
            KeyCode::Char('r') | KeyCode::Enter => PairingReply::Retry,
            KeyCode::Char('s') => PairingReply::Skip,
            KeyCode::Char('x') => PairingReply::Stop,
            KeyCode::Esc => PairingReply::Cancel,
            _ => return None,
        };
        Some(Action::PairingReply(reply))
    }

    fn handle_devices_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.list.up();
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.list.down();
                None
            }
            KeyCode::Home => {
                self.list.first();
                None
            }
            KeyCode::End => {
                self.list.last();
                None
            }
            KeyCode::Char('r') | KeyCode::F(5) => Some(Action::Discover),
            KeyCode::Esc if self.ui.discovery.is_loading() => Some(Action::CancelDiscovery),
            KeyCode::Esc => {
                self.back();
                None
            }
            KeyCode::Enter => self
                .selected_device()
                .map(|d| Action::Connect(d.identifier.clone())),
            KeyCode::Char('p') => self
                .selected_device()
                .map(|d| Action::Pair(d.identifier.clone())),
            KeyCode::Char('d') | KeyCode::Delete => self
                .selected_device()
                .map(|d| Action::Forget(d.identifier.clone())),
            _ => None,
        }
    }

    fn handle_remote_key(&mut self, key: KeyEvent) -> Option<Action> {
        let command = match key.code {
            KeyCode::Up => RemoteCommand::Navigate(Direction::Up),
            KeyCode::Down => RemoteCommand::Navigate(Direction::Down),
            KeyCode::Left => RemoteCommand::Navigate(Direction::Left),
            KeyCode::Right => RemoteCommand::Navigate(Direction::Right),
            KeyCode::Enter => RemoteCommand::Select,
            KeyCode::Backspace | KeyCode::Char('m') => RemoteCommand::Menu,
            KeyCode::Char('h') => RemoteCommand::Home,
            KeyCode::Char(' ') => RemoteCommand::PlayPause,
            KeyCode::Char('s') => RemoteCommand::Stop,
            KeyCode::Char('n') => RemoteCommand::Next,
            KeyCode::Char('b') => RemoteCommand::Previous,
            KeyCode::Char('+') | KeyCode::Char('=') => RemoteCommand::VolumeUp,
            KeyCode::Char('-') => RemoteCommand::VolumeDown,
            KeyCode::Esc => {
                self.back();
                return None;
            }
            _ => return None,
        };
        // Disabled until a session is up
        if !self.ui.controls_enabled() {
            return None;
        }
        Some(Action::Remote(command))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
