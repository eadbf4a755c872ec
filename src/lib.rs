//! atvtui - Apple TV and HomePod remote for the terminal
//!
//! Every device operation (discovery, pairing, connect, remote commands)
//! runs on a worker task. The event loop only dispatches work and applies
//! completions, so the interface stays responsive while atvremote talks to
//! the network.
//!
//! # Modules
//!
//! - `models` - Devices, services, commands, now playing
//! - `backend` - atvremote wrapper behind the [`DeviceBackend`] trait
//! - `dispatch` - Single-flight async dispatch with ordered completions
//! - `discovery`, `pairing`, `session` - Workers for each operation
//! - `store` - Persisted devices and credentials
//! - `controller` - Glue between dispatch results and the UI
//! - `app`, `ui_state`, `ui` - Application state and rendering
//! - `cli`, `commands` - Scriptable interface

pub mod app;
pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod controller;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod models;
pub mod pairing;
pub mod session;
pub mod store;
pub mod ui;
pub mod ui_state;

// Re-export commonly used types
pub use models::{
    CommandKind, DeviceRecord, DeviceState, Direction, NowPlaying, PairingRequirement,
    PairingStatus, RemoteCommand, Service, ServiceInfo,
};

pub use app::{App, AppState};
pub use backend::{AtvRemote, DeviceBackend, PairingHandshake, RemoteSession};
pub use config::Config;
pub use controller::Controller;
pub use dispatch::{Completion, DispatchEvent, Dispatcher, Outcome, Ticket};
pub use error::{ErrorKind, RemoteError};
pub use store::{DeviceStore, FileStore, MemoryStore};
