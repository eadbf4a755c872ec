//! Connected device session
//!
//! Wraps a backend [`RemoteSession`] with per-command time bounds. Sessions
//! are shared behind an `Arc` so concurrent command kinds (navigation,
//! transport, volume, now-playing) can each hold one.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::backend::{DeviceBackend, RemoteSession};
use crate::error::RemoteError;
use crate::models::{DeviceRecord, Direction, NowPlaying, PairingStatus, RemoteCommand};

pub struct DeviceSession {
    device: DeviceRecord,
    remote: Arc<dyn RemoteSession>,
    command_timeout: Duration,
}

impl DeviceSession {
    /// Connect to `device` with its stored credentials
    pub async fn connect(
        backend: &dyn DeviceBackend,
        device: DeviceRecord,
        command_timeout: Duration,
    ) -> Result<Self, RemoteError> {
        if device.pairing_status() != PairingStatus::Paired
            && device.pairing_status() != PairingStatus::NotRequired
        {
            warn!(
                "{} is {}; some commands may be refused",
                device.name,
                device.pairing_status()
            );
        }

        let remote = timeout(command_timeout, backend.connect(&device))
            .await
            .map_err(|_| {
                RemoteError::Timeout(format!(
                    "{} did not answer within {}s",
                    device.name,
                    command_timeout.as_secs()
                ))
            })??;

        info!("Session open with {} ({})", device.name, device.address);
        Ok(Self {
            device,
            remote,
            command_timeout,
        })
    }

    /// Wrap an already-open remote session
    pub fn from_parts(
        device: DeviceRecord,
        remote: Arc<dyn RemoteSession>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            device,
            remote,
            command_timeout,
        }
    }

    pub fn device(&self) -> &DeviceRecord {
        &self.device
    }

    /// Send one command, bounded by the command timeout
    pub async fn send(&self, command: RemoteCommand) -> Result<(), RemoteError> {
        debug!("{} -> {}", command, self.device.name);
        timeout(self.command_timeout, self.remote.send(command))
            .await
            .map_err(|_| {
                RemoteError::Timeout(format!(
                    "{} not acknowledged within {}s",
                    command,
                    self.command_timeout.as_secs()
                ))
            })?
    }

    pub async fn navigate(&self, direction: Direction) -> Result<(), RemoteError> {
        self.send(RemoteCommand::Navigate(direction)).await
    }

    pub async fn select(&self) -> Result<(), RemoteError> {
        self.send(RemoteCommand::Select).await
    }

    pub async fn menu(&self) -> Result<(), RemoteError> {
        self.send(RemoteCommand::Menu).await
    }

    pub async fn home(&self) -> Result<(), RemoteError> {
        self.send(RemoteCommand::Home).await
    }

    pub async fn play(&self) -> Result<(), RemoteError> {
        self.send(RemoteCommand::Play).await
    }

    pub async fn pause(&self) -> Result<(), RemoteError> {
        self.send(RemoteCommand::Pause).await
    }

    pub async fn play_pause(&self) -> Result<(), RemoteError> {
        self.send(RemoteCommand::PlayPause).await
    }

    pub async fn volume_up(&self) -> Result<(), RemoteError> {
        self.send(RemoteCommand::VolumeUp).await
    }

    pub async fn volume_down(&self) -> Result<(), RemoteError> {
        self.send(RemoteCommand::VolumeDown).await
    }

    /// Set absolute volume (clamped to 0-100)
    pub async fn set_volume(&self, level: u8) -> Result<(), RemoteError> {
        self.send(RemoteCommand::SetVolume(level.min(100))).await
    }

    /// Fetch what is currently playing
    pub async fn playing(&self) -> Result<NowPlaying, RemoteError> {
        timeout(self.command_timeout, self.remote.playing())
            .await
            .map_err(|_| {
                RemoteError::Timeout(format!(
                    "now playing not reported within {}s",
                    self.command_timeout.as_secs()
                ))
            })?
    }
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("device", &self.device.identifier)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}
