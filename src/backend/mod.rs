//! Device backends
//!
//! The seam between atvtui and the library that actually speaks the Apple
//! TV protocols. The production backend drives the `atvremote` CLI; tests
//! plug in scripted backends.
//!
//! - `DeviceBackend`: scan, begin pairing, connect
//! - `PairingHandshake`: one in-progress pairing step for a single service
//! - `RemoteSession`: command channel to a connected device

pub mod atvremote;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::RemoteError;
use crate::models::{DeviceRecord, NowPlaying, RemoteCommand, Service};

pub use atvremote::AtvRemote;

/// Access to devices on the local network.
///
/// Implementations must classify every failure into a [`RemoteError`] before
/// returning it.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// Scan the network for up to `timeout`
    async fn scan(&self, timeout: Duration) -> Result<Vec<DeviceRecord>, RemoteError>;

    /// Start pairing `service` on `device`
    async fn begin_pairing(
        &self,
        device: &DeviceRecord,
        service: Service,
    ) -> Result<Box<dyn PairingHandshake>, RemoteError>;

    /// Open a control session using the credentials stored on `device`
    async fn connect(&self, device: &DeviceRecord) -> Result<Arc<dyn RemoteSession>, RemoteError>;
}

/// A pairing handshake waiting for (optional) PIN input
#[async_trait]
pub trait PairingHandshake: Send {
    /// Number of PIN digits the user must enter, or `None` if no PIN is needed
    fn pin_length(&self) -> Option<usize>;

    /// PIN the client made up for the user to type on the device (DMAP).
    /// The user must confirm before [`finish`](Self::finish) is called.
    fn device_pin(&self) -> Option<String> {
        None
    }

    /// Submit the PIN and wait for the credential
    async fn finish(&mut self, pin: Option<&str>) -> Result<String, RemoteError>;

    /// Abandon the handshake
    async fn abort(&mut self);
}

/// Control channel to one connected device
#[async_trait]
pub trait RemoteSession: Send + Sync {
    async fn send(&self, command: RemoteCommand) -> Result<(), RemoteError>;

    async fn playing(&self) -> Result<NowPlaying, RemoteError>;
}
