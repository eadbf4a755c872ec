//! Multi-service pairing
//!
//! A device may require several services to be paired, each with its own
//! PIN handshake. Services are paired one at a time in a fixed order
//! (control, then streaming, then audio). Every credential is reported as
//! soon as it is obtained so a later failure never loses earlier progress,
//! and a new session started on the same device resumes at the first
//! service still lacking a credential.
//!
//! The worker never talks to the terminal or the UI directly. It asks a
//! [`PairingInteraction`] for PINs and for what to do after a failed step.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::backend::{DeviceBackend, PairingHandshake};
use crate::config::Config;
use crate::dispatch::DispatchEvent;
use crate::error::RemoteError;
use crate::models::{DeviceRecord, Service};

// =============================================================================
// Interaction
// =============================================================================

/// Answer to a PIN request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinReply {
    Pin(String),
    /// The PIN shown by the client was typed on the device
    Confirm,
    /// Leave this service unpaired and move on
    Skip,
    Cancel,
}

/// What to do after a step failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDecision {
    Retry,
    Skip,
    /// End the session keeping what was paired so far
    Stop,
    Cancel,
}

/// The user side of a pairing session
#[async_trait]
pub trait PairingInteraction: Send {
    fn step_started(&mut self, _device: &DeviceRecord, _service: Service) {}

    /// Ask for a `length`-digit PIN shown on the device
    async fn request_pin(&mut self, device: &DeviceRecord, service: Service, length: usize)
        -> PinReply;

    /// Show `pin` for the user to type on the device and wait until they
    /// have done so
    async fn confirm_device_pin(&mut self, device: &DeviceRecord, service: Service, pin: &str)
        -> PinReply;

    async fn step_failed(
        &mut self,
        device: &DeviceRecord,
        service: Service,
        error: &RemoteError,
    ) -> StepDecision;

    /// `device` already carries the new credential for `service`
    fn credential_obtained(&mut self, device: &DeviceRecord, service: Service);

    /// Polled between steps
    fn cancel_requested(&mut self) -> bool {
        false
    }
}

// =============================================================================
// Session and Report
// =============================================================================

/// Terminal state of a pairing session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingState {
    FullyPaired,
    PartiallyPaired,
    Cancelled,
}

impl std::fmt::Display for PairingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PairingState::FullyPaired => write!(f, "Fully paired"),
            PairingState::PartiallyPaired => write!(f, "Partially paired"),
            PairingState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Result of a pairing session. `device` always carries every credential
/// obtained, whatever the terminal state.
#[derive(Debug, Clone)]
pub struct PairingReport {
    pub device: DeviceRecord,
    pub state: PairingState,
    pub paired: Vec<Service>,
    pub skipped: Vec<Service>,
    pub failed: Vec<(Service, RemoteError)>,
}

/// Ordered queue of services still to pair on one device
#[derive(Debug, Clone)]
pub struct PairingSession {
    device: DeviceRecord,
    remaining: VecDeque<Service>,
    pin_length: Option<usize>,
    cancelled: bool,
}

impl PairingSession {
    /// Pair every required service that has no credential yet
    pub fn new(device: DeviceRecord) -> Self {
        let remaining = device.unpaired_services().into_iter().collect();
        Self {
            device,
            remaining,
            pin_length: None,
            cancelled: false,
        }
    }

    /// Pair (or re-pair) exactly one service
    pub fn for_service(device: DeviceRecord, service: Service) -> Self {
        Self {
            device,
            remaining: VecDeque::from([service]),
            pin_length: None,
            cancelled: false,
        }
    }

    pub fn device(&self) -> &DeviceRecord {
        &self.device
    }

    pub fn current(&self) -> Option<Service> {
        self.remaining.front().copied()
    }

    pub fn remaining(&self) -> impl Iterator<Item = Service> + '_ {
        self.remaining.iter().copied()
    }

    /// PIN length of the current step, once the device has asked for one
    pub fn pin_length(&self) -> Option<usize> {
        self.pin_length
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn advance(&mut self) {
        self.remaining.pop_front();
        self.pin_length = None;
    }

    fn terminal_state(&self) -> PairingState {
        if self.cancelled {
            PairingState::Cancelled
        } else if self.device.unpaired_services().is_empty() {
            PairingState::FullyPaired
        } else {
            PairingState::PartiallyPaired
        }
    }
}

/// A PIN must be exactly `length` ASCII digits
pub fn validate_pin(pin: &str, length: usize) -> Result<String, RemoteError> {
    let pin = pin.trim();
    if pin.len() == length && pin.chars().all(|c| c.is_ascii_digit()) {
        Ok(pin.to_string())
    } else {
        Err(RemoteError::Protocol(format!("PIN must be {} digits", length)))
    }
}

// =============================================================================
// Worker
// =============================================================================

enum StepResult {
    Paired(String),
    Skipped,
    Cancelled,
    Failed(RemoteError),
}

/// Drives a [`PairingSession`] to a terminal state
#[derive(Clone)]
pub struct PairingWorker {
    backend: Arc<dyn DeviceBackend>,
    step_timeout: Duration,
    pin_timeout: Duration,
}

impl PairingWorker {
    pub fn new(backend: Arc<dyn DeviceBackend>, step_timeout: Duration, pin_timeout: Duration) -> Self {
        Self {
            backend,
            step_timeout,
            pin_timeout,
        }
    }

    pub fn from_config(backend: Arc<dyn DeviceBackend>, config: &Config) -> Self {
        Self::new(backend, config.command_timeout(), config.pin_timeout())
    }

    /// Run every remaining step of `session`
    pub async fn run(
        &self,
        mut session: PairingSession,
        interaction: &mut dyn PairingInteraction,
    ) -> PairingReport {
        let mut paired = Vec::new();
        let mut skipped = Vec::new();
        let mut failed = Vec::new();

        info!(
            "Pairing {}: {:?}",
            session.device.name,
            session.remaining().collect::<Vec<_>>()
        );

        while let Some(service) = session.current() {
            if interaction.cancel_requested() {
                session.cancel();
                break;
            }
            interaction.step_started(&session.device, service);

            match self.attempt(&mut session, service, interaction).await {
                StepResult::Paired(credential) => {
                    info!("Paired {} on {}", service, session.device.name);
                    session.device.attach_credential(service, credential);
                    interaction.credential_obtained(&session.device, service);
                    paired.push(service);
                    session.advance();
                }
                StepResult::Skipped => {
                    debug!("Skipped {}", service);
                    skipped.push(service);
                    session.advance();
                }
                StepResult::Cancelled => {
                    session.cancel();
                    break;
                }
                StepResult::Failed(err) => {
                    warn!("Pairing {} on {} failed: {}", service, session.device.name, err);
                    let decision = interaction.step_failed(&session.device, service, &err).await;
                    match decision {
                        StepDecision::Retry => continue,
                        StepDecision::Skip => {
                            failed.push((service, err));
                            session.advance();
                        }
                        StepDecision::Stop => {
                            failed.push((service, err));
                            break;
                        }
                        StepDecision::Cancel => {
                            failed.push((service, err));
                            session.cancel();
                            break;
                        }
                    }
                }
            }
        }

        let state = session.terminal_state();
        info!("Pairing {} finished: {}", session.device.name, state);
        PairingReport {
            device: session.device,
            state,
            paired,
            skipped,
            failed,
        }
    }

    async fn attempt(
        &self,
        session: &mut PairingSession,
        service: Service,
        interaction: &mut dyn PairingInteraction,
    ) -> StepResult {
        let begin = timeout(
            self.step_timeout,
            self.backend.begin_pairing(&session.device, service),
        )
        .await;
        let mut handshake = match begin {
            Ok(Ok(handshake)) => handshake,
            Ok(Err(e)) => return StepResult::Failed(e),
            Err(_) => {
                return StepResult::Failed(RemoteError::Timeout(format!(
                    "{} pairing did not start within {}s",
                    service,
                    self.step_timeout.as_secs()
                )))
            }
        };

        if let Some(code) = handshake.device_pin() {
            let reply = timeout(
                self.pin_timeout,
                interaction.confirm_device_pin(&session.device, service, &code),
            )
            .await;
            return match reply {
                Ok(PinReply::Confirm) => {
                    finish(handshake.as_mut(), None, self.step_timeout, service).await
                }
                Ok(PinReply::Pin(_)) => {
                    handshake.abort().await;
                    StepResult::Failed(RemoteError::Protocol(format!(
                        "{} expects the PIN on the device, not here",
                        service
                    )))
                }
                other => self.abandon(handshake.as_mut(), other).await,
            };
        }

        let pin = match handshake.pin_length() {
            None => None,
            Some(length) => {
                session.pin_length = Some(length);
                let reply = timeout(
                    self.pin_timeout,
                    interaction.request_pin(&session.device, service, length),
                )
                .await;
                match reply {
                    Ok(PinReply::Pin(pin)) => match validate_pin(&pin, length) {
                        Ok(pin) => Some(pin),
                        Err(e) => {
                            handshake.abort().await;
                            return StepResult::Failed(e);
                        }
                    },
                    Ok(PinReply::Confirm) => {
                        handshake.abort().await;
                        return StepResult::Failed(RemoteError::Protocol(format!(
                            "{} needs a {}-digit PIN",
                            service, length
                        )));
                    }
                    other => return self.abandon(handshake.as_mut(), other).await,
                }
            }
        };

        finish(handshake.as_mut(), pin.as_deref(), self.step_timeout, service).await
    }

    /// Drop the handshake after a skip, a cancel or no answer at all
    async fn abandon(
        &self,
        handshake: &mut dyn PairingHandshake,
        reply: Result<PinReply, tokio::time::error::Elapsed>,
    ) -> StepResult {
        handshake.abort().await;
        match reply {
            Ok(PinReply::Skip) => StepResult::Skipped,
            Ok(_) => StepResult::Cancelled,
            Err(_) => {
                info!("No answer within {}s, cancelling", self.pin_timeout.as_secs());
                StepResult::Cancelled
            }
        }
    }
}

async fn finish(
    handshake: &mut dyn PairingHandshake,
    pin: Option<&str>,
    step_timeout: Duration,
    service: Service,
) -> StepResult {
    match timeout(step_timeout, handshake.finish(pin)).await {
        Ok(Ok(credential)) => StepResult::Paired(credential),
        Ok(Err(e)) => StepResult::Failed(e),
        Err(_) => {
            handshake.abort().await;
            StepResult::Failed(RemoteError::Timeout(format!(
                "{} pairing did not complete within {}s",
                service,
                step_timeout.as_secs()
            )))
        }
    }
}

// =============================================================================
// Channel Interaction
// =============================================================================

/// Pairing progress reported to the event loop
#[derive(Debug, Clone)]
pub enum PairingEvent {
    StepStarted {
        device: String,
        service: Service,
    },
    PinRequested {
        device: String,
        service: Service,
        length: usize,
    },
    /// The user must type `pin` on the device, then confirm
    DevicePinShown {
        device: String,
        service: Service,
        pin: String,
    },
    StepFailed {
        device: String,
        service: Service,
        error: RemoteError,
    },
    CredentialObtained {
        device: DeviceRecord,
        service: Service,
    },
}

/// User input routed back to a running pairing session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingReply {
    Pin(String),
    Confirm,
    Retry,
    Skip,
    Stop,
    Cancel,
}

/// Interaction that asks the event loop through [`DispatchEvent::Pairing`]
/// and reads answers from a channel
pub struct ChannelInteraction {
    events: mpsc::UnboundedSender<DispatchEvent>,
    replies: mpsc::UnboundedReceiver<PairingReply>,
}

impl ChannelInteraction {
    /// Returns the interaction and the sender the UI answers on
    pub fn new(
        events: mpsc::UnboundedSender<DispatchEvent>,
    ) -> (Self, mpsc::UnboundedSender<PairingReply>) {
        let (tx, replies) = mpsc::unbounded_channel();
        (Self { events, replies }, tx)
    }

    fn emit(&self, event: PairingEvent) {
        if self.events.send(DispatchEvent::Pairing(event)).is_err() {
            debug!("pairing event dropped: event loop closed");
        }
    }
}

#[async_trait]
impl PairingInteraction for ChannelInteraction {
    fn step_started(&mut self, device: &DeviceRecord, service: Service) {
        self.emit(PairingEvent::StepStarted {
            device: device.name.clone(),
            service,
        });
    }

    async fn request_pin(&mut self, device: &DeviceRecord, service: Service, length: usize) -> PinReply {
        self.emit(PairingEvent::PinRequested {
            device: device.name.clone(),
            service,
            length,
        });
        loop {
            match self.replies.recv().await {
                Some(PairingReply::Pin(pin)) => return PinReply::Pin(pin),
                Some(PairingReply::Skip) => return PinReply::Skip,
                Some(PairingReply::Cancel) | Some(PairingReply::Stop) | None => {
                    return PinReply::Cancel
                }
                Some(PairingReply::Retry) | Some(PairingReply::Confirm) => continue,
            }
        }
    }

    async fn confirm_device_pin(&mut self, device: &DeviceRecord, service: Service, pin: &str) -> PinReply {
        self.emit(PairingEvent::DevicePinShown {
            device: device.name.clone(),
            service,
            pin: pin.to_string(),
        });
        loop {
            match self.replies.recv().await {
                Some(PairingReply::Confirm) => return PinReply::Confirm,
                Some(PairingReply::Skip) => return PinReply::Skip,
                Some(PairingReply::Cancel) | Some(PairingReply::Stop) | None => {
                    return PinReply::Cancel
                }
                Some(PairingReply::Pin(_)) | Some(PairingReply::Retry) => continue,
            }
        }
    }

    async fn step_failed(
        &mut self,
        device: &DeviceRecord,
        service: Service,
        error: &RemoteError,
    ) -> StepDecision {
        self.emit(PairingEvent::StepFailed {
            device: device.name.clone(),
            service,
            error: error.clone(),
        });
        loop {
            match self.replies.recv().await {
                Some(PairingReply::Retry) => return StepDecision::Retry,
                Some(PairingReply::Skip) => return StepDecision::Skip,
                Some(PairingReply::Stop) => return StepDecision::Stop,
                Some(PairingReply::Cancel) | None => return StepDecision::Cancel,
                Some(PairingReply::Pin(_)) | Some(PairingReply::Confirm) => continue,
            }
        }
    }

    fn credential_obtained(&mut self, device: &DeviceRecord, service: Service) {
        self.emit(PairingEvent::CredentialObtained {
            device: device.clone(),
            service,
        });
    }

    fn cancel_requested(&mut self) -> bool {
        let mut cancelled = false;
        while let Ok(reply) = self.replies.try_recv() {
            if reply == PairingReply::Cancel {
                cancelled = true;
            }
        }
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pin() {
        assert_eq!(validate_pin(" 1234 ", 4), Ok("1234".to_string()));
        assert!(validate_pin("123", 4).is_err());
        assert!(validate_pin("12a4", 4).is_err());
    }

    #[tokio::test]
    async fn test_channel_interaction_round_trip() {
        let (events, mut rx) = mpsc::unbounded_channel();
        let (mut interaction, replies) = ChannelInteraction::new(events);
        let device = DeviceRecord::new("ABCD", "Den", "10.0.0.7".parse().unwrap(), vec![]);

        replies.send(PairingReply::Retry).unwrap();
        replies.send(PairingReply::Pin("0000".into())).unwrap();
        let reply = interaction.request_pin(&device, Service::Companion, 4).await;
        assert_eq!(reply, PinReply::Pin("0000".into()));

        match rx.recv().await {
            Some(DispatchEvent::Pairing(PairingEvent::PinRequested { length, .. })) => {
                assert_eq!(length, 4)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_reply_sender_cancels() {
        let (events, _rx) = mpsc::unbounded_channel();
        let (mut interaction, replies) = ChannelInteraction::new(events);
        drop(replies);
        let device = DeviceRecord::new("ABCD", "Den", "10.0.0.7".parse().unwrap(), vec![]);

        let reply = interaction.request_pin(&device, Service::AirPlay, 4).await;
        assert_eq!(reply, PinReply::Cancel);
    }

    #[tokio::test]
    async fn test_device_pin_waits_for_confirm() {
        let (events, mut rx) = mpsc::unbounded_channel();
        let (mut interaction, replies) = ChannelInteraction::new(events);
        let device = DeviceRecord::new("ABCD", "Den", "10.0.0.7".parse().unwrap(), vec![]);

        replies.send(PairingReply::Pin("1111".into())).unwrap();
        replies.send(PairingReply::Confirm).unwrap();
        let reply = interaction.confirm_device_pin(&device, Service::Dmap, "7364").await;
        assert_eq!(reply, PinReply::Confirm);

        match rx.recv().await {
            Some(DispatchEvent::Pairing(PairingEvent::DevicePinShown { pin, service, .. })) => {
                assert_eq!(pin, "7364");
                assert_eq!(service, Service::Dmap);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_cancel_requested_drains_replies() {
        let (events, _rx) = mpsc::unbounded_channel();
        let (mut interaction, replies) = ChannelInteraction::new(events);
        assert!(!interaction.cancel_requested());
        replies.send(PairingReply::Skip).unwrap();
        replies.send(PairingReply::Cancel).unwrap();
        assert!(interaction.cancel_requested());
        assert!(!interaction.cancel_requested());
    }
}
