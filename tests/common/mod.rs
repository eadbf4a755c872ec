//! Scripted backend shared by the integration tests
//!
//! Every test crate pulls this in with `mod common;`, so not every helper is
//! used everywhere.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use atvtui::backend::{DeviceBackend, PairingHandshake, RemoteSession};
use atvtui::error::RemoteError;
use atvtui::models::{
    DeviceRecord, DeviceState, NowPlaying, PairingRequirement, RemoteCommand, Service, ServiceInfo,
};

// =============================================================================
// Fixtures
// =============================================================================

pub fn device(id: &str, name: &str, addr: &str, services: &[Service]) -> DeviceRecord {
    DeviceRecord::new(
        id,
        name,
        addr.parse().expect("fixture address"),
        services
            .iter()
            .map(|s| ServiceInfo::new(*s, 7000, PairingRequirement::Mandatory))
            .collect(),
    )
}

pub fn living_room() -> DeviceRecord {
    let mut d = device(
        "6D797FD3-3538-427E-A47B-A32FC6CF3A69",
        "Living Room",
        "10.0.0.5",
        &[Service::Companion, Service::AirPlay],
    );
    d.model = Some("Apple TV 4K".to_string());
    d
}

pub fn office_pod() -> DeviceRecord {
    let mut d = device(
        "AA:BB:CC:DD:EE:FF",
        "Office Pod",
        "10.0.0.9",
        &[Service::AirPlay, Service::Raop],
    );
    d.model = Some("HomePod Mini".to_string());
    d
}

pub fn now_playing(title: &str) -> NowPlaying {
    NowPlaying {
        state: DeviceState::Playing,
        title: Some(title.to_string()),
        position: Some(Duration::from_secs(30)),
        total_time: Some(Duration::from_secs(240)),
        ..NowPlaying::default()
    }
}

// =============================================================================
// Scripted Backend
// =============================================================================

/// What `scan` does
#[derive(Clone)]
pub enum ScanScript {
    Found(Vec<DeviceRecord>),
    Fail(RemoteError),
    /// Never returns
    Hang,
}

/// Backend whose every answer is set up by the test
pub struct ScriptedBackend {
    pub scan: Mutex<ScanScript>,
    pub scan_delay: Duration,
    /// Queued handshake results per service; an empty queue pairs successfully
    pub pair_results: Mutex<HashMap<Service, VecDeque<Result<String, RemoteError>>>>,
    pub pin_length: Option<usize>,
    /// PIN shown to the user for services that take none from the client
    pub device_pin: Option<String>,
    pub pair_attempts: Mutex<Vec<Service>>,
    pub aborted: Arc<Mutex<Vec<Service>>>,
    pub pins: Arc<Mutex<Vec<String>>>,
    /// Services whose handshake reached `finish`, in order
    pub finished: Arc<Mutex<Vec<Service>>>,
    pub connect_error: Mutex<Option<RemoteError>>,
    pub command_delay: Duration,
    pub sent: Arc<Mutex<Vec<RemoteCommand>>>,
    pub playing: NowPlaying,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            scan: Mutex::new(ScanScript::Found(Vec::new())),
            scan_delay: Duration::ZERO,
            pair_results: Mutex::new(HashMap::new()),
            pin_length: Some(4),
            device_pin: None,
            pair_attempts: Mutex::new(Vec::new()),
            aborted: Arc::new(Mutex::new(Vec::new())),
            pins: Arc::new(Mutex::new(Vec::new())),
            finished: Arc::new(Mutex::new(Vec::new())),
            connect_error: Mutex::new(None),
            command_delay: Duration::ZERO,
            sent: Arc::new(Mutex::new(Vec::new())),
            playing: NowPlaying::default(),
        }
    }
}

impl ScriptedBackend {
    pub fn finding(devices: Vec<DeviceRecord>) -> Self {
        Self {
            scan: Mutex::new(ScanScript::Found(devices)),
            ..Self::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            scan: Mutex::new(ScanScript::Hang),
            ..Self::default()
        }
    }

    pub fn set_scan(&self, script: ScanScript) {
        *self.scan.lock().unwrap() = script;
    }

    /// Queue the next handshake result for `service`
    pub fn script_pairing(&self, service: Service, result: Result<String, RemoteError>) {
        self.pair_results
            .lock()
            .unwrap()
            .entry(service)
            .or_default()
            .push_back(result);
    }

    pub fn attempts(&self) -> Vec<Service> {
        self.pair_attempts.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<RemoteCommand> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeviceBackend for ScriptedBackend {
    async fn scan(&self, _timeout: Duration) -> Result<Vec<DeviceRecord>, RemoteError> {
        let script = self.scan.lock().unwrap().clone();
        if !self.scan_delay.is_zero() {
            tokio::time::sleep(self.scan_delay).await;
        }
        match script {
            ScanScript::Found(devices) => Ok(devices),
            ScanScript::Fail(e) => Err(e),
            ScanScript::Hang => std::future::pending().await,
        }
    }

    async fn begin_pairing(
        &self,
        device: &DeviceRecord,
        service: Service,
    ) -> Result<Box<dyn PairingHandshake>, RemoteError> {
        self.pair_attempts.lock().unwrap().push(service);
        let result = self
            .pair_results
            .lock()
            .unwrap()
            .get_mut(&service)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Ok(format!("{}-{}", device.identifier, service.protocol_arg())));
        Ok(Box::new(ScriptedHandshake {
            service,
            pin_length: service.pin_length().and(self.pin_length),
            device_pin: match service.pin_length() {
                None => self.device_pin.clone(),
                Some(_) => None,
            },
            result: Some(result),
            aborted: Arc::clone(&self.aborted),
            pins: Arc::clone(&self.pins),
            finished: Arc::clone(&self.finished),
        }))
    }

    async fn connect(&self, _device: &DeviceRecord) -> Result<Arc<dyn RemoteSession>, RemoteError> {
        if let Some(e) = self.connect_error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(Arc::new(ScriptedSession {
            sent: Arc::clone(&self.sent),
            delay: self.command_delay,
            playing: self.playing.clone(),
        }))
    }
}

pub struct ScriptedHandshake {
    service: Service,
    pin_length: Option<usize>,
    device_pin: Option<String>,
    result: Option<Result<String, RemoteError>>,
    aborted: Arc<Mutex<Vec<Service>>>,
    pins: Arc<Mutex<Vec<String>>>,
    finished: Arc<Mutex<Vec<Service>>>,
}

#[async_trait]
impl PairingHandshake for ScriptedHandshake {
    fn pin_length(&self) -> Option<usize> {
        self.pin_length
    }

    fn device_pin(&self) -> Option<String> {
        self.device_pin.clone()
    }

    async fn finish(&mut self, pin: Option<&str>) -> Result<String, RemoteError> {
        self.finished.lock().unwrap().push(self.service);
        if let Some(pin) = pin {
            self.pins.lock().unwrap().push(pin.to_string());
        }
        self.result
            .take()
            .unwrap_or_else(|| Err(RemoteError::Protocol("handshake reused".into())))
    }

    async fn abort(&mut self) {
        self.aborted.lock().unwrap().push(self.service);
    }
}

pub struct ScriptedSession {
    sent: Arc<Mutex<Vec<RemoteCommand>>>,
    delay: Duration,
    playing: NowPlaying,
}

#[async_trait]
impl RemoteSession for ScriptedSession {
    async fn send(&self, command: RemoteCommand) -> Result<(), RemoteError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.sent.lock().unwrap().push(command);
        Ok(())
    }

    async fn playing(&self) -> Result<NowPlaying, RemoteError> {
        Ok(self.playing.clone())
    }
}
