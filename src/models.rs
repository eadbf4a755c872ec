//! Data structures and types for atvtui
//!
//! Contains the shared models used across the application organized by domain:
//! - **Devices**: discovered Apple TV / HomePod records and their services
//! - **Commands**: command kinds and remote-control commands
//! - **Playback**: now-playing information polled from a session

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::OnceLock;
use std::time::Duration;

// =============================================================================
// Service Models
// =============================================================================

/// A protocol a device advertises, each independently pairable.
///
/// Declaration order is the fixed pairing order: control protocols first,
/// then streaming, then audio.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Mrp,
    Dmap,
    Companion,
    AirPlay,
    Raop,
}

/// What a service is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    Control,
    Streaming,
    Audio,
}

impl Service {
    pub const ALL: [Service; 5] = [
        Service::Mrp,
        Service::Dmap,
        Service::Companion,
        Service::AirPlay,
        Service::Raop,
    ];

    pub fn role(&self) -> ServiceRole {
        match self {
            Service::Mrp | Service::Dmap | Service::Companion => ServiceRole::Control,
            Service::AirPlay => ServiceRole::Streaming,
            Service::Raop => ServiceRole::Audio,
        }
    }

    /// Name used by atvremote's `--protocol` flag
    pub fn protocol_arg(&self) -> &'static str {
        match self {
            Service::Mrp => "mrp",
            Service::Dmap => "dmap",
            Service::Companion => "companion",
            Service::AirPlay => "airplay",
            Service::Raop => "raop",
        }
    }

    /// atvremote flag carrying this service's credentials
    pub fn credentials_flag(&self) -> String {
        format!("--{}-credentials", self.protocol_arg())
    }

    /// PIN digits the user must type for this service, if any.
    ///
    /// DMAP shows the PIN on the client and the user types it on the device.
    pub fn pin_length(&self) -> Option<usize> {
        match self {
            Service::Dmap => None,
            _ => Some(4),
        }
    }

    /// Parse the protocol name printed by `atvremote scan`
    pub fn from_scan_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "mrp" => Some(Service::Mrp),
            "dmap" => Some(Service::Dmap),
            "companion" => Some(Service::Companion),
            "airplay" => Some(Service::AirPlay),
            "raop" => Some(Service::Raop),
            _ => None,
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Mrp => write!(f, "MRP"),
            Service::Dmap => write!(f, "DMAP"),
            Service::Companion => write!(f, "Companion"),
            Service::AirPlay => write!(f, "AirPlay"),
            Service::Raop => write!(f, "RAOP"),
        }
    }
}

impl std::str::FromStr for Service {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Service::from_scan_name(s).ok_or_else(|| format!("Unknown protocol: {}", s))
    }
}

/// Pairing requirement reported per service by `atvremote scan`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PairingRequirement {
    Mandatory,
    #[default]
    Optional,
    NotNeeded,
    Disabled,
    Unsupported,
}

impl PairingRequirement {
    pub fn from_scan_value(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "mandatory" => PairingRequirement::Mandatory,
            "notneeded" => PairingRequirement::NotNeeded,
            "disabled" => PairingRequirement::Disabled,
            "unsupported" => PairingRequirement::Unsupported,
            _ => PairingRequirement::Optional,
        }
    }

    pub fn requires_pairing(&self) -> bool {
        matches!(
            self,
            PairingRequirement::Mandatory | PairingRequirement::Optional
        )
    }
}

/// One advertised service on a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service: Service,
    pub port: u16,
    #[serde(default)]
    pub pairing: PairingRequirement,
}

impl ServiceInfo {
    pub fn new(service: Service, port: u16, pairing: PairingRequirement) -> Self {
        Self {
            service,
            port,
            pairing,
        }
    }
}

// =============================================================================
// Device Models
// =============================================================================

/// Overall pairing state derived from a record's services and credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingStatus {
    /// No advertised service requires pairing
    NotRequired,
    Unpaired,
    PartiallyPaired,
    Paired,
}

impl fmt::Display for PairingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingStatus::NotRequired => write!(f, "Ready"),
            PairingStatus::Unpaired => write!(f, "Not paired"),
            PairingStatus::PartiallyPaired => write!(f, "Partially paired"),
            PairingStatus::Paired => write!(f, "Paired"),
        }
    }
}

/// Apple TV or HomePod discovered on the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Stable identifier reported by atvremote (first entry under Identifiers)
    pub identifier: String,
    pub name: String,
    pub model: Option<String>,
    pub address: IpAddr,
    pub services: Vec<ServiceInfo>,
    /// Opaque credential per paired service
    #[serde(default)]
    pub credentials: BTreeMap<Service, String>,
    pub last_seen: DateTime<Utc>,
}

impl DeviceRecord {
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        address: IpAddr,
        services: Vec<ServiceInfo>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            model: None,
            address,
            services,
            credentials: BTreeMap::new(),
            last_seen: Utc::now(),
        }
    }

    pub fn has_service(&self, service: Service) -> bool {
        self.services.iter().any(|s| s.service == service)
    }

    /// Services that require pairing, in pairing order
    pub fn pairable_services(&self) -> Vec<Service> {
        let mut services: Vec<Service> = self
            .services
            .iter()
            .filter(|s| s.pairing.requires_pairing())
            .map(|s| s.service)
            .collect();
        services.sort();
        services.dedup();
        services
    }

    /// Services that require pairing and have no credential yet, in pairing order
    pub fn unpaired_services(&self) -> Vec<Service> {
        self.pairable_services()
            .into_iter()
            .filter(|s| !self.credentials.contains_key(s))
            .collect()
    }

    pub fn pairing_status(&self) -> PairingStatus {
        let required = self.pairable_services();
        if required.is_empty() {
            return PairingStatus::NotRequired;
        }
        let paired = required
            .iter()
            .filter(|s| self.credentials.contains_key(s))
            .count();
        if paired == required.len() {
            PairingStatus::Paired
        } else if paired == 0 {
            PairingStatus::Unpaired
        } else {
            PairingStatus::PartiallyPaired
        }
    }

    pub fn is_paired(&self) -> bool {
        matches!(
            self.pairing_status(),
            PairingStatus::Paired | PairingStatus::NotRequired
        )
    }

    pub fn attach_credential(&mut self, service: Service, credential: impl Into<String>) {
        self.credentials.insert(service, credential.into());
    }

    /// Fold another sighting of the same address into this record
    pub fn merge_services(&mut self, other: &DeviceRecord) {
        for info in &other.services {
            if !self.has_service(info.service) {
                self.services.push(info.clone());
            }
        }
        if self.model.is_none() {
            self.model = other.model.clone();
        }
        if other.last_seen > self.last_seen {
            self.last_seen = other.last_seen;
        }
    }

    /// Whether a user-supplied name or identifier refers to this device
    pub fn matches(&self, query: &str) -> bool {
        let q = query.trim();
        self.identifier.eq_ignore_ascii_case(q)
            || self.name.eq_ignore_ascii_case(q)
            || self.address.to_string() == q
    }

    /// Parse devices from `atvremote scan` output.
    ///
    /// Format (one block per device):
    /// ```text
    ///        Name: Living Room
    ///    Model/SW: Apple TV 4K, tvOS 17.1
    ///     Address: 10.0.0.5
    /// Identifiers:
    ///  - 6D797FD3-3538-427E-A47B-A32FC6CF3A69
    /// Services:
    ///  - Protocol: Companion, Port: 49153, Credentials: None, Pairing: Mandatory
    /// ```
    pub fn parse_atvremote_scan(output: &str, seen_at: DateTime<Utc>) -> Vec<DeviceRecord> {
        #[derive(PartialEq)]
        enum Section {
            Header,
            Identifiers,
            Services,
        }

        struct Partial {
            name: String,
            model: Option<String>,
            address: Option<IpAddr>,
            identifiers: Vec<String>,
            services: Vec<ServiceInfo>,
        }

        fn finish(partial: Option<Partial>, seen_at: DateTime<Utc>, out: &mut Vec<DeviceRecord>) {
            let Some(p) = partial else { return };
            let Some(address) = p.address else { return };
            let identifier = p
                .identifiers
                .into_iter()
                .next()
                .unwrap_or_else(|| address.to_string());
            out.push(DeviceRecord {
                identifier,
                name: p.name,
                model: p.model,
                address,
                services: p.services,
                credentials: BTreeMap::new(),
                last_seen: seen_at,
            });
        }

        let mut devices = Vec::new();
        let mut current: Option<Partial> = None;
        let mut section = Section::Header;

        for raw in output.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with("===") || line.starts_with("Scan Results") {
                continue;
            }

            if let Some(item) = line.strip_prefix("- ") {
                let Some(dev) = current.as_mut() else { continue };
                match section {
                    Section::Identifiers => dev.identifiers.push(item.trim().to_string()),
                    Section::Services => {
                        if let Some(info) = parse_service_line(item) {
                            dev.services.push(info);
                        }
                    }
                    Section::Header => {}
                }
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim().to_lowercase().as_str() {
                "name" => {
                    finish(current.take(), seen_at, &mut devices);
                    current = Some(Partial {
                        name: value.to_string(),
                        model: None,
                        address: None,
                        identifiers: Vec::new(),
                        services: Vec::new(),
                    });
                    section = Section::Header;
                }
                "model/sw" | "model" => {
                    if let Some(dev) = current.as_mut() {
                        if !value.is_empty() && value != "Unknown" {
                            dev.model = Some(value.to_string());
                        }
                    }
                }
                "address" => {
                    if let Some(dev) = current.as_mut() {
                        dev.address = value.parse().ok();
                    }
                }
                "identifiers" => section = Section::Identifiers,
                "services" => section = Section::Services,
                _ => section = Section::Header,
            }
        }
        finish(current, seen_at, &mut devices);

        devices
    }
}

fn service_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Protocol:\s*(\w+)\s*,\s*Port:\s*(\d+)(?:.*?Pairing:\s*(\w+))?")
            .expect("service line regex is valid")
    })
}

/// Parse one "Protocol: X, Port: N, ..., Pairing: Y" service entry
fn parse_service_line(line: &str) -> Option<ServiceInfo> {
    let caps = service_line_regex().captures(line)?;
    let service = Service::from_scan_name(caps.get(1)?.as_str())?;
    let port = caps.get(2)?.as_str().parse().ok()?;
    let pairing = caps
        .get(3)
        .map(|m| PairingRequirement::from_scan_value(m.as_str()))
        .unwrap_or_default();
    Some(ServiceInfo::new(service, port, pairing))
}

impl fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.model {
            Some(model) => write!(f, "{} ({}) - {}", self.name, model, self.address),
            None => write!(f, "{} - {}", self.name, self.address),
        }
    }
}

// =============================================================================
// Command Models
// =============================================================================

/// Kind of user-triggered operation. At most one of each kind is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Discovery,
    Pairing,
    Connect,
    Navigate,
    Transport,
    Volume,
    NowPlaying,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Discovery => write!(f, "Discovery"),
            CommandKind::Pairing => write!(f, "Pairing"),
            CommandKind::Connect => write!(f, "Connect"),
            CommandKind::Navigate => write!(f, "Navigate"),
            CommandKind::Transport => write!(f, "Transport"),
            CommandKind::Volume => write!(f, "Volume"),
            CommandKind::NowPlaying => write!(f, "Now playing"),
        }
    }
}

/// Directional pad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// A single remote-control command sent to a connected device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteCommand {
    Navigate(Direction),
    Select,
    Menu,
    Home,
    Play,
    Pause,
    PlayPause,
    Stop,
    Next,
    Previous,
    VolumeUp,
    VolumeDown,
    /// Absolute volume, 0-100
    SetVolume(u8),
}

impl RemoteCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            RemoteCommand::Navigate(_)
            | RemoteCommand::Select
            | RemoteCommand::Menu
            | RemoteCommand::Home => CommandKind::Navigate,
            RemoteCommand::Play
            | RemoteCommand::Pause
            | RemoteCommand::PlayPause
            | RemoteCommand::Stop
            | RemoteCommand::Next
            | RemoteCommand::Previous => CommandKind::Transport,
            RemoteCommand::VolumeUp | RemoteCommand::VolumeDown | RemoteCommand::SetVolume(_) => {
                CommandKind::Volume
            }
        }
    }

    /// Command word understood by atvremote
    pub fn atvremote_arg(&self) -> String {
        match self {
            RemoteCommand::Navigate(Direction::Up) => "up".into(),
            RemoteCommand::Navigate(Direction::Down) => "down".into(),
            RemoteCommand::Navigate(Direction::Left) => "left".into(),
            RemoteCommand::Navigate(Direction::Right) => "right".into(),
            RemoteCommand::Select => "select".into(),
            RemoteCommand::Menu => "menu".into(),
            RemoteCommand::Home => "home".into(),
            RemoteCommand::Play => "play".into(),
            RemoteCommand::Pause => "pause".into(),
            RemoteCommand::PlayPause => "play_pause".into(),
            RemoteCommand::Stop => "stop".into(),
            RemoteCommand::Next => "next".into(),
            RemoteCommand::Previous => "previous".into(),
            RemoteCommand::VolumeUp => "volume_up".into(),
            RemoteCommand::VolumeDown => "volume_down".into(),
            RemoteCommand::SetVolume(level) => format!("set_volume={}", (*level).min(100)),
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteCommand::Navigate(d) => write!(f, "{:?}", d),
            RemoteCommand::SetVolume(level) => write!(f, "Volume {}%", level),
            other => write!(f, "{}", other.atvremote_arg().replace('_', " ")),
        }
    }
}

// =============================================================================
// Playback Models
// =============================================================================

/// Device state reported by `atvremote playing`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    #[default]
    Idle,
    Loading,
    Paused,
    Playing,
    Seeking,
    Stopped,
}

impl DeviceState {
    pub fn from_atvremote(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "playing" => DeviceState::Playing,
            "paused" => DeviceState::Paused,
            "loading" => DeviceState::Loading,
            "seeking" => DeviceState::Seeking,
            "stopped" => DeviceState::Stopped,
            _ => DeviceState::Idle,
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Idle => write!(f, "Idle"),
            DeviceState::Loading => write!(f, "Loading..."),
            DeviceState::Paused => write!(f, "⏸ Paused"),
            DeviceState::Playing => write!(f, "▶ Playing"),
            DeviceState::Seeking => write!(f, "Seeking..."),
            DeviceState::Stopped => write!(f, "⏹ Stopped"),
        }
    }
}

/// What a device is currently playing
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NowPlaying {
    pub state: DeviceState,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub app: Option<String>,
    pub position: Option<Duration>,
    pub total_time: Option<Duration>,
}

fn position_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s*/\s*(\d+)s").expect("position regex is valid"))
}

impl NowPlaying {
    /// Parse `atvremote playing` output
    ///
    /// ```text
    ///   Media type: Music
    /// Device state: Playing
    ///        Title: Song
    ///     Position: 12/300s (4.0%)
    /// ```
    pub fn parse_atvremote_playing(output: &str) -> Self {
        let mut playing = NowPlaying::default();

        for line in output.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.trim().to_lowercase().as_str() {
                "device state" => playing.state = DeviceState::from_atvremote(value),
                "title" => playing.title = Some(value.to_string()),
                "artist" => playing.artist = Some(value.to_string()),
                "album" => playing.album = Some(value.to_string()),
                "app" => playing.app = Some(value.to_string()),
                "position" => {
                    if let Some(caps) = position_regex().captures(value) {
                        playing.position = caps[1].parse().ok().map(Duration::from_secs);
                        playing.total_time = caps[2].parse().ok().map(Duration::from_secs);
                    }
                }
                "total time" => {
                    if let Some(secs) = value.trim_end_matches('s').trim().parse().ok() {
                        playing.total_time = Some(Duration::from_secs(secs));
                    }
                }
                _ => {}
            }
        }

        playing
    }

    /// Progress as a fraction (0.0-1.0)
    pub fn progress(&self) -> f64 {
        match (self.position, self.total_time) {
            (Some(pos), Some(total)) if !total.is_zero() => {
                (pos.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }

    pub fn format_position(&self) -> String {
        format_duration(self.position.unwrap_or_default())
    }

    pub fn format_total(&self) -> String {
        format_duration(self.total_time.unwrap_or_default())
    }
}

impl fmt::Display for NowPlaying {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = self.title.as_deref().unwrap_or("Nothing playing");
        write!(
            f,
            "{} {} ({} / {})",
            self.state,
            title,
            self.format_position(),
            self.format_total()
        )
    }
}

/// Format a duration as HH:MM:SS, or MM:SS under an hour
pub fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}
