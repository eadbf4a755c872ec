//! CLI command handlers
//!
//! Each handler runs one operation to completion and maps failures onto
//! semantic exit codes. Handlers share the same workers the TUI dispatches,
//! so timeouts and pairing order behave identically in both modes.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

use crate::backend::DeviceBackend;
use crate::cli::*;
use crate::config::Config;
use crate::discovery::{reconcile, DiscoveryWorker};
use crate::error::RemoteError;
use crate::models::{DeviceRecord, RemoteCommand, Service};
use crate::pairing::{
    PairingInteraction, PairingReport, PairingSession, PairingState, PairingWorker, PinReply,
    StepDecision,
};
use crate::session::DeviceSession;
use crate::store::DeviceStore;

/// What every handler needs
pub struct Context {
    pub config: Config,
    pub backend: Arc<dyn DeviceBackend>,
    pub store: Box<dyn DeviceStore>,
}

impl Context {
    pub fn new(config: Config, backend: Arc<dyn DeviceBackend>, store: Box<dyn DeviceStore>) -> Self {
        Self {
            config,
            backend,
            store,
        }
    }

    fn discovery(&self) -> DiscoveryWorker {
        DiscoveryWorker::from_config(Arc::clone(&self.backend), &self.config)
    }
}

// =============================================================================
// Device Resolution
// =============================================================================

/// Find the device a query refers to.
///
/// Stored devices are checked first; otherwise the network is scanned.
/// With no query the configured default device is used.
pub async fn resolve_device(
    query: Option<&str>,
    ctx: &Context,
    output: &Output,
) -> Result<DeviceRecord, ExitCode> {
    let query = match query.or(ctx.config.default_device.as_deref()) {
        Some(q) => q.to_string(),
        None => {
            return Err(output.error(
                "No device given. Use --device or set default_device in the config",
                ExitCode::InvalidArgs,
            ))
        }
    };

    let known = ctx.store.get_known_devices();
    if let Some(device) = known.iter().find(|d| d.matches(&query)) {
        return Ok(device.clone());
    }

    output.info(format!("'{}' is not stored, scanning...", query));
    let found = ctx
        .discovery()
        .discover()
        .await
        .map_err(|e| output.remote_error("Scan failed", &e))?;

    reconcile(found, &known)
        .into_iter()
        .find(|d| d.matches(&query))
        .ok_or_else(|| output.error(format!("Device not found: {}", query), ExitCode::DeviceNotFound))
}

// =============================================================================
// Devices
// =============================================================================

#[derive(Serialize)]
struct DeviceRow {
    identifier: String,
    name: String,
    model: Option<String>,
    address: String,
    services: Vec<Service>,
    status: crate::models::PairingStatus,
}

impl From<&DeviceRecord> for DeviceRow {
    fn from(d: &DeviceRecord) -> Self {
        Self {
            identifier: d.identifier.clone(),
            name: d.name.clone(),
            model: d.model.clone(),
            address: d.address.to_string(),
            services: d.services.iter().map(|s| s.service).collect(),
            status: d.pairing_status(),
        }
    }
}

fn device_table(devices: &[DeviceRecord]) -> String {
    devices
        .iter()
        .map(|d| format!("{}  [{}]  {}", d, d.pairing_status(), d.identifier))
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn devices_cmd(cmd: DevicesCmd, ctx: &mut Context, output: &Output) -> ExitCode {
    let worker = match cmd.timeout {
        Some(secs) => {
            let scan = Duration::from_secs(secs.max(1));
            DiscoveryWorker::new(Arc::clone(&ctx.backend), scan, ctx.config.outer_timeout())
        }
        None => ctx.discovery(),
    };
    output.info(format!(
        "Scanning for devices ({}s)...",
        worker.scan_timeout().as_secs()
    ));

    let found = match worker.discover().await {
        Ok(found) => found,
        Err(e) => return output.remote_error("Scan failed", &e),
    };
    if found.is_empty() {
        return output.error("No devices found", ExitCode::DeviceNotFound);
    }

    let devices = reconcile(found, &ctx.store.get_known_devices());
    let rows: Vec<DeviceRow> = devices.iter().map(DeviceRow::from).collect();
    match output.print(&rows, || device_table(&devices)) {
        Ok(()) => ExitCode::Success,
        Err(e) => output.error(format!("Failed to serialize: {}", e), ExitCode::Error),
    }
}

pub async fn known_cmd(ctx: &mut Context, output: &Output) -> ExitCode {
    let devices = ctx.store.get_known_devices();
    let rows: Vec<DeviceRow> = devices.iter().map(DeviceRow::from).collect();
    let result = output.print(&rows, || {
        if devices.is_empty() {
            "No stored devices. Pair one with: atvtui pair <device>".to_string()
        } else {
            device_table(&devices)
        }
    });
    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => output.error(format!("Failed to serialize: {}", e), ExitCode::Error),
    }
}

pub async fn forget_cmd(cmd: ForgetCmd, global: &Option<String>, ctx: &mut Context, output: &Output) -> ExitCode {
    let Some(query) = cmd.device.as_deref().or(global.as_deref()) else {
        return output.error("No device given", ExitCode::InvalidArgs);
    };
    let Some(device) = ctx.store.get_known_devices().into_iter().find(|d| d.matches(query)) else {
        return output.error(format!("Device not stored: {}", query), ExitCode::DeviceNotFound);
    };

    match ctx.store.remove_device(&device.identifier) {
        Ok(_) => {
            #[derive(Serialize)]
            struct Forgotten {
                status: &'static str,
                identifier: String,
            }
            let data = Forgotten {
                status: "ok",
                identifier: device.identifier.clone(),
            };
            match output.print(&data, || format!("Forgot {}", device.name)) {
                Ok(()) => ExitCode::Success,
                Err(_) => ExitCode::Error,
            }
        }
        Err(e) => output.error(e.to_string(), ExitCode::Error),
    }
}

// =============================================================================
// Pairing
// =============================================================================

/// Pairing interaction over stdin/stderr
struct TerminalInteraction<'a> {
    lines: Lines<BufReader<Stdin>>,
    store: &'a mut dyn DeviceStore,
    output: &'a Output,
    no_retry: bool,
}

impl<'a> TerminalInteraction<'a> {
    async fn ask(&mut self, prompt: &str) -> Option<String> {
        eprint!("{}", prompt);
        match self.lines.next_line().await {
            Ok(Some(line)) => Some(line.trim().to_string()),
            _ => None,
        }
    }
}

#[async_trait]
impl<'a> PairingInteraction for TerminalInteraction<'a> {
    fn step_started(&mut self, device: &DeviceRecord, service: Service) {
        self.output
            .info(format!("Pairing {} on {}...", service, device.name));
    }

    async fn request_pin(&mut self, _device: &DeviceRecord, service: Service, length: usize) -> PinReply {
        let prompt = format!(
            "Enter the {}-digit {} PIN shown on screen ('s' to skip, empty to cancel): ",
            length, service
        );
        match self.ask(&prompt).await.as_deref() {
            None | Some("") => PinReply::Cancel,
            Some("s") | Some("skip") => PinReply::Skip,
            Some(pin) => PinReply::Pin(pin.to_string()),
        }
    }

    async fn confirm_device_pin(&mut self, device: &DeviceRecord, service: Service, pin: &str) -> PinReply {
        let prompt = format!(
            "Type PIN {} on {} for {}, then press ENTER ('s' to skip, 'c' to cancel): ",
            pin, device.name, service
        );
        match self.ask(&prompt).await.as_deref() {
            Some("") => PinReply::Confirm,
            Some("s") | Some("skip") => PinReply::Skip,
            _ => PinReply::Cancel,
        }
    }

    async fn step_failed(
        &mut self,
        _device: &DeviceRecord,
        service: Service,
        error: &RemoteError,
    ) -> StepDecision {
        self.output.info(format!("{} failed: {}", service, error));
        if self.no_retry {
            return StepDecision::Stop;
        }
        match self.ask("[r]etry, [s]kip, s[t]op, or [c]ancel? ").await.as_deref() {
            Some("r") | Some("retry") => StepDecision::Retry,
            Some("s") | Some("skip") => StepDecision::Skip,
            Some("t") | Some("stop") => StepDecision::Stop,
            _ => StepDecision::Cancel,
        }
    }

    fn credential_obtained(&mut self, device: &DeviceRecord, service: Service) {
        // Persist each credential right away so a later failure keeps it
        match self.store.save_device(device) {
            Ok(()) => info!("Stored {} credential for {}", service, device.name),
            Err(e) => warn!("Could not store {} credential: {}", service, e),
        }
    }
}

#[derive(Serialize)]
struct PairingSummary {
    device: String,
    state: PairingState,
    paired: Vec<Service>,
    skipped: Vec<Service>,
    failed: Vec<FailedStep>,
    remaining: Vec<Service>,
}

#[derive(Serialize)]
struct FailedStep {
    service: Service,
    error: String,
}

impl From<&PairingReport> for PairingSummary {
    fn from(r: &PairingReport) -> Self {
        Self {
            device: r.device.name.clone(),
            state: r.state,
            paired: r.paired.clone(),
            skipped: r.skipped.clone(),
            failed: r
                .failed
                .iter()
                .map(|(service, e)| FailedStep {
                    service: *service,
                    error: e.to_string(),
                })
                .collect(),
            remaining: r.device.unpaired_services(),
        }
    }
}

pub async fn pair_cmd(cmd: PairCmd, global: &Option<String>, ctx: &mut Context, output: &Output) -> ExitCode {
    let device = match resolve_device(cmd.effective_device(global), ctx, output).await {
        Ok(d) => d,
        Err(code) => return code,
    };

    let session = match cmd.service {
        Some(service) => {
            if !device.has_service(service) {
                return output.error(
                    format!("{} does not offer {}", device.name, service),
                    ExitCode::InvalidArgs,
                );
            }
            PairingSession::for_service(device, service)
        }
        None => {
            if device.unpaired_services().is_empty() {
                output.info(format!("{} has nothing left to pair", device.name));
            }
            PairingSession::new(device)
        }
    };

    let worker = PairingWorker::from_config(Arc::clone(&ctx.backend), &ctx.config);
    let mut interaction = TerminalInteraction {
        lines: BufReader::new(tokio::io::stdin()).lines(),
        store: ctx.store.as_mut(),
        output,
        no_retry: cmd.no_retry,
    };
    let report = worker.run(session, &mut interaction).await;

    // Also covers the case of nothing newly paired but refreshed metadata
    if let Err(e) = ctx.store.save_device(&report.device) {
        warn!("Could not store {}: {}", report.device.name, e);
    }

    let summary = PairingSummary::from(&report);
    let human = || {
        let mut text = format!("{}: {}", summary.device, summary.state);
        if !summary.remaining.is_empty() {
            let remaining: Vec<String> = summary.remaining.iter().map(|s| s.to_string()).collect();
            text.push_str(&format!(
                "\nStill unpaired: {} (run pair again to resume)",
                remaining.join(", ")
            ));
        }
        text
    };
    if output.print(&summary, human).is_err() {
        return ExitCode::Error;
    }

    match report.state {
        PairingState::FullyPaired => ExitCode::Success,
        PairingState::Cancelled => ExitCode::Error,
        PairingState::PartiallyPaired => report
            .failed
            .last()
            .map(|(_, e)| ExitCode::from(e))
            .unwrap_or(ExitCode::Error),
    }
}

// =============================================================================
// Remote Control
// =============================================================================

async fn open_session(device: Option<&str>, ctx: &Context, output: &Output) -> Result<DeviceSession, ExitCode> {
    let record = resolve_device(device, ctx, output).await?;
    DeviceSession::connect(ctx.backend.as_ref(), record, ctx.config.command_timeout())
        .await
        .map_err(|e| output.remote_error("Connect failed", &e))
}

/// Send `commands` in order to one device
pub async fn remote_cmd(
    commands: Vec<RemoteCommand>,
    device: Option<&str>,
    ctx: &mut Context,
    output: &Output,
) -> ExitCode {
    if commands.is_empty() {
        return output.error("Nothing to send", ExitCode::InvalidArgs);
    }
    let session = match open_session(device, ctx, output).await {
        Ok(s) => s,
        Err(code) => return code,
    };

    for command in &commands {
        if let Err(e) = session.send(*command).await {
            return output.remote_error(&format!("{} failed", command), &e);
        }
    }

    let name = commands
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let data = CommandOk {
        status: "ok".to_string(),
        device: session.device().name.clone(),
        command: name.clone(),
    };
    match output.print(&data, || format!("{} -> {}", name, session.device().name)) {
        Ok(()) => ExitCode::Success,
        Err(_) => ExitCode::Error,
    }
}

pub async fn volume_cmd(cmd: VolumeCmd, device: Option<&str>, ctx: &mut Context, output: &Output) -> ExitCode {
    let level = cmd.parse_level();
    if let VolumeLevel::Invalid(s) = &level {
        return output.error(format!("Invalid volume level: {}", s), ExitCode::InvalidArgs);
    }
    remote_cmd(level.commands(), device, ctx, output).await
}

pub async fn playing_cmd(cmd: PlayingCmd, device: Option<&str>, ctx: &mut Context, output: &Output) -> ExitCode {
    let session = match open_session(device, ctx, output).await {
        Ok(s) => s,
        Err(code) => return code,
    };
    let interval = Duration::from_secs(cmd.interval.max(1));

    loop {
        match session.playing().await {
            Ok(playing) => {
                if output.print(&playing, || playing.to_string()).is_err() {
                    return ExitCode::Error;
                }
            }
            Err(e) => return output.remote_error("Now playing failed", &e),
        }
        if !cmd.watch {
            return ExitCode::Success;
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PairingRequirement, ServiceInfo};
    use crate::store::MemoryStore;

    fn summary_report() -> PairingReport {
        let mut device = DeviceRecord::new(
            "ABCD",
            "Den",
            "10.0.0.7".parse().unwrap(),
            vec![
                ServiceInfo::new(Service::Companion, 49153, PairingRequirement::Mandatory),
                ServiceInfo::new(Service::AirPlay, 7000, PairingRequirement::Mandatory),
            ],
        );
        device.attach_credential(Service::Companion, "c");
        PairingReport {
            device,
            state: PairingState::PartiallyPaired,
            paired: vec![Service::Companion],
            skipped: vec![],
            failed: vec![(Service::AirPlay, RemoteError::Protocol("bad pin".into()))],
        }
    }

    #[test]
    fn test_pairing_summary_lists_remaining() {
        let summary = PairingSummary::from(&summary_report());
        assert_eq!(summary.remaining, vec![Service::AirPlay]);
        assert_eq!(summary.failed[0].error, "Protocol error: bad pin");
    }

    #[tokio::test]
    async fn test_resolve_device_prefers_store() {
        let mut store = MemoryStore::new();
        store.save_device(&summary_report().device).unwrap();
        let ctx = Context::new(
            Config::default(),
            Arc::new(crate::backend::AtvRemote::with_path("/nonexistent/atvremote")),
            Box::new(store),
        );
        let output = Output {
            json: true,
            quiet: true,
        };

        let device = resolve_device(Some("den"), &ctx, &output).await.unwrap();
        assert_eq!(device.identifier, "ABCD");

        // Unknown name falls through to a scan, which fails without atvremote
        let err = resolve_device(Some("Kitchen"), &ctx, &output).await.unwrap_err();
        assert_eq!(err, ExitCode::ToolMissing);
    }
}
