//! Apple TV control via the atvremote CLI
//!
//! atvremote (shipped with pyatv) implements MRP, DMAP, Companion, AirPlay
//! and RAOP. Every operation here is one atvremote process; pairing keeps
//! the process alive between the PIN prompt and the PIN answer.

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, trace};

use super::{DeviceBackend, PairingHandshake, RemoteSession};
use crate::error::RemoteError;
use crate::models::{DeviceRecord, NowPlaying, RemoteCommand, Service};

/// atvremote CLI wrapper
#[derive(Debug, Clone)]
pub struct AtvRemote {
    /// Path to atvremote binary
    path: String,
}

impl AtvRemote {
    /// Create a wrapper using `atvremote` from PATH
    pub fn new() -> Self {
        Self {
            path: "atvremote".to_string(),
        }
    }

    /// Create with custom atvremote path
    pub fn with_path(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.path);
        // An aborted task drops the child; never leave atvremote running behind it
        cmd.kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> RemoteError {
        if e.kind() == std::io::ErrorKind::NotFound {
            RemoteError::ToolMissing(self.path.clone())
        } else {
            RemoteError::from(e)
        }
    }

    /// Run atvremote to completion, returning stdout on success
    async fn run(&self, args: &[String]) -> Result<String, RemoteError> {
        trace!(path = %self.path, ?args, "running atvremote");
        let result = self
            .command()
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        let stdout = String::from_utf8_lossy(&result.stdout).into_owned();
        if result.status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&result.stderr);
            Err(RemoteError::classify(&format!("{}\n{}", stdout, stderr)))
        }
    }

    /// Arguments for `atvremote scan`
    pub fn scan_args(timeout: Duration) -> Vec<String> {
        vec![
            "--scan-timeout".to_string(),
            timeout.as_secs().max(1).to_string(),
            "scan".to_string(),
        ]
    }

    /// Arguments selecting one device with all of its stored credentials
    pub fn device_args(device: &DeviceRecord) -> Vec<String> {
        let mut args = vec![
            "--id".to_string(),
            device.identifier.clone(),
            "--scan-hosts".to_string(),
            device.address.to_string(),
        ];
        for (service, credential) in &device.credentials {
            args.push(service.credentials_flag());
            args.push(credential.clone());
        }
        args
    }

    /// Arguments for pairing one service
    pub fn pair_args(device: &DeviceRecord, service: Service) -> Vec<String> {
        vec![
            "--id".to_string(),
            device.identifier.clone(),
            "--scan-hosts".to_string(),
            device.address.to_string(),
            "--protocol".to_string(),
            service.protocol_arg().to_string(),
            "pair".to_string(),
        ]
    }
}

impl Default for AtvRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceBackend for AtvRemote {
    async fn scan(&self, timeout: Duration) -> Result<Vec<DeviceRecord>, RemoteError> {
        info!("Scanning for devices ({}s)", timeout.as_secs());
        let stdout = self.run(&Self::scan_args(timeout)).await?;
        let devices = DeviceRecord::parse_atvremote_scan(&stdout, Utc::now());
        debug!("atvremote scan found {} device(s)", devices.len());
        Ok(devices)
    }

    async fn begin_pairing(
        &self,
        device: &DeviceRecord,
        service: Service,
    ) -> Result<Box<dyn PairingHandshake>, RemoteError> {
        info!("Pairing {} with {}", service, device.name);
        let mut child = self
            .command()
            .args(Self::pair_args(device, service))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| RemoteError::Io("atvremote stdout unavailable".into()))?;

        let mut transcript = String::new();
        let prompted = read_until_prompt(&mut stdout, &mut transcript).await?;
        debug!(prompted, "pairing handshake started for {}", service);

        Ok(Box::new(CliHandshake {
            child,
            stdout,
            transcript,
            prompted,
            service,
        }))
    }

    async fn connect(&self, device: &DeviceRecord) -> Result<Arc<dyn RemoteSession>, RemoteError> {
        let args = Self::device_args(device);
        let mut probe = args.clone();
        probe.push("device_info".to_string());
        self.run(&probe).await?;
        info!("Connected to {}", device.name);
        Ok(Arc::new(CliSession {
            remote: self.clone(),
            args,
        }))
    }
}

// =============================================================================
// Pairing
// =============================================================================

fn credentials_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)use these credentials:\s*(\S+)").expect("credentials regex is valid")
    })
}

fn device_pin_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)use (\d+) to pair").expect("device pin regex is valid"))
}

/// PIN atvremote asks the user to type on the device (DMAP prints
/// `Use 1234 to pair with "pyatv" (press ENTER to stop)`)
pub fn parse_device_pin(output: &str) -> Option<String> {
    device_pin_regex()
        .captures(output)
        .map(|c| c[1].to_string())
}

/// Extract the credential string atvremote prints after a successful pairing
pub fn parse_credentials(output: &str) -> Option<String> {
    credentials_regex()
        .captures(output)
        .map(|c| c[1].to_string())
}

/// Whether atvremote is now waiting for user input
pub fn is_pin_prompt(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains("enter pin") || lower.contains("pin code") || lower.contains("press enter")
}

/// Read stdout until atvremote prompts or exits. Returns `true` on a prompt.
async fn read_until_prompt(
    stdout: &mut ChildStdout,
    transcript: &mut String,
) -> Result<bool, RemoteError> {
    let mut buf = [0u8; 1024];
    loop {
        let n = stdout.read(&mut buf).await?;
        if n == 0 {
            return Ok(false);
        }
        transcript.push_str(&String::from_utf8_lossy(&buf[..n]));
        if is_pin_prompt(transcript) {
            return Ok(true);
        }
    }
}

struct CliHandshake {
    child: Child,
    stdout: ChildStdout,
    transcript: String,
    prompted: bool,
    service: Service,
}

#[async_trait]
impl PairingHandshake for CliHandshake {
    fn pin_length(&self) -> Option<usize> {
        if self.prompted {
            self.service.pin_length()
        } else {
            None
        }
    }

    fn device_pin(&self) -> Option<String> {
        if self.prompted {
            parse_device_pin(&self.transcript)
        } else {
            None
        }
    }

    async fn finish(&mut self, pin: Option<&str>) -> Result<String, RemoteError> {
        if self.prompted {
            if let Some(stdin) = self.child.stdin.as_mut() {
                let answer = format!("{}\n", pin.unwrap_or(""));
                stdin.write_all(answer.as_bytes()).await?;
                stdin.flush().await?;
            }
        }
        // Close stdin so atvremote never blocks on a second prompt
        drop(self.child.stdin.take());

        // Drain both pipes together so a long traceback cannot stall the child
        let mut stderr = self.child.stderr.take();
        let mut stderr_text = String::new();
        let read_stderr = async {
            if let Some(stderr) = stderr.as_mut() {
                if let Err(e) = stderr.read_to_string(&mut stderr_text).await {
                    debug!("Could not read atvremote stderr: {}", e);
                }
            }
        };
        let (read_stdout, ()) = tokio::join!(
            self.stdout.read_to_string(&mut self.transcript),
            read_stderr
        );
        read_stdout?;
        let status = self.child.wait().await?;

        match parse_credentials(&self.transcript) {
            Some(credential) if status.success() => Ok(credential),
            _ => Err(RemoteError::classify(&format!(
                "{}\n{}",
                self.transcript, stderr_text
            ))),
        }
    }

    async fn abort(&mut self) {
        if let Err(e) = self.child.kill().await {
            debug!("atvremote already gone: {}", e);
        }
    }
}

// =============================================================================
// Session
// =============================================================================

struct CliSession {
    remote: AtvRemote,
    /// Device selection and credential arguments
    args: Vec<String>,
}

#[async_trait]
impl RemoteSession for CliSession {
    async fn send(&self, command: RemoteCommand) -> Result<(), RemoteError> {
        let mut args = self.args.clone();
        args.push(command.atvremote_arg());
        self.remote.run(&args).await.map(|_| ())
    }

    async fn playing(&self) -> Result<NowPlaying, RemoteError> {
        let mut args = self.args.clone();
        args.push("playing".to_string());
        let stdout = self.remote.run(&args).await?;
        Ok(NowPlaying::parse_atvremote_playing(&stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PairingRequirement, ServiceInfo};

    fn device() -> DeviceRecord {
        DeviceRecord::new(
            "ABCD",
            "Living Room",
            "10.0.0.5".parse().unwrap(),
            vec![ServiceInfo::new(
                Service::Companion,
                49153,
                PairingRequirement::Mandatory,
            )],
        )
    }

    #[test]
    fn test_scan_args() {
        assert_eq!(
            AtvRemote::scan_args(Duration::from_secs(8)),
            vec!["--scan-timeout", "8", "scan"]
        );
        // Never ask atvremote for a zero-second scan
        assert_eq!(AtvRemote::scan_args(Duration::from_millis(200))[1], "1");
    }

    #[test]
    fn test_device_args_include_credentials() {
        let mut dev = device();
        dev.attach_credential(Service::Companion, "secret");
        let args = AtvRemote::device_args(&dev);
        assert_eq!(
            args,
            vec![
                "--id",
                "ABCD",
                "--scan-hosts",
                "10.0.0.5",
                "--companion-credentials",
                "secret"
            ]
        );
    }

    #[test]
    fn test_pair_args() {
        let args = AtvRemote::pair_args(&device(), Service::AirPlay);
        assert_eq!(&args[4..], &["--protocol", "airplay", "pair"]);
    }

    #[test]
    fn test_parse_credentials() {
        let out = "Enter PIN on screen: Pairing seems to have succeeded, yey!\n\
                   You may now use these credentials: 9a8b:7c6d:5e4f\n";
        assert_eq!(parse_credentials(out), Some("9a8b:7c6d:5e4f".to_string()));
        assert_eq!(parse_credentials("Pairing failed"), None);
    }

    #[test]
    fn test_pin_prompt_detection() {
        assert!(is_pin_prompt("Enter PIN on screen: "));
        assert!(is_pin_prompt("Use any pin to pair (press ENTER to stop)"));
        assert!(!is_pin_prompt("Scanning..."));
    }

    #[test]
    fn test_device_pin_parsing() {
        let out = "Use 7364 to pair with \"pyatv\" (press ENTER to stop)";
        assert!(is_pin_prompt(out));
        assert_eq!(parse_device_pin(out), Some("7364".to_string()));
        assert_eq!(parse_device_pin("Enter PIN on screen: "), None);
    }

    /// Write an executable stand-in for atvremote
    #[cfg(unix)]
    fn fake_atvremote(dir: &tempfile::TempDir, script: &str) -> AtvRemote {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join("atvremote");
        std::fs::write(&path, format!("#!/bin/sh\n{}", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        AtvRemote::with_path(path.to_string_lossy())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dmap_pairing_exposes_device_pin() {
        let dir = tempfile::tempdir().unwrap();
        let remote = fake_atvremote(
            &dir,
            "printf 'Use 7364 to pair with \"pyatv\" (press ENTER to stop)'\n\
             read answer\n\
             echo\n\
             echo 'You may now use these credentials: 0x1234abcd'\n",
        );

        let mut handshake = remote.begin_pairing(&device(), Service::Dmap).await.unwrap();
        assert_eq!(handshake.pin_length(), None);
        assert_eq!(handshake.device_pin(), Some("7364".to_string()));

        let credential = handshake.finish(None).await.unwrap();
        assert_eq!(credential, "0x1234abcd");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_stderr_does_not_stall_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let remote = fake_atvremote(
            &dir,
            "printf 'Enter PIN on screen: '\n\
             read pin\n\
             head -c 200000 /dev/zero >&2\n\
             echo 'Pairing failed'\n\
             exit 1\n",
        );

        let mut handshake = remote
            .begin_pairing(&device(), Service::Companion)
            .await
            .unwrap();
        assert_eq!(handshake.pin_length(), Some(4));

        let result = tokio::time::timeout(Duration::from_secs(5), handshake.finish(Some("1234")))
            .await
            .expect("finish returned before the timeout");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_missing() {
        let remote = AtvRemote::with_path("/nonexistent/atvremote");
        let result = remote.scan(Duration::from_secs(1)).await;
        assert_eq!(
            result.unwrap_err(),
            RemoteError::ToolMissing("/nonexistent/atvremote".into())
        );
    }
}
