//! CLI Command Tests
//!
//! Argument parsing, JSON output format, exit codes, and command handlers
//! run against a scripted backend.

mod common;

// =============================================================================
// CLI Argument Parsing Tests
// =============================================================================

mod cli_parsing {
    use clap::Parser;
    use atvtui::cli::{Cli, Command, NavKey, VolumeCmd, VolumeLevel};
    use atvtui::models::{Direction, RemoteCommand, Service};

    #[test]
    fn test_no_args_is_tui_mode() {
        let cli = Cli::parse_from::<_, &str>([]);
        assert!(!cli.is_cli_mode());
    }

    #[test]
    fn test_devices_and_scan_alias() {
        for name in ["devices", "scan"] {
            let cli = Cli::parse_from(["atvtui", name, "-t", "3"]);
            match cli.command {
                Some(Command::Devices(cmd)) => assert_eq!(cmd.timeout, Some(3)),
                _ => panic!("Expected Devices command for {}", name),
            }
        }
    }

    #[test]
    fn test_pair_positional_device_overrides_global() {
        let cli = Cli::parse_from(["atvtui", "-d", "Den", "pair", "Living Room", "--no-retry"]);
        match cli.command {
            Some(Command::Pair(ref cmd)) => {
                assert_eq!(cmd.effective_device(&cli.device), Some("Living Room"));
                assert!(cmd.no_retry);
                assert!(cmd.service.is_none());
            }
            _ => panic!("Expected Pair command"),
        }
    }

    #[test]
    fn test_pair_rejects_unknown_service() {
        let result = Cli::try_parse_from(["atvtui", "pair", "--service", "bluetooth"]);
        assert!(result.is_err());

        let cli = Cli::parse_from(["atvtui", "pair", "--service", "companion"]);
        match cli.command {
            Some(Command::Pair(cmd)) => assert_eq!(cmd.service, Some(Service::Companion)),
            _ => panic!("Expected Pair command"),
        }
    }

    #[test]
    fn test_nav_keys_map_to_commands() {
        let cases = [
            ("up", NavKey::Up, RemoteCommand::Navigate(Direction::Up)),
            ("select", NavKey::Select, RemoteCommand::Select),
            ("menu", NavKey::Menu, RemoteCommand::Menu),
            ("home", NavKey::Home, RemoteCommand::Home),
        ];
        for (arg, key, command) in cases {
            let cli = Cli::parse_from(["atvtui", "nav", arg]);
            match cli.command {
                Some(Command::Nav(cmd)) => {
                    assert_eq!(cmd.key, key);
                    assert_eq!(cmd.repeat, 1);
                    assert_eq!(RemoteCommand::from(cmd.key), command);
                }
                _ => panic!("Expected Nav command"),
            }
        }
    }

    #[test]
    fn test_transport_aliases() {
        assert!(matches!(
            Cli::parse_from(["atvtui", "pp"]).command,
            Some(Command::Toggle)
        ));
        assert!(matches!(
            Cli::parse_from(["atvtui", "prev"]).command,
            Some(Command::Previous)
        ));
        assert!(matches!(
            Cli::parse_from(["atvtui", "status", "-w"]).command,
            Some(Command::Playing(ref cmd)) if cmd.watch && cmd.interval == 2
        ));
    }

    #[test]
    fn test_volume_levels() {
        let level = |s: &str| VolumeCmd { level: s.to_string() }.parse_level();
        assert_eq!(level("0"), VolumeLevel::Absolute(0));
        assert_eq!(level("+5"), VolumeLevel::Relative(5));
        assert_eq!(level("-20"), VolumeLevel::Relative(-20));
        assert!(matches!(level("+x"), VolumeLevel::Invalid(_)));

        assert_eq!(
            VolumeLevel::Absolute(30).commands(),
            vec![RemoteCommand::SetVolume(30)]
        );
        assert_eq!(
            VolumeLevel::Relative(-20).commands(),
            vec![RemoteCommand::VolumeDown; 4]
        );
    }
}

// =============================================================================
// JSON Output Tests
// =============================================================================

mod json_output {
    use atvtui::cli::{CommandOk, ExitCode, JsonOutput};

    #[test]
    fn test_success_omits_error_and_exit_code() {
        let output = JsonOutput::success(CommandOk {
            status: "ok".into(),
            device: "Living Room".into(),
            command: "play pause".into(),
        });
        let json: serde_json::Value = serde_json::to_value(&output).unwrap();
        assert_eq!(json["data"]["device"], "Living Room");
        assert!(json.get("error").is_none());
        assert!(json.get("exit_code").is_none());
    }

    #[test]
    fn test_error_carries_exit_code() {
        let output = JsonOutput::<()>::error_msg("Device not found: Den", ExitCode::DeviceNotFound);
        let json: serde_json::Value = serde_json::to_value(&output).unwrap();
        assert_eq!(json["error"], "Device not found: Den");
        assert_eq!(json["exit_code"], 4);
        assert!(json.get("data").is_none());
    }
}

// =============================================================================
// Exit Code Tests
// =============================================================================

mod exit_codes {
    use atvtui::cli::ExitCode;
    use atvtui::error::RemoteError;

    #[test]
    fn test_every_error_maps_to_a_code() {
        let cases = [
            (RemoteError::Timeout("t".into()), ExitCode::Timeout),
            (RemoteError::Connection("c".into()), ExitCode::ConnectionError),
            (RemoteError::Protocol("p".into()), ExitCode::ProtocolError),
            (RemoteError::ToolMissing("atvremote".into()), ExitCode::ToolMissing),
            (RemoteError::Cancelled, ExitCode::Error),
            (RemoteError::ConcurrencyRejected("Pairing".into()), ExitCode::Error),
        ];
        for (err, code) in cases {
            assert_eq!(ExitCode::from(&err), code, "{:?}", err);
        }
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(i32::from(ExitCode::Success), 0);
        assert_eq!(i32::from(ExitCode::InvalidArgs), 2);
        assert_eq!(i32::from(ExitCode::DeviceNotFound), 4);
        assert_eq!(i32::from(ExitCode::ProtocolError), 6);
    }
}

// =============================================================================
// Command Handler Tests
// =============================================================================

mod handlers {
    use super::common::{living_room, office_pod, ScanScript, ScriptedBackend};
    use std::sync::Arc;

    use atvtui::cli::{DevicesCmd, ExitCode, ForgetCmd, Output, VolumeCmd};
    use atvtui::commands::{self, Context};
    use atvtui::config::Config;
    use atvtui::error::RemoteError;
    use atvtui::models::{RemoteCommand, Service};
    use atvtui::store::{DeviceStore, MemoryStore};

    fn quiet() -> Output {
        Output {
            json: false,
            quiet: true,
        }
    }

    fn context(backend: Arc<ScriptedBackend>, store: MemoryStore) -> Context {
        Context::new(Config::default(), backend, Box::new(store))
    }

    #[tokio::test]
    async fn test_devices_cmd() {
        let backend = Arc::new(ScriptedBackend::finding(vec![living_room(), office_pod()]));
        let mut ctx = context(backend, MemoryStore::new());
        let code = commands::devices_cmd(DevicesCmd { timeout: Some(2) }, &mut ctx, &quiet()).await;
        assert_eq!(code, ExitCode::Success);
    }

    #[tokio::test]
    async fn test_devices_cmd_empty_network() {
        let backend = Arc::new(ScriptedBackend::finding(vec![]));
        let mut ctx = context(backend, MemoryStore::new());
        let code = commands::devices_cmd(DevicesCmd { timeout: None }, &mut ctx, &quiet()).await;
        assert_eq!(code, ExitCode::DeviceNotFound);
    }

    #[tokio::test]
    async fn test_remote_cmd_resolves_by_scan() {
        let backend = Arc::new(ScriptedBackend::finding(vec![living_room(), office_pod()]));
        let mut ctx = context(Arc::clone(&backend), MemoryStore::new());

        let code = commands::remote_cmd(
            vec![RemoteCommand::PlayPause],
            Some("office pod"),
            &mut ctx,
            &quiet(),
        )
        .await;

        assert_eq!(code, ExitCode::Success);
        assert_eq!(backend.sent(), vec![RemoteCommand::PlayPause]);
    }

    #[tokio::test]
    async fn test_remote_cmd_unknown_device() {
        let backend = Arc::new(ScriptedBackend::finding(vec![living_room()]));
        let mut ctx = context(backend, MemoryStore::new());
        let code =
            commands::remote_cmd(vec![RemoteCommand::Play], Some("Kitchen"), &mut ctx, &quiet()).await;
        assert_eq!(code, ExitCode::DeviceNotFound);
    }

    #[tokio::test]
    async fn test_remote_cmd_without_device_is_invalid() {
        let backend = Arc::new(ScriptedBackend::default());
        let mut ctx = context(backend, MemoryStore::new());
        let code = commands::remote_cmd(vec![RemoteCommand::Play], None, &mut ctx, &quiet()).await;
        assert_eq!(code, ExitCode::InvalidArgs);
    }

    #[tokio::test]
    async fn test_stored_device_skips_scan() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.set_scan(ScanScript::Fail(RemoteError::Timeout("should not scan".into())));
        let mut store = MemoryStore::new();
        store.save_device(&living_room()).unwrap();
        let mut ctx = context(Arc::clone(&backend), store);

        let volume = VolumeCmd { level: "+10".into() };
        let code = commands::volume_cmd(volume, Some("Living Room"), &mut ctx, &quiet()).await;

        assert_eq!(code, ExitCode::Success);
        assert_eq!(backend.sent(), vec![RemoteCommand::VolumeUp; 2]);
    }

    #[tokio::test]
    async fn test_connection_error_exit_code() {
        let backend = Arc::new(ScriptedBackend::finding(vec![living_room()]));
        *backend.connect_error.lock().unwrap() = Some(RemoteError::Connection("refused".into()));
        let mut ctx = context(backend, MemoryStore::new());
        let code =
            commands::remote_cmd(vec![RemoteCommand::Menu], Some("Living Room"), &mut ctx, &quiet()).await;
        assert_eq!(code, ExitCode::ConnectionError);
    }

    #[tokio::test]
    async fn test_forget_cmd() {
        let mut device = living_room();
        device.attach_credential(Service::Companion, "c");
        let mut store = MemoryStore::new();
        store.save_device(&device).unwrap();
        let mut ctx = context(Arc::new(ScriptedBackend::default()), store);

        let forget = ForgetCmd {
            device: Some("Living Room".into()),
        };
        let code = commands::forget_cmd(forget, &None, &mut ctx, &quiet()).await;
        assert_eq!(code, ExitCode::Success);
        assert!(ctx.store.get_known_devices().is_empty());

        let again = ForgetCmd {
            device: Some("Living Room".into()),
        };
        let code = commands::forget_cmd(again, &None, &mut ctx, &quiet()).await;
        assert_eq!(code, ExitCode::DeviceNotFound);
    }
}
