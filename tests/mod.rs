//! Integration tests for atvtui
//!
//! Tests are organized by component:
//! - discovery_test: Scanning, de-duplication, timeouts, controller wiring
//! - pairing_test: Multi-service pairing, resume, PIN timeout, UI prompts
//! - dispatch_test: Connect, remote commands, single-flight, now playing
//! - cli_test: Argument parsing, JSON output, exit codes, command handlers
//! - ui_test: Layout, remote pad highlight, overlays
//!
//! `common/` holds the scripted backend the tests share.

// Note: Each test file is a separate integration test crate
// Tests are run individually by cargo, not via mod.rs
