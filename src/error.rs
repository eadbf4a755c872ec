//! Error taxonomy for device operations
//!
//! Every failure coming out of a backend is classified before it reaches the
//! dispatcher, so the UI can decide between a notice, a retry hint, or a
//! silent log line.

use thiserror::Error;

/// Errors from discovery, pairing and remote commands
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Operation exceeded its time bound
    #[error("Timed out: {0}")]
    Timeout(String),
    /// Device unreachable or refused the connection
    #[error("Connection failed: {0}")]
    Connection(String),
    /// Device rejected the handshake or command (wrong PIN, unsupported, ...)
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// A command of the same kind is already in flight
    #[error("{0} already in progress")]
    ConcurrencyRejected(String),
    /// Operation was cancelled by the user
    #[error("Cancelled")]
    Cancelled,
    /// The atvremote binary could not be started
    #[error("atvremote not found at '{0}'. Install with: pip install pyatv")]
    ToolMissing(String),
    /// Local I/O failure while talking to the backend process
    #[error("I/O error: {0}")]
    Io(String),
}

/// Coarse error kind shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    Connection,
    Protocol,
    Rejected,
    Cancelled,
    Setup,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Connection => "Connection",
            ErrorKind::Protocol => "Protocol",
            ErrorKind::Rejected => "Busy",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Setup => "Setup",
        };
        f.write_str(label)
    }
}

impl RemoteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::Timeout(_) => ErrorKind::Timeout,
            RemoteError::Connection(_) => ErrorKind::Connection,
            RemoteError::Protocol(_) => ErrorKind::Protocol,
            RemoteError::ConcurrencyRejected(_) => ErrorKind::Rejected,
            RemoteError::Cancelled => ErrorKind::Cancelled,
            RemoteError::ToolMissing(_) | RemoteError::Io(_) => ErrorKind::Setup,
        }
    }

    /// Whether retrying without user action can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Timeout(_) | RemoteError::Connection(_))
    }

    /// Duplicate invocations and cancellations are never surfaced to the user
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            RemoteError::ConcurrencyRejected(_) | RemoteError::Cancelled
        )
    }

    /// Classify a failed atvremote invocation from its stderr/stdout text
    pub fn classify(output: &str) -> Self {
        let text = output.trim();
        let lower = text.to_lowercase();
        let message = text
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("unknown error")
            .trim()
            .to_string();

        if lower.contains("timeout") || lower.contains("timed out") {
            RemoteError::Timeout(message)
        } else if lower.contains("connection refused")
            || lower.contains("no route to host")
            || lower.contains("connectionfailed")
            || lower.contains("could not find any apple tv")
            || lower.contains("device not found")
            || lower.contains("network is unreachable")
            || lower.contains("host is down")
        {
            RemoteError::Connection(message)
        } else {
            RemoteError::Protocol(message)
        }
    }
}

impl From<std::io::Error> for RemoteError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut => RemoteError::Timeout(e.to_string()),
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted => RemoteError::Connection(e.to_string()),
            _ => RemoteError::Io(e.to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for RemoteError {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        RemoteError::Timeout(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_timeout() {
        let err = RemoteError::classify("Traceback...\nasyncio.exceptions.TimeoutError: timed out");
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_connection() {
        let err = RemoteError::classify("ConnectionRefusedError: [Errno 111] Connection refused");
        assert_eq!(err.kind(), ErrorKind::Connection);

        let err = RemoteError::classify("Could not find any Apple TV on current network");
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[test]
    fn test_classify_protocol_fallback() {
        let err = RemoteError::classify("pyatv.exceptions.PairingError: bad pin\n");
        assert_eq!(err, RemoteError::Protocol("pyatv.exceptions.PairingError: bad pin".into()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_empty_output() {
        assert_eq!(
            RemoteError::classify(""),
            RemoteError::Protocol("unknown error".into())
        );
    }

    #[test]
    fn test_silent_errors() {
        assert!(RemoteError::ConcurrencyRejected("Discovery".into()).is_silent());
        assert!(RemoteError::Cancelled.is_silent());
        assert!(!RemoteError::Timeout("x".into()).is_silent());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(RemoteError::from(io).kind(), ErrorKind::Connection);

        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert_eq!(RemoteError::from(io).kind(), ErrorKind::Timeout);
    }
}
