use std::fmt;

use thiserror::Error;

/// Why the signaling transport could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFault {
    /// Nothing answered at the target address (process down, DNS, firewall).
    Unreachable,
    /// The server answered but refused the WebSocket upgrade.
    HandshakeRejected { status: Option<u16> },
    /// TLS negotiation failed (missing or invalid certificate).
    Tls,
    /// An established channel dropped.
    Dropped,
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportFault::Unreachable => write!(f, "server unreachable"),
            TransportFault::HandshakeRejected { status: Some(status) } => {
                write!(f, "upgrade rejected with HTTP {status}")
            }
            TransportFault::HandshakeRejected { status: None } => {
                write!(f, "upgrade rejected")
            }
            TransportFault::Tls => write!(f, "TLS handshake failed"),
            TransportFault::Dropped => write!(f, "connection dropped"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BabelError {
    #[error("invalid join request: {0}")]
    InvalidJoinRequest(String),
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("signaling transport unavailable ({fault}) at {url}: {detail}")]
    TransportUnavailable {
        url: String,
        fault: TransportFault,
        detail: String,
    },
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("decode failure: {0}")]
    DecodeFailure(String),
    #[error("track replacement failed: {0}")]
    TrackReplacement(String),
    #[error("session closed")]
    SessionClosed,
    #[error("invalid language tag: '{0}'")]
    InvalidLanguage(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl BabelError {
    pub(crate) fn transport(url: &str, fault: TransportFault, detail: impl Into<String>) -> Self {
        BabelError::TransportUnavailable {
            url: url.to_string(),
            fault,
            detail: detail.into(),
        }
    }

    /// Errors that end the current call and force a full teardown.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BabelError::ProtocolViolation(_) | BabelError::TransportUnavailable { .. }
        )
    }

    /// Whether retrying the same operation later can reasonably succeed.
    ///
    /// Transport faults are environmental; a protocol violation or a bad
    /// request will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            BabelError::TransportUnavailable { fault, .. } => {
                !matches!(fault, TransportFault::HandshakeRejected { status: Some(s) } if *s < 500)
            }
            BabelError::PermissionDenied(_) => true,
            _ => false,
        }
    }

    /// User-facing troubleshooting text for environmental faults.
    ///
    /// Returns `None` when the error is not caused by the environment.
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            BabelError::TransportUnavailable { url, fault, .. } => {
                let mut out = format!("Could not reach the signaling server.\n\nTarget URL: {url}\n\n");
                out.push_str("This is a server configuration issue, not a client one.\n\n");
                let hint = match fault {
                    TransportFault::Unreachable => {
                        "Is the backend process running? Check that the signaling service is up \
                         and that a firewall allows the port (443 for wss://)."
                    }
                    TransportFault::HandshakeRejected { .. } => {
                        "A reverse proxy (nginx, caddy, ...) most likely strips the WebSocket \
                         upgrade. For nginx make sure the location forwards\n  \
                         proxy_set_header Upgrade $http_upgrade;\n  \
                         proxy_set_header Connection \"upgrade\";"
                    }
                    TransportFault::Tls => {
                        "wss:// connections require a valid TLS certificate for the domain."
                    }
                    TransportFault::Dropped => {
                        "The connection was established and then lost. Check server logs and \
                         proxy idle timeouts."
                    }
                };
                out.push_str(hint);
                Some(out)
            }
            BabelError::ProtocolViolation(detail) => Some(format!(
                "The signaling server sent negotiation messages out of order or malformed \
                 ({detail}). Retrying will not help until the server is fixed."
            )),
            _ => None,
        }
    }
}
