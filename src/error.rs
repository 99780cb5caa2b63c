//! Error types for the DL-Learner session client.
//!
//! Every remote round trip can fail in one of a handful of ways. The
//! transport reports *how* a call failed ([`TransportFault`]); the client
//! decides *what that means* for the session ([`ClientError`]), attaching
//! the session handle and the operation or configuration step involved.
//! Nothing is retried automatically.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::{ConfigStep, Operation, SessionHandle, SessionStage};

/// How a single remote call failed, as reported by a transport.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportFault {
    /// The endpoint could not be reached (connection refused, DNS, TLS).
    #[error("endpoint unreachable: {message}")]
    Unreachable { message: String },

    /// The call did not complete within the allotted time.
    #[error("call timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    /// The response could not be decoded into a result or fault.
    #[error("malformed response: {message}")]
    Malformed { message: String },

    /// The service processed the call and reported a fault.
    #[error("service fault{}: {message}", .code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    Fault {
        code: Option<String>,
        message: String,
    },
}

impl TransportFault {
    /// Create an unreachable fault.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    /// Create a timeout fault.
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout { after }
    }

    /// Create a malformed-response fault.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Create a service-reported fault.
    pub fn fault(code: Option<String>, message: impl Into<String>) -> Self {
        Self::Fault {
            code,
            message: message.into(),
        }
    }

    /// Whether the service itself reported the failure.
    pub fn is_service_fault(&self) -> bool {
        matches!(self, TransportFault::Fault { .. })
    }
}

/// The main error type for session client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Connection refused, timeout or malformed response on a remote call.
    #[error("transport error in {operation}{}: {source}", session_suffix(.session))]
    Transport {
        operation: String,
        session: Option<String>,
        #[source]
        source: TransportFault,
    },

    /// The response does not match the expected call contract.
    #[error("protocol error in {operation}: {message}")]
    Protocol { operation: String, message: String },

    /// One of the four configuration calls was rejected or failed.
    #[error("configuration step '{step}' failed for session {session}: {source}")]
    Configuration {
        session: String,
        step: ConfigStep,
        #[source]
        source: TransportFault,
    },

    /// A session operation was invoked out of the required stage order.
    #[error("cannot {operation} session {session} in stage {stage}")]
    Sequence {
        session: String,
        operation: &'static str,
        stage: SessionStage,
    },

    /// The service completed the call but reported a learning/reasoning failure.
    #[error("remote computation failed in {operation} for session {session}: {message}")]
    RemoteComputation {
        session: String,
        operation: String,
        message: String,
    },

    /// The caller cancelled the session or its deadline elapsed.
    #[error("session {session} cancelled before {operation}")]
    Cancelled { session: String, operation: String },

    /// Configuration loading or validation errors.
    #[error("config error: {message}")]
    Config { message: String },

    /// I/O errors from the descriptor cache or config files.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON or TOML serialization errors.
    #[error("serialization error: {message}")]
    Serde { message: String },
}

fn session_suffix(session: &Option<String>) -> String {
    session
        .as_deref()
        .map(|s| format!(" (session {s})"))
        .unwrap_or_default()
}

/// A specialized Result type for session client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Create a transport error.
    pub fn transport(
        operation: impl Into<String>,
        session: Option<&str>,
        source: TransportFault,
    ) -> Self {
        Self::Transport {
            operation: operation.into(),
            session: session.map(str::to_string),
            source,
        }
    }

    /// Create a protocol error.
    pub fn protocol(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a configuration step error.
    pub fn configuration(session: impl Into<String>, step: ConfigStep, source: TransportFault) -> Self {
        Self::Configuration {
            session: session.into(),
            step,
            source,
        }
    }

    /// Create a sequence error.
    pub fn sequence(session: impl Into<String>, operation: &'static str, stage: SessionStage) -> Self {
        Self::Sequence {
            session: session.into(),
            operation,
            stage,
        }
    }

    /// Create a remote computation error.
    pub fn remote_computation(
        session: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::RemoteComputation {
            session: session.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(session: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Cancelled {
            session: session.into(),
            operation: operation.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a storage error from an I/O error.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error.
    pub fn serde(message: impl Into<String>) -> Self {
        Self::Serde {
            message: message.into(),
        }
    }

    /// Whether the session involved can no longer be used.
    ///
    /// Configuration failures leave the session resumable from the failed
    /// step, and sequence errors do not touch the session at all.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClientError::Transport { .. }
                | ClientError::Protocol { .. }
                | ClientError::RemoteComputation { .. }
                | ClientError::Cancelled { .. }
        )
    }

    /// The session handle this error refers to, if any.
    pub fn session(&self) -> Option<&str> {
        match self {
            ClientError::Transport { session, .. } => session.as_deref(),
            ClientError::Configuration { session, .. }
            | ClientError::Sequence { session, .. }
            | ClientError::RemoteComputation { session, .. }
            | ClientError::Cancelled { session, .. } => Some(session),
            _ => None,
        }
    }
}

/// Why a single round trip made on behalf of a session did not return a value.
///
/// Internal to the client: each stage maps it onto the [`ClientError`]
/// variant appropriate for that point in the protocol.
#[derive(Debug)]
pub(crate) enum CallError {
    /// The session was cancelled or its deadline passed before the call.
    Cancelled,
    /// The call could not be marshalled against the service descriptor.
    Protocol(String),
    /// The transport reported a failure.
    Fault(TransportFault),
}

impl CallError {
    /// Default mapping, used where a stage has no more specific one.
    pub(crate) fn into_client_error(self, operation: Operation, session: &SessionHandle) -> ClientError {
        match self {
            CallError::Cancelled => ClientError::cancelled(session.as_str(), operation.name()),
            CallError::Protocol(message) => ClientError::protocol(operation.name(), message),
            CallError::Fault(fault) => {
                ClientError::transport(operation.name(), Some(session.as_str()), fault)
            }
        }
    }
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        Self::Storage {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}

/// Exit codes for the dlsession CLI.
pub mod exit_codes {
    use super::ClientError;

    /// Learning run completed.
    pub const SUCCESS: i32 = 0;

    /// Local problem: bad arguments, config or cache.
    pub const USAGE: i32 = 1;

    /// Transport or protocol failure talking to the service.
    pub const TRANSPORT: i32 = 2;

    /// The service rejected a configuration step or failed to learn.
    pub const REMOTE: i32 = 3;

    /// The run was cancelled or ran past its deadline.
    pub const CANCELLED: i32 = 4;

    /// Map an error to the exit code reported by the CLI.
    pub fn for_error(err: &ClientError) -> i32 {
        match err {
            ClientError::Transport { .. } | ClientError::Protocol { .. } => TRANSPORT,
            ClientError::Configuration { .. } | ClientError::RemoteComputation { .. } => REMOTE,
            ClientError::Cancelled { .. } => CANCELLED,
            _ => USAGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_fault_display() {
        let fault = TransportFault::timeout(Duration::from_millis(1500));
        assert_eq!(fault.to_string(), "call timed out after 1500ms");
    }

    #[test]
    fn test_service_fault_display_with_code() {
        let fault = TransportFault::fault(Some("E42".to_string()), "unknown reasoner");
        assert_eq!(fault.to_string(), "service fault [E42]: unknown reasoner");
        assert!(fault.is_service_fault());
    }

    #[test]
    fn test_service_fault_display_without_code() {
        let fault = TransportFault::fault(None, "boom");
        assert_eq!(fault.to_string(), "service fault: boom");
    }

    #[test]
    fn test_transport_error_display_includes_session() {
        let err = ClientError::transport(
            "init",
            Some("sess-1"),
            TransportFault::unreachable("connection refused"),
        );
        assert_eq!(
            err.to_string(),
            "transport error in init (session sess-1): endpoint unreachable: connection refused"
        );
        assert_eq!(err.session(), Some("sess-1"));
    }

    #[test]
    fn test_transport_error_display_without_session() {
        let err = ClientError::transport(
            "generateID",
            None,
            TransportFault::timeout(Duration::from_secs(1)),
        );
        assert!(err.to_string().starts_with("transport error in generateID:"));
        assert_eq!(err.session(), None);
    }

    #[test]
    fn test_configuration_error_display() {
        let err = ClientError::configuration(
            "sess-1",
            ConfigStep::Reasoner,
            TransportFault::fault(None, "no such reasoner"),
        );
        assert_eq!(
            err.to_string(),
            "configuration step 'reasoner' failed for session sess-1: service fault: no such reasoner"
        );
    }

    #[test]
    fn test_sequence_error_display() {
        let err = ClientError::sequence("sess-1", "learn", SessionStage::Configured);
        assert_eq!(err.to_string(), "cannot learn session sess-1 in stage configured");
    }

    #[test]
    fn test_is_terminal() {
        assert!(ClientError::remote_computation("s", "learn", "x").is_terminal());
        assert!(ClientError::cancelled("s", "init").is_terminal());
        assert!(ClientError::protocol("generateID", "empty").is_terminal());
        assert!(!ClientError::sequence("s", "learn", SessionStage::Created).is_terminal());
        assert!(!ClientError::configuration(
            "s",
            ConfigStep::Algorithm,
            TransportFault::malformed("x")
        )
        .is_terminal());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: ClientError = io_err.into();
        assert!(matches!(err, ClientError::Storage { .. }));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: ClientError = json_err.into();
        assert!(matches!(err, ClientError::Serde { .. }));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            exit_codes::for_error(&ClientError::protocol("learn", "x")),
            exit_codes::TRANSPORT
        );
        assert_eq!(
            exit_codes::for_error(&ClientError::remote_computation("s", "learn", "x")),
            exit_codes::REMOTE
        );
        assert_eq!(
            exit_codes::for_error(&ClientError::cancelled("s", "learn")),
            exit_codes::CANCELLED
        );
        assert_eq!(
            exit_codes::for_error(&ClientError::config("bad")),
            exit_codes::USAGE
        );
    }
}
