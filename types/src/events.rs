//! Events flowing from the protocol core toward its owner.
//!
//! A session emits [`BspEvent`]s on its event channel; the connection
//! registry emits [`RegistryEvent`]s on its own. Neither channel makes
//! ordering promises relative to outstanding requests — notifications
//! arrive whenever the server sends them.

use crate::diagnostics::BuildDiagnostic;
use crate::target::{BuildTargetId, StatusCode};

/// Severity of a log/show message, mapped from the wire
/// (1=error, 2=warning, 3 and 4=info).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Error,
    Warning,
    Info,
}

impl MessageLevel {
    /// Out-of-range values fall back to `Info` — a bad level must not
    /// drop the message text.
    #[must_use]
    pub fn from_code(value: u64) -> Self {
        match value {
            1 => Self::Error,
            2 => Self::Warning,
            _ => Self::Info,
        }
    }
}

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStopReason {
    /// The server process exited (orderly or not).
    Exited,
    /// The reader loop hit an unrecoverable error.
    Failed(String),
}

/// An event emitted by one session.
#[derive(Debug)]
pub enum BspEvent {
    /// `build/publishDiagnostics`: diagnostics for one document.
    Diagnostics {
        document: String,
        target: Option<BuildTargetId>,
        items: Vec<BuildDiagnostic>,
        /// When true the server replaced the document's set; otherwise
        /// these items were appended.
        reset: bool,
    },
    /// `build/taskStart`.
    TaskStarted {
        task_id: String,
        origin_id: Option<String>,
        message: String,
    },
    /// `build/taskProgress`.
    TaskProgress {
        task_id: String,
        message: String,
        progress: Option<u64>,
        total: Option<u64>,
    },
    /// `build/taskFinish`.
    TaskFinished {
        task_id: String,
        status: StatusCode,
        message: String,
    },
    /// `build/logMessage`.
    LogMessage {
        level: MessageLevel,
        message: String,
        origin_id: Option<String>,
    },
    /// `build/showMessage` — user-facing text.
    ShowMessage { level: MessageLevel, message: String },
    /// A line the server process wrote to stderr. Never protocol data.
    ServerStderr { line: String },
    /// The transport closed; the session is terminally `Closed`.
    SessionClosed { reason: SessionStopReason },
}

/// Status of a registered connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

impl ConnectionStatus {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error(_) => "error",
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// An event emitted by the connection registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A connection's status changed.
    StatusChanged {
        connection_id: String,
        status: ConnectionStatus,
    },
    /// One connection's cached target list was refreshed. Observers can
    /// read the cache instead of re-polling every connection.
    TargetsUpdated { connection_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_level_mapping() {
        assert_eq!(MessageLevel::from_code(1), MessageLevel::Error);
        assert_eq!(MessageLevel::from_code(2), MessageLevel::Warning);
        assert_eq!(MessageLevel::from_code(3), MessageLevel::Info);
        assert_eq!(MessageLevel::from_code(4), MessageLevel::Info);
        // Out-of-range falls back to Info rather than dropping the message
        assert_eq!(MessageLevel::from_code(0), MessageLevel::Info);
        assert_eq!(MessageLevel::from_code(42), MessageLevel::Info);
    }

    #[test]
    fn test_connection_status_labels() {
        assert_eq!(ConnectionStatus::Disconnected.label(), "disconnected");
        assert_eq!(ConnectionStatus::Connecting.label(), "connecting");
        assert_eq!(ConnectionStatus::Connected.label(), "connected");
        assert_eq!(ConnectionStatus::Error("boom".into()).label(), "error");
        assert!(ConnectionStatus::Connected.is_connected());
        assert!(!ConnectionStatus::Connecting.is_connected());
    }
}
