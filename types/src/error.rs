//! Error taxonomy for the BSP client core.

/// Every failure mode the protocol core can surface to callers.
///
/// All user-facing operations return these as values; nothing in the core
/// panics on server misbehavior.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BspError {
    /// The server process could not be spawned.
    #[error("failed to start build server: {0}")]
    Startup(String),

    /// `build/initialize` failed, timed out, or the transport closed
    /// before a response arrived.
    #[error("BSP handshake failed: {0}")]
    Handshake(String),

    /// A request was issued outside the `Ready` state.
    #[error("not connected to a build server")]
    NotConnected,

    /// Malformed frame or JSON-RPC error response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The transport closed while requests were outstanding.
    #[error("connection to build server closed")]
    ConnectionClosed,

    /// Bad debug address format or a failed debug-adapter attach.
    #[error("failed to start debug session: {0}")]
    DebugStart(String),

    /// No valid server descriptor could be discovered.
    #[error("build server discovery failed: {0}")]
    ConfigDiscovery(String),
}

impl BspError {
    /// Stable short tag for status displays and structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Startup(_) => "startup",
            Self::Handshake(_) => "handshake",
            Self::NotConnected => "not-connected",
            Self::Protocol(_) => "protocol",
            Self::ConnectionClosed => "connection-closed",
            Self::DebugStart(_) => "debug-start",
            Self::ConfigDiscovery(_) => "config-discovery",
        }
    }
}
