//! Debug session bridge.
//!
//! `debugSession/start` returns a URI naming the transport where a Debug
//! Adapter Protocol server is listening: `tcp://<host>:<port>` or
//! `unix://<path>`. This module turns that URI into a concrete attach
//! descriptor and hands it to the editor's debug launcher. Failures here
//! never touch the BSP session itself.

use std::path::PathBuf;

use gantry_types::{BspError, BuildTargetId};

use crate::session::Session;

/// Where the debug adapter can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugAttachDescriptor {
    /// Attach over TCP.
    Tcp { host: String, port: u16 },
    /// Attach over a local named pipe / Unix domain socket.
    Pipe { path: PathBuf },
}

/// The editor-side launcher that turns an attach descriptor into a live
/// debug session. Implemented outside the core.
pub trait DebugLauncher: Send + Sync {
    fn attach(&self, descriptor: &DebugAttachDescriptor) -> anyhow::Result<()>;
}

/// Parse a debug address URI into an attach descriptor.
pub fn parse_debug_address(uri: &str) -> Result<DebugAttachDescriptor, BspError> {
    let parsed = url::Url::parse(uri)
        .map_err(|e| BspError::DebugStart(format!("bad debug address '{uri}': {e}")))?;

    match parsed.scheme() {
        "tcp" => {
            let host = parsed
                .host_str()
                .ok_or_else(|| BspError::DebugStart(format!("missing host in '{uri}'")))?
                .to_string();
            let port = parsed
                .port()
                .ok_or_else(|| BspError::DebugStart(format!("missing port in '{uri}'")))?;
            Ok(DebugAttachDescriptor::Tcp { host, port })
        }
        "unix" => {
            // "unix://tmp/sock" parses with host "tmp"; stitch authority
            // and path back together so both spellings work.
            let path = format!("{}{}", parsed.host_str().unwrap_or(""), parsed.path());
            if path.is_empty() {
                return Err(BspError::DebugStart(format!("missing path in '{uri}'")));
            }
            Ok(DebugAttachDescriptor::Pipe {
                path: PathBuf::from(path),
            })
        }
        other => Err(BspError::DebugStart(format!(
            "unsupported debug transport scheme '{other}' in '{uri}'"
        ))),
    }
}

/// Parse an address and hand it to the launcher.
pub fn attach_to_address(
    uri: &str,
    launcher: &dyn DebugLauncher,
) -> Result<DebugAttachDescriptor, BspError> {
    let descriptor = parse_debug_address(uri)?;
    launcher
        .attach(&descriptor)
        .map_err(|e| BspError::DebugStart(format!("attach failed: {e:#}")))?;
    Ok(descriptor)
}

/// Ask the server to start a debug session for `targets`, then attach.
///
/// A bad address or a failed attach surfaces as [`BspError::DebugStart`];
/// the session stays `Ready` either way.
pub async fn start_debug_session(
    session: &Session,
    targets: &[BuildTargetId],
    launcher: &dyn DebugLauncher,
) -> Result<DebugAttachDescriptor, BspError> {
    let uri = session.debug_session_start(targets).await?;
    attach_to_address(&uri, launcher)
}
