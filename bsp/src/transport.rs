//! Process transport — spawns a build-server subprocess and exposes its
//! stdio.
//!
//! Standard input/output become the duplex protocol stream; standard
//! error is captured line-by-line and forwarded as [`BspEvent::ServerStderr`]
//! (never parsed as protocol). Process exit is observed by the session's
//! reader loop as EOF on stdout.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;

use gantry_config::BspConnectionDetails;
use gantry_types::{BspError, BspEvent};

const STOP_TIMEOUT_SECS: u64 = 2;

/// A running build-server process.
///
/// Holding a `ServerProcess` is proof the spawn succeeded; the protocol
/// stream halves are handed to the caller at start.
#[derive(Debug)]
pub(crate) struct ServerProcess {
    command: String,
    child: Child,
    #[allow(dead_code)]
    stderr_handle: tokio::task::JoinHandle<()>,
}

impl ServerProcess {
    /// Spawn the server described by `details` with `working_dir` as its
    /// working directory.
    ///
    /// Returns the process handle plus the stdin/stdout halves of the
    /// duplex stream. Stderr forwarding starts immediately on a
    /// background task. Failure to locate or spawn the executable is a
    /// [`BspError::Startup`].
    pub fn start(
        details: &BspConnectionDetails,
        working_dir: &Path,
        event_tx: mpsc::Sender<BspEvent>,
    ) -> Result<(Self, ChildStdin, ChildStdout), BspError> {
        let command = details.command().to_string();
        let resolved_cmd = which::which(&command)
            .map_err(|_| BspError::Startup(format!("{command} not found in PATH")))?;

        let mut cmd = Command::new(&resolved_cmd);
        cmd.args(details.args())
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| BspError::Startup(format!("spawning {command}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BspError::Startup("no stdin from child".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BspError::Startup("no stdout from child".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BspError::Startup("no stderr from child".to_string()))?;

        let stderr_command = command.clone();
        let stderr_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(server = %stderr_command, "stderr: {line}");
                if event_tx.send(BspEvent::ServerStderr { line }).await.is_err() {
                    break;
                }
            }
        });

        Ok((
            Self {
                command,
                child,
                stderr_handle,
            },
            stdin,
            stdout,
        ))
    }

    /// Wait briefly for the process to exit on its own, then kill it.
    pub async fn stop(mut self) {
        let wait_result = tokio::time::timeout(
            std::time::Duration::from_secs(STOP_TIMEOUT_SECS),
            self.child.wait(),
        )
        .await;

        if wait_result.is_err() {
            tracing::debug!("Build server '{}' didn't exit in time, killing", self.command);
            let _ = self.child.kill().await;
        }
    }
}
