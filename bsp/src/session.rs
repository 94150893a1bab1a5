//! Session — owns one server process and drives the BSP lifecycle.
//!
//! One session speaks to one build server: it spawns the transport, runs
//! the `build/initialize` handshake, issues requests correlated by id,
//! and dispatches inbound notifications from a single reader loop. All
//! request methods take `&self`, so any number of requests may be in
//! flight concurrently; nothing serializes them and nothing prevents two
//! operations on the same target (advisory tracking only, see
//! [`PendingOperations`]).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, oneshot};

use gantry_config::BspConnectionDetails;
use gantry_types::{
    BspError, BspEvent, BuildTarget, BuildTargetId, DiagnosticsSnapshot, MessageLevel,
    OperationKind, OperationResult, SessionStopReason, StatusCode,
};

use crate::codec::{FrameReader, FrameWriter};
use crate::diagnostics::DiagnosticsStore;
use crate::pending::PendingOperations;
use crate::protocol::{self, InitializeResult, Notification, Request};
use crate::resolver::ResolverRegistry;
use crate::transport::ServerProcess;

const INIT_TIMEOUT_SECS: u64 = 30;

const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

const WRITER_CHANNEL_CAPACITY: usize = 64;

/// Protocol state of a session.
///
/// `Closed` is absorbing; `Failed` is terminal for the current attempt
/// but a fresh `connect()` may leave it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Handshaking,
    Ready,
    ShuttingDown,
    Closed,
    Failed,
}

enum WriterCommand {
    Send(serde_json::Value),
    Shutdown,
}

enum IncomingFrame {
    Response {
        id: u64,
        body: serde_json::Value,
    },
    ServerRequest {
        id: serde_json::Value,
        method: String,
    },
    Notification {
        method: String,
        params: Option<serde_json::Value>,
    },
}

fn parse_incoming(frame: &serde_json::Value) -> Option<IncomingFrame> {
    let id = frame.get("id");
    let method = frame
        .get("method")
        .and_then(|m| m.as_str())
        .map(String::from);
    let has_result_or_error = frame.get("result").is_some() || frame.get("error").is_some();

    match (id, method, has_result_or_error) {
        (Some(id_val), None, true) => Some(IncomingFrame::Response {
            id: id_val.as_u64()?,
            body: frame.clone(),
        }),
        (Some(id_val), Some(method), _) => Some(IncomingFrame::ServerRequest {
            id: id_val.clone(),
            method,
        }),
        (None, Some(method), _) => Some(IncomingFrame::Notification {
            method,
            params: frame.get("params").cloned(),
        }),
        _ => None,
    }
}

/// Extract `result` from a response body, mapping a JSON-RPC `error`
/// member to [`BspError::Protocol`].
fn expect_result(mut body: serde_json::Value, method: &str) -> Result<serde_json::Value, BspError> {
    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        return Err(BspError::Protocol(format!("{method} failed: {message}")));
    }
    Ok(body
        .get_mut("result")
        .map(serde_json::Value::take)
        .unwrap_or(serde_json::Value::Null))
}

/// Translate a compile/test/run response body into a status code.
fn translate_status(body: serde_json::Value, method: &str) -> Result<StatusCode, BspError> {
    let result = expect_result(body, method)?;
    let status: protocol::StatusResult = serde_json::from_value(result)
        .map_err(|e| BspError::Protocol(format!("{method}: malformed result: {e}")))?;
    StatusCode::from_code(status.status_code).ok_or_else(|| {
        BspError::Protocol(format!(
            "{method}: unknown status code {}",
            status.status_code
        ))
    })
}

type PendingMap = Arc<tokio::sync::Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>>;

/// One BSP session over one server process.
pub struct Session {
    details: BspConnectionDetails,
    working_dir: PathBuf,
    root_uri: String,
    state: Arc<StdMutex<SessionState>>,
    event_tx: mpsc::Sender<BspEvent>,
    resolvers: Arc<StdMutex<ResolverRegistry>>,
    diagnostics: Arc<StdMutex<DiagnosticsStore>>,
    pending: PendingMap,
    pending_ops: PendingOperations,
    next_id: AtomicU64,
    writer_tx: Option<mpsc::Sender<WriterCommand>>,
    process: Option<ServerProcess>,
    server_info: Option<InitializeResult>,
}

impl Session {
    /// Create an idle session. Nothing is spawned until [`Session::connect`].
    #[must_use]
    pub fn new(
        details: BspConnectionDetails,
        working_dir: PathBuf,
        event_tx: mpsc::Sender<BspEvent>,
        resolvers: Arc<StdMutex<ResolverRegistry>>,
    ) -> Self {
        let root_uri = root_uri_for(&working_dir);
        Self {
            details,
            working_dir,
            root_uri,
            state: Arc::new(StdMutex::new(SessionState::Idle)),
            event_tx,
            resolvers,
            diagnostics: Arc::new(StdMutex::new(DiagnosticsStore::new())),
            pending: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            pending_ops: PendingOperations::new(),
            next_id: AtomicU64::new(1),
            writer_tx: None,
            process: None,
            server_info: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.details.name
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock().expect("state lock poisoned")
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Identity the server reported in its initialize response.
    #[must_use]
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server_info.as_ref()
    }

    /// Advisory view of in-flight operations.
    #[must_use]
    pub fn pending_operations(&self) -> &PendingOperations {
        &self.pending_ops
    }

    /// Current diagnostics for this connection.
    #[must_use]
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics
            .lock()
            .expect("diagnostics lock poisoned")
            .snapshot()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().expect("state lock poisoned") = state;
    }

    fn ensure_ready(&self) -> Result<(), BspError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(BspError::NotConnected)
        }
    }

    /// Spawn the server and run the initialize/initialized handshake.
    ///
    /// Idempotent on a `Ready` session: returns immediately without a
    /// second handshake. After `Closed` or `Failed`, a call starts a
    /// fresh attempt (reconnection is always explicit, never automatic).
    pub async fn connect(&mut self) -> Result<(), BspError> {
        if self.is_ready() {
            return Ok(());
        }

        self.set_state(SessionState::Starting);
        let (process, stdin, stdout) = ServerProcess::start(
            &self.details,
            &self.working_dir,
            self.event_tx.clone(),
        )
        .inspect_err(|_| self.set_state(SessionState::Failed))?;
        self.process = Some(process);

        let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut writer = FrameWriter::new(stdin);
            while let Some(cmd) = writer_rx.recv().await {
                match cmd {
                    WriterCommand::Send(frame) => {
                        if let Err(e) = writer.write_frame(&frame).await {
                            tracing::warn!("BSP write error: {e}");
                            break;
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
        });
        self.writer_tx = Some(writer_tx.clone());

        // A fresh pending map per attempt: entries of a previous failed
        // attempt must not receive this attempt's responses.
        self.pending = Arc::new(tokio::sync::Mutex::new(HashMap::new()));
        self.next_id.store(1, Ordering::Relaxed);

        let reader_pending = self.pending.clone();
        let reader_state = self.state.clone();
        let reader_diagnostics = self.diagnostics.clone();
        let reader_event_tx = self.event_tx.clone();
        let reader_name = self.details.name.clone();
        tokio::spawn(async move {
            let mut reader = FrameReader::new(stdout);
            let reason = loop {
                match reader.read_frame().await {
                    Ok(Some(frame)) => {
                        Self::dispatch_frame(
                            &frame,
                            &reader_pending,
                            &writer_tx,
                            &reader_event_tx,
                            &reader_diagnostics,
                            &reader_state,
                            &reader_name,
                        )
                        .await;
                    }
                    Ok(None) => {
                        tracing::info!("Build server '{reader_name}' closed stdout");
                        break SessionStopReason::Exited;
                    }
                    Err(e) => {
                        tracing::warn!("BSP reader error for '{reader_name}': {e}");
                        break SessionStopReason::Failed(e.to_string());
                    }
                }
            };
            Self::close_session(
                &reader_pending,
                &reader_state,
                &reader_diagnostics,
                &reader_event_tx,
                reason,
            )
            .await;
        });

        self.set_state(SessionState::Handshaking);
        let params = protocol::initialize_params(&self.root_uri, &self.details.languages);
        let handshake = tokio::time::timeout(
            std::time::Duration::from_secs(INIT_TIMEOUT_SECS),
            self.raw_request("build/initialize", Some(params)),
        )
        .await;

        let body = match handshake {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => return Err(self.fail_handshake(e.to_string()).await),
            Err(_) => return Err(self.fail_handshake("initialize timed out".to_string()).await),
        };
        let result = match expect_result(body, "build/initialize") {
            Ok(result) => result,
            Err(e) => return Err(self.fail_handshake(e.to_string()).await),
        };

        self.server_info = serde_json::from_value(result).ok();
        if let Some(info) = &self.server_info {
            tracing::info!(
                "Connected to '{}' ({} {}, BSP {})",
                self.details.name,
                info.display_name,
                info.version,
                info.bsp_version
            );
        }

        self.send_notification("build/initialized", Some(serde_json::json!({})))
            .await
            .map_err(|e| BspError::Handshake(e.to_string()))?;
        self.set_state(SessionState::Ready);
        Ok(())
    }

    async fn fail_handshake(&mut self, message: String) -> BspError {
        self.set_state(SessionState::Failed);
        self.teardown().await;
        BspError::Handshake(message)
    }

    /// Graceful teardown: `build/shutdown` under a bounded wait, then the
    /// `build/exit` notification, then transport termination.
    pub async fn disconnect(&mut self) {
        if self.is_ready() {
            self.set_state(SessionState::ShuttingDown);
            let shutdown = tokio::time::timeout(
                std::time::Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
                self.raw_request("build/shutdown", None),
            )
            .await;
            if let Ok(Err(e)) = shutdown {
                tracing::debug!("build/shutdown failed for '{}': {e}", self.details.name);
            }
            let _ = self.send_notification("build/exit", None).await;
        }
        self.teardown().await;
        self.set_state(SessionState::Closed);
        self.diagnostics
            .lock()
            .expect("diagnostics lock poisoned")
            .clear();
    }

    async fn teardown(&mut self) {
        if let Some(writer_tx) = self.writer_tx.take() {
            let _ = writer_tx.send(WriterCommand::Shutdown).await;
        }
        if let Some(process) = self.process.take() {
            process.stop().await;
        }
        self.server_info = None;
    }

    /// `workspace/buildTargets`: the server's current target list.
    ///
    /// Targets declaring a dependency on themselves are dropped (model
    /// invariant); each surviving target is offered to the argument
    /// resolvers so selector metadata is cached before the first
    /// compile/test/run.
    pub async fn build_targets(&self) -> Result<Vec<BuildTarget>, BspError> {
        self.ensure_ready()?;
        let body = self.raw_request("workspace/buildTargets", None).await?;
        let result = expect_result(body, "workspace/buildTargets")?;
        let parsed: protocol::BuildTargetsResult = serde_json::from_value(result)
            .map_err(|e| BspError::Protocol(format!("malformed buildTargets result: {e}")))?;

        let targets = drop_self_dependent(parsed.targets);

        {
            let mut resolvers = self.resolvers.lock().expect("resolver lock poisoned");
            for target in &targets {
                resolvers.ingest_target(target);
            }
        }
        Ok(targets)
    }

    /// `workspace/reload`: ask the server to re-evaluate the workspace.
    pub async fn reload(&self) -> Result<(), BspError> {
        self.ensure_ready()?;
        let body = self.raw_request("workspace/reload", None).await?;
        expect_result(body, "workspace/reload").map(|_| ())
    }

    /// `buildTarget/compile` for one or more targets.
    pub async fn compile(&self, targets: &[BuildTargetId]) -> Result<OperationResult, BspError> {
        self.target_operation(OperationKind::Compile, "buildTarget/compile", targets)
            .await
    }

    /// `buildTarget/test` for one or more targets.
    pub async fn test_targets(
        &self,
        targets: &[BuildTargetId],
    ) -> Result<OperationResult, BspError> {
        self.target_operation(OperationKind::Test, "buildTarget/test", targets)
            .await
    }

    /// `buildTarget/run` for exactly one target.
    pub async fn run(&self, target: &BuildTargetId) -> Result<OperationResult, BspError> {
        self.target_operation(
            OperationKind::Run,
            "buildTarget/run",
            std::slice::from_ref(target),
        )
        .await
    }

    /// `debugSession/start`: returns the debug transport address URI.
    ///
    /// The session's own state is unaffected by whatever happens to that
    /// address afterwards; see the debug bridge.
    pub async fn debug_session_start(
        &self,
        targets: &[BuildTargetId],
    ) -> Result<String, BspError> {
        self.ensure_ready()?;
        let body = self
            .raw_request("debugSession/start", Some(protocol::debug_params(targets)))
            .await?;
        let result = expect_result(body, "debugSession/start")?;
        let address: protocol::DebugAddressResult = serde_json::from_value(result)
            .map_err(|e| BspError::Protocol(format!("malformed debug address: {e}")))?;
        Ok(address.uri)
    }

    async fn target_operation(
        &self,
        kind: OperationKind,
        method: &'static str,
        targets: &[BuildTargetId],
    ) -> Result<OperationResult, BspError> {
        self.ensure_ready()?;
        let origin_id = uuid::Uuid::new_v4().to_string();
        let arguments = self.merged_arguments(kind, targets);
        let params = match kind {
            OperationKind::Compile => protocol::compile_params(targets, &origin_id, &arguments),
            OperationKind::Test => protocol::test_params(targets, &origin_id, &arguments),
            OperationKind::Run => protocol::run_params(&targets[0], &origin_id, &arguments),
        };

        // Guards release the entries on drop, so a caller cancelling by
        // dropping this future cleans up the same as completion.
        let guards: Vec<_> = targets
            .iter()
            .map(|t| self.pending_ops.begin(kind, t.clone()))
            .collect();

        let outcome = self.raw_request(method, Some(params)).await;
        drop(guards);

        let outcome = outcome.and_then(|body| translate_status(body, method));
        // Local observation of completion, success or not.
        let (level, message) = match &outcome {
            Ok(status) => (
                if status.is_ok() {
                    MessageLevel::Info
                } else {
                    MessageLevel::Error
                },
                format!("{} finished: {}", kind.label(), status.label()),
            ),
            Err(e) => (MessageLevel::Error, format!("{} failed: {e}", kind.label())),
        };
        let _ = self
            .event_tx
            .send(BspEvent::LogMessage {
                level,
                message,
                origin_id: Some(origin_id.clone()),
            })
            .await;

        outcome.map(|status| OperationResult::new(origin_id, status))
    }

    /// Extra CLI arguments from the resolver layer, concatenated across
    /// the requested targets.
    fn merged_arguments(&self, kind: OperationKind, targets: &[BuildTargetId]) -> Vec<String> {
        let resolvers = self.resolvers.lock().expect("resolver lock poisoned");
        let mut arguments = Vec::new();
        for target in targets {
            arguments.extend(resolvers.arguments_for(kind, target));
        }
        arguments
    }

    async fn raw_request(
        &self,
        method: &'static str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, BspError> {
        let writer_tx = self
            .writer_tx
            .as_ref()
            .ok_or(BspError::NotConnected)?
            .clone();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = Request::new(id, method, params);
        let frame = serde_json::to_value(&request)
            .map_err(|e| BspError::Protocol(format!("serializing {method}: {e}")))?;
        if writer_tx.send(WriterCommand::Send(frame)).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(BspError::ConnectionClosed);
        }

        // The sender is dropped when the reader loop ends; a closed
        // transport therefore fails this await instead of hanging.
        rx.await.map_err(|_| BspError::ConnectionClosed)
    }

    async fn send_notification(
        &self,
        method: &'static str,
        params: Option<serde_json::Value>,
    ) -> Result<(), BspError> {
        let writer_tx = self
            .writer_tx
            .as_ref()
            .ok_or(BspError::NotConnected)?;
        let notification = Notification::new(method, params);
        let frame = serde_json::to_value(&notification)
            .map_err(|e| BspError::Protocol(format!("serializing {method}: {e}")))?;
        writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .map_err(|_| BspError::ConnectionClosed)
    }

    async fn dispatch_frame(
        frame: &serde_json::Value,
        pending: &tokio::sync::Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>,
        writer_tx: &mpsc::Sender<WriterCommand>,
        event_tx: &mpsc::Sender<BspEvent>,
        diagnostics: &StdMutex<DiagnosticsStore>,
        state: &StdMutex<SessionState>,
        server_name: &str,
    ) {
        let Some(incoming) = parse_incoming(frame) else {
            tracing::trace!("Ignoring malformed JSON-RPC frame from '{server_name}'");
            return;
        };

        match incoming {
            IncomingFrame::Response { id, body } => {
                let sender = pending.lock().await.remove(&id);
                if let Some(tx) = sender {
                    let _ = tx.send(body);
                }
            }
            IncomingFrame::ServerRequest { id, method } => {
                // BSP servers may probe with reverse requests; answer or
                // the server can block on the response.
                tracing::debug!(
                    "BSP '{server_name}' sent request: {method} — replying method not found"
                );
                let response = serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {
                        "code": -32601,
                        "message": format!("Method not found: {method}")
                    }
                });
                let _ = writer_tx.send(WriterCommand::Send(response)).await;
            }
            IncomingFrame::Notification { method, params } => {
                let ready = *state.lock().expect("state lock poisoned") == SessionState::Ready;
                if !ready {
                    // Handshake invariant: nothing is dispatched before Ready.
                    tracing::trace!(
                        "Ignoring notification '{method}' from '{server_name}' before Ready"
                    );
                    return;
                }
                Self::handle_notification(server_name, &method, params, event_tx, diagnostics)
                    .await;
            }
        }
    }

    async fn handle_notification(
        server_name: &str,
        method: &str,
        params: Option<serde_json::Value>,
        event_tx: &mpsc::Sender<BspEvent>,
        diagnostics: &StdMutex<DiagnosticsStore>,
    ) {
        let params = params.unwrap_or(serde_json::Value::Null);
        match method {
            "build/publishDiagnostics" => {
                match serde_json::from_value::<protocol::PublishDiagnosticsParams>(params) {
                    Ok(diag_params) => {
                        let items: Vec<_> = diag_params
                            .diagnostics
                            .iter()
                            .map(protocol::WireDiagnostic::to_build_diagnostic)
                            .collect();
                        diagnostics
                            .lock()
                            .expect("diagnostics lock poisoned")
                            .update(
                                diag_params.text_document.uri.clone(),
                                items.clone(),
                                diag_params.reset,
                            );
                        let _ = event_tx
                            .send(BspEvent::Diagnostics {
                                document: diag_params.text_document.uri,
                                target: diag_params.build_target,
                                items,
                                reset: diag_params.reset,
                            })
                            .await;
                    }
                    Err(e) => {
                        tracing::debug!(
                            "Failed to parse publishDiagnostics from '{server_name}': {e}"
                        );
                    }
                }
            }
            "build/taskStart" => {
                let params: protocol::TaskStartParams =
                    serde_json::from_value(params).unwrap_or_default();
                let _ = event_tx
                    .send(BspEvent::TaskStarted {
                        task_id: params.task_id.id,
                        origin_id: params.origin_id,
                        message: params.message.unwrap_or_default(),
                    })
                    .await;
            }
            "build/taskProgress" => {
                let Ok(params) = serde_json::from_value::<protocol::TaskProgressParams>(params)
                else {
                    return;
                };
                let _ = event_tx
                    .send(BspEvent::TaskProgress {
                        task_id: params.task_id.id,
                        message: params.message.unwrap_or_default(),
                        progress: params.progress,
                        total: params.total,
                    })
                    .await;
            }
            "build/taskFinish" => {
                let Ok(params) = serde_json::from_value::<protocol::TaskFinishParams>(params)
                else {
                    return;
                };
                let status = params
                    .status
                    .and_then(StatusCode::from_code)
                    .unwrap_or(StatusCode::Ok);
                let _ = event_tx
                    .send(BspEvent::TaskFinished {
                        task_id: params.task_id.id,
                        status,
                        message: params.message.unwrap_or_default(),
                    })
                    .await;
            }
            "build/logMessage" => {
                let Ok(params) = serde_json::from_value::<protocol::MessageParams>(params) else {
                    return;
                };
                let _ = event_tx
                    .send(BspEvent::LogMessage {
                        level: MessageLevel::from_code(params.level.unwrap_or(3)),
                        message: params.message,
                        origin_id: params.origin_id,
                    })
                    .await;
            }
            "build/showMessage" => {
                let Ok(params) = serde_json::from_value::<protocol::MessageParams>(params) else {
                    return;
                };
                let _ = event_tx
                    .send(BspEvent::ShowMessage {
                        level: MessageLevel::from_code(params.level.unwrap_or(3)),
                        message: params.message,
                    })
                    .await;
            }
            _ => {
                tracing::trace!("Ignoring notification from '{server_name}': {method}");
            }
        }
    }

    /// Terminal cleanup when the transport closes, orderly or not.
    ///
    /// Drops every pending sender (failing the matching requests with
    /// `ConnectionClosed`), clears diagnostics, and emits the closed event.
    async fn close_session(
        pending: &PendingMap,
        state: &StdMutex<SessionState>,
        diagnostics: &StdMutex<DiagnosticsStore>,
        event_tx: &mpsc::Sender<BspEvent>,
        reason: SessionStopReason,
    ) {
        {
            let mut current = state.lock().expect("state lock poisoned");
            if *current != SessionState::Failed {
                *current = SessionState::Closed;
            }
        }
        pending.lock().await.clear();
        diagnostics
            .lock()
            .expect("diagnostics lock poisoned")
            .clear();
        let _ = event_tx.send(BspEvent::SessionClosed { reason }).await;
    }
}

/// Drop targets that declare a dependency on themselves. Cross-target
/// cycles are tolerated; a self-edge violates the model.
fn drop_self_dependent(mut targets: Vec<BuildTarget>) -> Vec<BuildTarget> {
    targets.retain(|target| {
        if target.depends_on_self() {
            tracing::warn!(
                "Dropping target '{}': it declares a dependency on itself",
                target.id
            );
            false
        } else {
            true
        }
    });
    targets
}

fn root_uri_for(working_dir: &std::path::Path) -> String {
    let absolute = std::fs::canonicalize(working_dir).unwrap_or_else(|_| working_dir.to_path_buf());
    url::Url::from_directory_path(&absolute)
        .map(String::from)
        .unwrap_or_else(|()| format!("file://{}", absolute.display()))
}
