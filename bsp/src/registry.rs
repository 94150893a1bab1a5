//! Connection registry — owns every named session and its status.
//!
//! One [`Connection`] per discovered (or explicitly added) server
//! descriptor. Connections are fully independent: a failure or close of
//! one never touches its siblings, and `connect_all`/`disconnect_all`
//! settle every attempt and report a summary instead of raising.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::mpsc;

use gantry_config::{BspConnectionDetails, discover_configs};
use gantry_types::{BspError, BspEvent, BuildTarget, ConnectionStatus, RegistryEvent};

use crate::resolver::ResolverRegistry;
use crate::session::Session;

/// Capacity of each per-connection event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One registered build server: its descriptor, its session, and the
/// registry-level bookkeeping around both.
pub struct Connection {
    id: String,
    details: BspConnectionDetails,
    status: ConnectionStatus,
    session: Session,
    last_connected: Option<chrono::DateTime<chrono::Utc>>,
    last_error: Option<String>,
    /// Target list from the most recent refresh; empty until then.
    targets: Vec<BuildTarget>,
}

impl Connection {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn details(&self) -> &BspConnectionDetails {
        &self.details
    }

    /// Registry-level status, reconciled against the live session: a
    /// connection recorded as `Connected` whose session has since closed
    /// (server exit, transport failure) reads as `Disconnected`.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        if self.status == ConnectionStatus::Connected && !self.session.is_ready() {
            return ConnectionStatus::Disconnected;
        }
        self.status.clone()
    }

    #[must_use]
    pub fn last_connected(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.last_connected
    }

    /// Message of the most recent connect failure, retained for display.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Cached target list from the last refresh.
    #[must_use]
    pub fn targets(&self) -> &[BuildTarget] {
        &self.targets
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }
}

/// Outcome summary of a `connect_all`/`disconnect_all` sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl SweepSummary {
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Owns zero or more named connections.
pub struct ConnectionRegistry {
    working_dir: PathBuf,
    connections: HashMap<String, Connection>,
    resolvers: Arc<StdMutex<ResolverRegistry>>,
    event_tx: mpsc::Sender<RegistryEvent>,
}

impl ConnectionRegistry {
    /// `event_tx` receives every status transition and targets-updated
    /// notification; the owner decides what to do with them.
    #[must_use]
    pub fn new(
        working_dir: PathBuf,
        resolvers: Arc<StdMutex<ResolverRegistry>>,
        event_tx: mpsc::Sender<RegistryEvent>,
    ) -> Self {
        Self {
            working_dir,
            connections: HashMap::new(),
            resolvers,
            event_tx,
        }
    }

    /// Read the server descriptors under the workspace's `.bsp/` directory.
    pub fn discover(&self) -> Result<Vec<BspConnectionDetails>, BspError> {
        discover_configs(&self.working_dir)
    }

    /// Discover and register every descriptor. Returns the new connection
    /// ids paired with their event receivers.
    pub fn discover_and_add(
        &mut self,
    ) -> Result<Vec<(String, mpsc::Receiver<BspEvent>)>, BspError> {
        let configs = self.discover()?;
        Ok(configs
            .into_iter()
            .map(|details| self.add_connection(details))
            .collect())
    }

    /// Register a connection for `details`. The returned receiver carries
    /// the session's events (diagnostics, tasks, messages, stderr, close).
    pub fn add_connection(
        &mut self,
        details: BspConnectionDetails,
    ) -> (String, mpsc::Receiver<BspEvent>) {
        let id = self.unique_id(&details.name);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let session = Session::new(
            details.clone(),
            self.working_dir.clone(),
            event_tx,
            self.resolvers.clone(),
        );
        self.connections.insert(
            id.clone(),
            Connection {
                id: id.clone(),
                details,
                status: ConnectionStatus::Disconnected,
                session,
                last_connected: None,
                last_error: None,
                targets: Vec::new(),
            },
        );
        (id, event_rx)
    }

    fn unique_id(&self, name: &str) -> String {
        if !self.connections.contains_key(name) {
            return name.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{name}-{n}");
            if !self.connections.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Connect one registered server and refresh its target list.
    ///
    /// On failure the connection lands in `Error` status with the message
    /// retained; nothing retries automatically.
    pub async fn connect(&mut self, id: &str) -> Result<(), BspError> {
        self.set_status(id, ConnectionStatus::Connecting).await?;

        let connection = self
            .connections
            .get_mut(id)
            .ok_or(BspError::NotConnected)?;
        match connection.session.connect().await {
            Ok(()) => {
                connection.last_connected = Some(chrono::Utc::now());
                connection.last_error = None;
                self.set_status(id, ConnectionStatus::Connected).await?;
                // Best-effort initial refresh; a failure here downgrades
                // nothing, the connection is still usable.
                if let Err(e) = self.refresh_targets(id).await {
                    tracing::warn!("Initial target refresh failed for '{id}': {e}");
                }
                Ok(())
            }
            Err(e) => {
                connection.last_error = Some(e.to_string());
                self.set_status(id, ConnectionStatus::Error(e.to_string()))
                    .await?;
                Err(e)
            }
        }
    }

    /// Gracefully disconnect one server. A connection that is not
    /// connected ends up `Disconnected` all the same.
    pub async fn disconnect(&mut self, id: &str) -> Result<(), BspError> {
        let connection = self
            .connections
            .get_mut(id)
            .ok_or(BspError::NotConnected)?;
        connection.session.disconnect().await;
        connection.targets.clear();
        self.set_status(id, ConnectionStatus::Disconnected).await?;
        Ok(())
    }

    /// Disconnect (if needed) and drop a connection entirely.
    pub async fn remove_connection(&mut self, id: &str) -> Result<(), BspError> {
        let mut connection = self
            .connections
            .remove(id)
            .ok_or(BspError::NotConnected)?;
        connection.session.disconnect().await;
        tracing::info!("Removed connection '{id}'");
        Ok(())
    }

    /// Connect every registered server. Every attempt settles; one
    /// failure never aborts the sweep.
    pub async fn connect_all(&mut self) -> SweepSummary {
        let mut summary = SweepSummary::default();
        for id in self.sorted_ids() {
            match self.connect(&id).await {
                Ok(()) => summary.succeeded.push(id),
                Err(e) => summary.failed.push((id, e.to_string())),
            }
        }
        summary
    }

    /// Disconnect every registered server, settling all attempts.
    pub async fn disconnect_all(&mut self) -> SweepSummary {
        let mut summary = SweepSummary::default();
        for id in self.sorted_ids() {
            match self.disconnect(&id).await {
                Ok(()) => summary.succeeded.push(id),
                Err(e) => summary.failed.push((id, e.to_string())),
            }
        }
        summary
    }

    /// Fold sessions that closed on their own back into registry state.
    ///
    /// A connection recorded as `Connected` whose session left `Ready`
    /// moves to `Disconnected`, drops its cached targets, and emits the
    /// status-change event. Owners call this after observing
    /// [`BspEvent::SessionClosed`] on a connection's event channel.
    pub async fn reconcile(&mut self) {
        for id in self.sorted_ids() {
            let stale = self.connections.get(&id).is_some_and(|c| {
                c.status == ConnectionStatus::Connected && !c.session.is_ready()
            });
            if !stale {
                continue;
            }
            if let Some(connection) = self.connections.get_mut(&id) {
                connection.targets.clear();
            }
            tracing::info!("Session for '{id}' closed on its own");
            let _ = self.set_status(&id, ConnectionStatus::Disconnected).await;
        }
    }

    /// Re-fetch one connection's target list, cache it, and emit
    /// `TargetsUpdated`.
    pub async fn refresh_targets(&mut self, id: &str) -> Result<Vec<BuildTarget>, BspError> {
        let connection = self
            .connections
            .get_mut(id)
            .ok_or(BspError::NotConnected)?;
        let targets = connection.session.build_targets().await?;
        connection.targets = targets.clone();
        let _ = self
            .event_tx
            .send(RegistryEvent::TargetsUpdated {
                connection_id: id.to_string(),
            })
            .await;
        Ok(targets)
    }

    /// Fan-out: fresh target lists from every `Ready` session. Sessions
    /// that fail the query are skipped with a warning.
    pub async fn all_build_targets(&mut self) -> Vec<(String, Vec<BuildTarget>)> {
        let mut all = Vec::new();
        for id in self.sorted_ids() {
            let ready = self
                .connections
                .get(&id)
                .is_some_and(|c| c.session.is_ready());
            if !ready {
                continue;
            }
            match self.refresh_targets(&id).await {
                Ok(targets) => all.push((id, targets)),
                Err(e) => tracing::warn!("Target query failed for '{id}': {e}"),
            }
        }
        all
    }

    #[must_use]
    pub fn connection(&self, id: &str) -> Option<&Connection> {
        self.connections.get(id)
    }

    /// All connections, ordered by id.
    #[must_use]
    pub fn connections(&self) -> Vec<&Connection> {
        let mut all: Vec<&Connection> = self.connections.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Ids of connections whose session is `Ready`, ordered.
    #[must_use]
    pub fn connected_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .connections
            .values()
            .filter(|c| c.session.is_ready())
            .map(|c| c.id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn sorted_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn set_status(&mut self, id: &str, status: ConnectionStatus) -> Result<(), BspError> {
        let connection = self
            .connections
            .get_mut(id)
            .ok_or(BspError::NotConnected)?;
        if connection.status == status {
            return Ok(());
        }
        tracing::info!("Connection '{id}': {}", status.label());
        connection.status = status.clone();
        let _ = self
            .event_tx
            .send(RegistryEvent::StatusChanged {
                connection_id: id.to_string(),
                status,
            })
            .await;
        Ok(())
    }
}
