//! Core domain types for gantry — no IO, no async.
//!
//! These types define the interface between the protocol core
//! (`gantry-bsp`), the configuration layer (`gantry-config`), and whatever
//! editor front-end consumes them. The front-end receives [`BspEvent`]s and
//! [`RegistryEvent`]s, reads [`DiagnosticsSnapshot`]s, and matches on
//! [`BspError`] for failure display.

pub mod diagnostics;
pub mod error;
pub mod events;
pub mod target;

pub use diagnostics::{BuildDiagnostic, DiagnosticRange, DiagnosticSeverity, DiagnosticsSnapshot};
pub use error::BspError;
pub use events::{BspEvent, ConnectionStatus, MessageLevel, RegistryEvent, SessionStopReason};
pub use target::{
    BuildTarget, BuildTargetCapabilities, BuildTargetId, OperationKind, OperationResult,
    StatusCode,
};
