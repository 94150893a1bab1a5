//! Diagnostics model: per-document build diagnostics and snapshots.

use serde::{Deserialize, Serialize};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl DiagnosticSeverity {
    /// Convert from the wire numeric severity (1=Error, 2=Warning, 3=Info, 4=Hint).
    ///
    /// Returns `None` for values outside the defined range. Callers
    /// (boundary code) decide the fallback policy.
    #[must_use]
    pub fn from_code(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Information),
            4 => Some(Self::Hint),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
            Self::Hint => "hint",
        }
    }
}

/// Zero-indexed source span.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiagnosticRange {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl DiagnosticRange {
    #[must_use]
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }
}

/// A single diagnostic published by a build server.
///
/// Fields are private; construction goes through [`BuildDiagnostic::new`]
/// and consumers read via accessors.
#[derive(Debug, Clone)]
pub struct BuildDiagnostic {
    range: DiagnosticRange,
    severity: DiagnosticSeverity,
    message: String,
    /// Diagnostic code, when the server assigns one (e.g. "E0308").
    code: Option<String>,
    /// Origin of the diagnostic, resolved to a concrete string at the
    /// boundary (e.g. "sbt", "cargo", or "build server" when absent).
    source: String,
}

impl BuildDiagnostic {
    #[must_use]
    pub fn new(
        range: DiagnosticRange,
        severity: DiagnosticSeverity,
        message: String,
        code: Option<String>,
        source: String,
    ) -> Self {
        Self {
            range,
            severity,
            message,
            code,
            source,
        }
    }

    #[must_use]
    pub fn range(&self) -> DiagnosticRange {
        self.range
    }

    #[must_use]
    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Format as `document:line:col: severity: message` (1-indexed for display).
    #[must_use]
    pub fn display_with_document(&self, document: &str) -> String {
        format!(
            "{}:{}:{}: {}: [{}] {}",
            document,
            self.range.start_line + 1,
            self.range.start_col + 1,
            self.severity.label(),
            self.source,
            self.message,
        )
    }
}

/// Immutable snapshot of all diagnostics for one connection, suitable for
/// UI rendering.
///
/// Counts are computed from the canonical per-document lists rather than
/// cached, so they can never drift out of sync.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsSnapshot {
    /// Per-document diagnostics, sorted with error-containing documents first.
    documents: Vec<(String, Vec<BuildDiagnostic>)>,
}

impl DiagnosticsSnapshot {
    /// Construct a snapshot from sorted per-document diagnostics.
    #[must_use]
    pub fn new(documents: Vec<(String, Vec<BuildDiagnostic>)>) -> Self {
        Self { documents }
    }

    /// Per-document diagnostics, sorted with error-containing documents first.
    #[must_use]
    pub fn documents(&self) -> &[(String, Vec<BuildDiagnostic>)] {
        &self.documents
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn count_by_severity(&self, severity: DiagnosticSeverity) -> usize {
        self.documents
            .iter()
            .flat_map(|(_, items)| items)
            .filter(|d| d.severity() == severity)
            .count()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.count_by_severity(DiagnosticSeverity::Error)
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.count_by_severity(DiagnosticSeverity::Warning)
    }

    #[must_use]
    pub fn total_count(&self) -> usize {
        self.documents.iter().map(|(_, items)| items.len()).sum()
    }

    /// Format a compact status string like "E:3 W:5".
    #[must_use]
    pub fn status_string(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        format!("E:{} W:{}", self.error_count(), self.warning_count())
    }
}
