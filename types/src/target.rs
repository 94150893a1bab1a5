//! Build-target model: identifiers, capability flags, operation kinds.

use serde::{Deserialize, Serialize};

/// Opaque URI uniquely naming a target within a server's namespace.
///
/// Stable for the lifetime of a server session; used as a map key
/// everywhere. On the wire this is the BSP `BuildTargetIdentifier`
/// object, `{"uri": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuildTargetId {
    uri: String,
}

impl BuildTargetId {
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl std::fmt::Display for BuildTargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Which operations a server allows against a target.
///
/// These flags gate what the client may invoke; a `compile` against a
/// target with `can_compile == false` is a caller bug, not a wire error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildTargetCapabilities {
    pub can_compile: bool,
    pub can_test: bool,
    pub can_run: bool,
    pub can_debug: bool,
}

/// A named buildable/testable/runnable unit exposed by a build server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTarget {
    pub id: BuildTargetId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Base directory URI, if the server reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_directory: Option<String>,
    /// Free-form classification, e.g. "library" / "application" / "test".
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub capabilities: BuildTargetCapabilities,
    #[serde(default)]
    pub language_ids: Vec<String>,
    /// Ordered dependency identifiers. Cycles across targets are tolerated
    /// (the client displays the graph, it never evaluates it), but a
    /// self-dependency violates the model and is dropped at ingestion.
    #[serde(default)]
    pub dependencies: Vec<BuildTargetId>,
    /// Discriminator for the extension payload in `data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_kind: Option<String>,
    /// Build-system-specific metadata, shaped per `data_kind`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl BuildTarget {
    /// Human-readable name: the display name when present, otherwise the URI.
    #[must_use]
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or_else(|| self.id.uri())
    }

    /// Whether the dependency list contains the target's own identifier.
    #[must_use]
    pub fn depends_on_self(&self) -> bool {
        self.dependencies.iter().any(|dep| dep == &self.id)
    }
}

/// BSP response status for compile/test/run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok = 1,
    Error = 2,
    Cancelled = 3,
}

impl StatusCode {
    /// Convert from the wire numeric code (1=Ok, 2=Error, 3=Cancelled).
    ///
    /// Returns `None` for values outside the BSP-defined range.
    /// Callers (boundary code) decide the fallback policy.
    #[must_use]
    pub fn from_code(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Ok),
            2 => Some(Self::Error),
            3 => Some(Self::Cancelled),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Kind of a long-running target operation, for pending-operation keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Compile,
    Test,
    Run,
}

impl OperationKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Compile => "compile",
            Self::Test => "test",
            Self::Run => "run",
        }
    }
}

/// Outcome of one compile/test/run invocation.
///
/// `origin_id` is the correlation token stamped on the request; task
/// notifications carrying the same token belong to this invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    origin_id: String,
    status: StatusCode,
}

impl OperationResult {
    #[must_use]
    pub fn new(origin_id: String, status: StatusCode) -> Self {
        Self { origin_id, status }
    }

    #[must_use]
    pub fn origin_id(&self) -> &str {
        &self.origin_id
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_target(uri: &str, deps: &[&str]) -> BuildTarget {
        BuildTarget {
            id: BuildTargetId::new(uri),
            display_name: None,
            base_directory: None,
            tags: vec![],
            capabilities: BuildTargetCapabilities::default(),
            language_ids: vec![],
            dependencies: deps.iter().copied().map(BuildTargetId::new).collect(),
            data_kind: None,
            data: None,
        }
    }

    #[test]
    fn test_identifier_serializes_as_uri_object() {
        let id = BuildTargetId::new("bsp://workspace/app");
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json, serde_json::json!({ "uri": "bsp://workspace/app" }));
    }

    #[test]
    fn test_target_deserializes_with_defaults() {
        let target: BuildTarget = serde_json::from_value(serde_json::json!({
            "id": { "uri": "bsp://workspace/lib" }
        }))
        .unwrap();
        assert_eq!(target.id.uri(), "bsp://workspace/lib");
        assert!(target.tags.is_empty());
        assert!(target.dependencies.is_empty());
        assert!(!target.capabilities.can_compile);
        assert!(target.data_kind.is_none());
    }

    #[test]
    fn test_target_label_falls_back_to_uri() {
        let mut target = make_target("bsp://workspace/app", &[]);
        assert_eq!(target.label(), "bsp://workspace/app");
        target.display_name = Some("app".to_string());
        assert_eq!(target.label(), "app");
    }

    #[test]
    fn test_depends_on_self() {
        let ok = make_target("bsp://workspace/app", &["bsp://workspace/lib"]);
        assert!(!ok.depends_on_self());
        let bad = make_target("bsp://workspace/app", &["bsp://workspace/app"]);
        assert!(bad.depends_on_self());
    }

    #[test]
    fn test_capabilities_camel_case() {
        let caps: BuildTargetCapabilities = serde_json::from_value(serde_json::json!({
            "canCompile": true,
            "canDebug": true
        }))
        .unwrap();
        assert!(caps.can_compile);
        assert!(!caps.can_test);
        assert!(!caps.can_run);
        assert!(caps.can_debug);
    }

    #[test]
    fn test_status_code_from_code() {
        assert_eq!(StatusCode::from_code(1), Some(StatusCode::Ok));
        assert_eq!(StatusCode::from_code(2), Some(StatusCode::Error));
        assert_eq!(StatusCode::from_code(3), Some(StatusCode::Cancelled));
        assert_eq!(StatusCode::from_code(0), None);
        assert_eq!(StatusCode::from_code(99), None);
    }

    #[test]
    fn test_operation_result_success() {
        let ok = OperationResult::new("origin-1".to_string(), StatusCode::Ok);
        assert!(ok.is_success());
        let failed = OperationResult::new("origin-2".to_string(), StatusCode::Error);
        assert!(!failed.is_success());
        let cancelled = OperationResult::new("origin-3".to_string(), StatusCode::Cancelled);
        assert!(!cancelled.is_success());
    }
}
