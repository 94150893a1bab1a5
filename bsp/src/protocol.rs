//! BSP message serde types and parameter builders for JSON-RPC
//! communication.

use serde::{Deserialize, Serialize};

use gantry_types::{
    BuildDiagnostic, BuildTarget, BuildTargetId, DiagnosticRange, DiagnosticSeverity,
};

/// BSP protocol version this client declares.
pub const BSP_VERSION: &str = "2.1.0";

/// Client identity sent in `build/initialize`.
pub const CLIENT_NAME: &str = "gantry";
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize)]
pub(crate) struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    pub fn new(id: u64, method: &'static str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Notification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Notification {
    pub fn new(method: &'static str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

// ── client → server parameter builders ─────────────────────────────────

pub(crate) fn initialize_params(root_uri: &str, language_ids: &[String]) -> serde_json::Value {
    serde_json::json!({
        "displayName": CLIENT_NAME,
        "version": CLIENT_VERSION,
        "bspVersion": BSP_VERSION,
        "rootUri": root_uri,
        "capabilities": {
            "languageIds": language_ids
        }
    })
}

pub(crate) fn compile_params(
    targets: &[BuildTargetId],
    origin_id: &str,
    arguments: &[String],
) -> serde_json::Value {
    serde_json::json!({
        "targets": targets,
        "originId": origin_id,
        "arguments": arguments
    })
}

pub(crate) fn test_params(
    targets: &[BuildTargetId],
    origin_id: &str,
    arguments: &[String],
) -> serde_json::Value {
    serde_json::json!({
        "targets": targets,
        "originId": origin_id,
        "arguments": arguments
    })
}

pub(crate) fn run_params(
    target: &BuildTargetId,
    origin_id: &str,
    arguments: &[String],
) -> serde_json::Value {
    serde_json::json!({
        "target": target,
        "originId": origin_id,
        "arguments": arguments
    })
}

pub(crate) fn debug_params(targets: &[BuildTargetId]) -> serde_json::Value {
    serde_json::json!({ "targets": targets })
}

// ── server → client payloads ───────────────────────────────────────────

/// `build/initialize` result. Only identity fields matter to the client;
/// the capability object is retained verbatim for observers.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub bsp_version: String,
    #[serde(default)]
    pub capabilities: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BuildTargetsResult {
    #[serde(default)]
    pub targets: Vec<BuildTarget>,
}

/// Shared result shape of `buildTarget/compile|test|run`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatusResult {
    pub status_code: u64,
    #[serde(default)]
    #[allow(dead_code)]
    pub origin_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DebugAddressResult {
    pub uri: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TextDocumentIdentifier {
    pub uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PublishDiagnosticsParams {
    pub text_document: TextDocumentIdentifier,
    #[serde(default)]
    pub build_target: Option<BuildTargetId>,
    #[serde(default)]
    pub diagnostics: Vec<WireDiagnostic>,
    #[serde(default)]
    pub reset: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WirePosition {
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub character: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireRange {
    pub start: WirePosition,
    pub end: WirePosition,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireDiagnostic {
    pub range: WireRange,
    pub severity: Option<u64>,
    /// Servers send string or numeric codes.
    pub code: Option<serde_json::Value>,
    pub source: Option<String>,
    pub message: String,
}

impl WireDiagnostic {
    /// Resolve optional wire fields into the concrete domain type.
    /// Unknown severities degrade to `Error` so problems stay visible.
    pub fn to_build_diagnostic(&self) -> BuildDiagnostic {
        let severity = self
            .severity
            .and_then(DiagnosticSeverity::from_code)
            .unwrap_or(DiagnosticSeverity::Error);
        let code = self.code.as_ref().map(|c| match c {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        let source = self
            .source
            .clone()
            .unwrap_or_else(|| "build server".to_string());
        BuildDiagnostic::new(
            DiagnosticRange::new(
                self.range.start.line,
                self.range.start.character,
                self.range.end.line,
                self.range.end.character,
            ),
            severity,
            self.message.clone(),
            code,
            source,
        )
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TaskId {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TaskStartParams {
    #[serde(default)]
    pub task_id: TaskId,
    #[serde(default)]
    pub origin_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TaskProgressParams {
    #[serde(default)]
    pub task_id: TaskId,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub progress: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TaskFinishParams {
    #[serde(default)]
    pub task_id: TaskId,
    #[serde(default)]
    pub status: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessageParams {
    #[serde(rename = "type", default)]
    pub level: Option<u64>,
    pub message: String,
    #[serde(default)]
    pub origin_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_envelope_shape() {
        let request = Request::new(7, "workspace/buildTargets", None);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 7);
        assert_eq!(json["method"], "workspace/buildTargets");
        assert!(json.get("params").is_none());
    }

    #[test]
    fn test_notification_has_no_id() {
        let notification = Notification::new("build/initialized", Some(serde_json::json!({})));
        let json = serde_json::to_value(&notification).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["method"], "build/initialized");
    }

    #[test]
    fn test_initialize_params_shape() {
        let params = initialize_params("file:///workspace", &["scala".to_string()]);
        assert_eq!(params["displayName"], "gantry");
        assert_eq!(params["bspVersion"], BSP_VERSION);
        assert_eq!(params["rootUri"], "file:///workspace");
        assert_eq!(params["capabilities"]["languageIds"][0], "scala");
    }

    #[test]
    fn test_compile_params_targets_as_uri_objects() {
        let targets = vec![BuildTargetId::new("bsp://workspace/app")];
        let params = compile_params(&targets, "origin-1", &["--verbose".to_string()]);
        assert_eq!(params["targets"][0]["uri"], "bsp://workspace/app");
        assert_eq!(params["originId"], "origin-1");
        assert_eq!(params["arguments"][0], "--verbose");
    }

    #[test]
    fn test_run_params_single_target() {
        let target = BuildTargetId::new("bsp://workspace/app");
        let params = run_params(&target, "origin-2", &[]);
        assert_eq!(params["target"]["uri"], "bsp://workspace/app");
        assert!(params["arguments"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_build_targets_result_preserves_targets_and_dependency_order() {
        let result: BuildTargetsResult = serde_json::from_value(serde_json::json!({
            "targets": [
                {
                    "id": { "uri": "bsp://workspace/lib" },
                    "capabilities": { "canCompile": true }
                },
                {
                    "id": { "uri": "bsp://workspace/app" },
                    "displayName": "app",
                    "capabilities": { "canCompile": true, "canRun": true },
                    "dependencies": [{ "uri": "bsp://workspace/lib" }]
                },
                {
                    "id": { "uri": "bsp://workspace/tests" },
                    "capabilities": { "canCompile": true, "canTest": true },
                    "dependencies": [
                        { "uri": "bsp://workspace/lib" },
                        { "uri": "bsp://workspace/app" }
                    ]
                }
            ]
        }))
        .unwrap();

        assert_eq!(result.targets.len(), 3);
        assert_eq!(result.targets[1].label(), "app");
        assert!(result.targets[2].capabilities.can_test);
        let dep_uris: Vec<&str> = result.targets[2]
            .dependencies
            .iter()
            .map(BuildTargetId::uri)
            .collect();
        assert_eq!(dep_uris, ["bsp://workspace/lib", "bsp://workspace/app"]);
    }

    #[test]
    fn test_status_result_camel_case() {
        let result: StatusResult = serde_json::from_value(serde_json::json!({
            "statusCode": 2,
            "originId": "origin-3"
        }))
        .unwrap();
        assert_eq!(result.status_code, 2);
        assert_eq!(result.origin_id.as_deref(), Some("origin-3"));
    }

    #[test]
    fn test_publish_diagnostics_defaults() {
        let params: PublishDiagnosticsParams = serde_json::from_value(serde_json::json!({
            "textDocument": { "uri": "file:///Main.scala" }
        }))
        .unwrap();
        assert_eq!(params.text_document.uri, "file:///Main.scala");
        assert!(params.diagnostics.is_empty());
        assert!(!params.reset);
        assert!(params.build_target.is_none());
    }

    #[test]
    fn test_wire_diagnostic_conversion() {
        let wire: WireDiagnostic = serde_json::from_value(serde_json::json!({
            "range": {
                "start": { "line": 4, "character": 2 },
                "end": { "line": 4, "character": 9 }
            },
            "severity": 2,
            "code": "W123",
            "source": "sbt",
            "message": "unused import"
        }))
        .unwrap();
        let diag = wire.to_build_diagnostic();
        assert_eq!(diag.severity(), DiagnosticSeverity::Warning);
        assert_eq!(diag.range().start_line, 4);
        assert_eq!(diag.range().end_col, 9);
        assert_eq!(diag.code(), Some("W123"));
        assert_eq!(diag.source(), "sbt");
    }

    #[test]
    fn test_wire_diagnostic_missing_fields_defaulted() {
        let wire: WireDiagnostic = serde_json::from_value(serde_json::json!({
            "range": {
                "start": { "line": 0, "character": 0 },
                "end": { "line": 0, "character": 1 }
            },
            "message": "boom"
        }))
        .unwrap();
        let diag = wire.to_build_diagnostic();
        // Missing severity degrades to Error, missing source to a placeholder
        assert_eq!(diag.severity(), DiagnosticSeverity::Error);
        assert_eq!(diag.source(), "build server");
        assert_eq!(diag.code(), None);
    }

    #[test]
    fn test_wire_diagnostic_numeric_code() {
        let wire: WireDiagnostic = serde_json::from_value(serde_json::json!({
            "range": {
                "start": { "line": 0, "character": 0 },
                "end": { "line": 0, "character": 1 }
            },
            "code": 404,
            "message": "m"
        }))
        .unwrap();
        assert_eq!(wire.to_build_diagnostic().code(), Some("404"));
    }

    #[test]
    fn test_task_params_tolerate_missing_fields() {
        let start: TaskStartParams = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(start.task_id.id, "");
        assert!(start.message.is_none());

        let finish: TaskFinishParams = serde_json::from_value(serde_json::json!({
            "taskId": { "id": "t-1" }
        }))
        .unwrap();
        assert_eq!(finish.task_id.id, "t-1");
        assert!(finish.status.is_none());
    }
}
