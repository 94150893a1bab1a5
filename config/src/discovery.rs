//! Discovery of build-server connection descriptors.
//!
//! By convention a workspace lists its build servers as JSON files under
//! `<root>/.bsp/`, one descriptor per file. Unparsable files are skipped
//! with a warning so one bad descriptor cannot hide the rest.

use std::path::Path;

use serde::{Deserialize, Serialize};

use gantry_types::BspError;

/// Name of the conventional descriptor directory.
pub const BSP_DIR: &str = ".bsp";

/// How to start a BSP server and what it supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BspConnectionDetails {
    /// Display name of the server.
    pub name: String,
    /// Full launch command line (executable first).
    pub argv: Vec<String>,
    /// Server version.
    #[serde(default)]
    pub version: String,
    /// BSP protocol version the server speaks.
    #[serde(default)]
    pub bsp_version: String,
    /// Language identifiers the server supports.
    #[serde(default)]
    pub languages: Vec<String>,
}

impl BspConnectionDetails {
    /// The executable to spawn. Empty `argv` is rejected at parse time,
    /// so this cannot fail on a discovered descriptor.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.argv[0]
    }

    /// Arguments after the executable.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }
}

/// Read all server descriptors under `<root>/.bsp/`.
///
/// Descriptors are returned sorted by file name for deterministic
/// ordering. Files that fail to parse (or declare an empty `argv`) are
/// skipped with a warning. Errors only when the directory is missing,
/// unreadable, or yields no valid descriptor.
pub fn discover_configs(root_dir: &Path) -> Result<Vec<BspConnectionDetails>, BspError> {
    let bsp_dir = root_dir.join(BSP_DIR);
    let entries = std::fs::read_dir(&bsp_dir).map_err(|e| {
        BspError::ConfigDiscovery(format!("cannot read {}: {e}", bsp_dir.display()))
    })?;

    let mut files: Vec<std::path::PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    files.sort();

    let mut configs = Vec::new();
    for path in files {
        match read_descriptor(&path) {
            Ok(details) => configs.push(details),
            Err(e) => {
                tracing::warn!("Skipping BSP descriptor {}: {e:#}", path.display());
            }
        }
    }

    if configs.is_empty() {
        return Err(BspError::ConfigDiscovery(format!(
            "no valid server descriptor in {}",
            bsp_dir.display()
        )));
    }
    Ok(configs)
}

fn read_descriptor(path: &Path) -> anyhow::Result<BspConnectionDetails> {
    use anyhow::Context;

    let text = std::fs::read_to_string(path).context("reading descriptor")?;
    let details: BspConnectionDetails =
        serde_json::from_str(&text).context("parsing descriptor")?;
    if details.argv.is_empty() {
        anyhow::bail!("descriptor declares an empty argv");
    }
    Ok(details)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_descriptor(dir: &Path, file: &str, json: &serde_json::Value) {
        std::fs::write(dir.join(file), serde_json::to_string_pretty(json).unwrap()).unwrap();
    }

    fn workspace_with_bsp_dir() -> (tempfile::TempDir, std::path::PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let bsp = root.path().join(BSP_DIR);
        std::fs::create_dir(&bsp).unwrap();
        (root, bsp)
    }

    #[test]
    fn test_discovers_descriptors_sorted_by_file_name() {
        let (root, bsp) = workspace_with_bsp_dir();
        write_descriptor(
            &bsp,
            "b-server.json",
            &serde_json::json!({ "name": "beta", "argv": ["beta-bsp"] }),
        );
        write_descriptor(
            &bsp,
            "a-server.json",
            &serde_json::json!({
                "name": "alpha",
                "argv": ["alpha-bsp", "--stdio"],
                "version": "1.2.0",
                "bspVersion": "2.1.0",
                "languages": ["scala", "java"]
            }),
        );

        let configs = discover_configs(root.path()).unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].name, "alpha");
        assert_eq!(configs[0].command(), "alpha-bsp");
        assert_eq!(configs[0].args(), ["--stdio"]);
        assert_eq!(configs[0].bsp_version, "2.1.0");
        assert_eq!(configs[1].name, "beta");
        assert_eq!(configs[1].version, "");
    }

    #[test]
    fn test_missing_directory_is_discovery_error() {
        let root = tempfile::tempdir().unwrap();
        let err = discover_configs(root.path()).unwrap_err();
        assert_eq!(err.kind(), "config-discovery");
    }

    #[test]
    fn test_invalid_descriptor_skipped() {
        let (root, bsp) = workspace_with_bsp_dir();
        std::fs::write(bsp.join("broken.json"), "{ not json").unwrap();
        write_descriptor(
            &bsp,
            "ok.json",
            &serde_json::json!({ "name": "t", "argv": ["echo"] }),
        );

        let configs = discover_configs(root.path()).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].name, "t");
    }

    #[test]
    fn test_empty_argv_rejected() {
        let (root, bsp) = workspace_with_bsp_dir();
        write_descriptor(
            &bsp,
            "empty.json",
            &serde_json::json!({ "name": "t", "argv": [] }),
        );

        let err = discover_configs(root.path()).unwrap_err();
        assert_eq!(err.kind(), "config-discovery");
    }

    #[test]
    fn test_non_json_files_ignored() {
        let (root, bsp) = workspace_with_bsp_dir();
        std::fs::write(bsp.join("README.md"), "not a descriptor").unwrap();
        write_descriptor(
            &bsp,
            "srv.json",
            &serde_json::json!({ "name": "t", "argv": ["echo"] }),
        );

        let configs = discover_configs(root.path()).unwrap();
        assert_eq!(configs.len(), 1);
    }
}
