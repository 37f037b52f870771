use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::paths;

/// Root configuration structure for brickflow.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BrickflowConfig {
    #[serde(default)]
    pub defaults: Defaults,
}

/// All configurable defaults that can be overridden via brickflow.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_bundle_cli")]
    pub bundle_cli: BundleCliConfig,

    #[serde(default = "default_env")]
    pub env: String,

    #[serde(default = "default_docs_url")]
    pub docs_url: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            bundle_cli: default_bundle_cli(),
            env: default_env(),
            docs_url: default_docs_url(),
        }
    }
}

/// Configuration for the vendored Databricks CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleCliConfig {
    /// Version pin used when BRICKFLOW_BUNDLE_CLI_VERSION is unset
    #[serde(default = "default_cli_version")]
    pub version: String,

    /// Directory holding `<version>/databricks`, relative to the working directory
    #[serde(default = "default_install_dir")]
    pub install_dir: String,

    #[serde(default = "default_download_base_url")]
    pub download_base_url: String,

    #[serde(default = "default_verify_checksums")]
    pub verify_checksums: bool,

    /// Extra attempts after a retryable download failure
    #[serde(default = "default_download_retries")]
    pub download_retries: u32,

    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Upper bound on a single CLI invocation
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl BundleCliConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_bundle_cli() -> BundleCliConfig {
    BundleCliConfig {
        version: default_cli_version(),
        install_dir: default_install_dir(),
        download_base_url: default_download_base_url(),
        verify_checksums: default_verify_checksums(),
        download_retries: default_download_retries(),
        download_timeout_secs: default_download_timeout_secs(),
        timeout_secs: default_timeout_secs(),
    }
}

fn default_cli_version() -> String {
    "0.228.1".to_string()
}

fn default_install_dir() -> String {
    ".databricks/bin/cli".to_string()
}

fn default_download_base_url() -> String {
    "https://github.com/databricks/cli/releases/download".to_string()
}

fn default_verify_checksums() -> bool {
    true
}

fn default_download_retries() -> u32 {
    2
}

fn default_download_timeout_secs() -> u64 {
    300
}

fn default_timeout_secs() -> u64 {
    3600
}

fn default_env() -> String {
    "local".to_string()
}

fn default_docs_url() -> String {
    "https://engineering.nike.com/brickflow/".to_string()
}

// =============================================================================
// Loading functions
// =============================================================================

/// Load defaults, merging file config with built-in defaults.
/// If brickflow.json is missing or invalid, silently returns built-in defaults.
pub fn load_defaults() -> Defaults {
    load_config().defaults
}

/// Load the full brickflow.json config, falling back to defaults on any error.
pub fn load_config() -> BrickflowConfig {
    paths::brickflow_json()
        .and_then(|path| load_config_from_path(&path))
        .unwrap_or_default()
}

/// Load config from a specific file. A missing file or missing fields take built-in defaults.
pub fn load_config_from_path(path: &Path) -> crate::Result<BrickflowConfig> {
    if !path.exists() {
        return Ok(BrickflowConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        crate::Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    serde_json::from_str(&content)
        .map_err(|e| crate::Error::config_invalid_json(path.display().to_string(), e))
}

/// Get the path to brickflow.json (for display purposes)
pub fn config_path() -> crate::Result<String> {
    Ok(paths::brickflow_json()?.display().to_string())
}

/// Get built-in defaults (ignoring any file config)
pub fn builtin_defaults() -> Defaults {
    Defaults::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;

    #[test]
    fn builtin_defaults_pin_a_release() {
        let defaults = builtin_defaults();
        assert!(semver::Version::parse(&defaults.bundle_cli.version).is_ok());
        assert_eq!(defaults.bundle_cli.install_dir, ".databricks/bin/cli");
        assert_eq!(defaults.bundle_cli.timeout_secs, 3600);
        assert_eq!(defaults.env, "local");
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brickflow.json");
        fs::write(
            &path,
            r#"{"defaults":{"bundle_cli":{"version":"0.210.0","timeout_secs":60}}}"#,
        )
        .unwrap();

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.defaults.bundle_cli.version, "0.210.0");
        assert_eq!(config.defaults.bundle_cli.timeout_secs, 60);
        assert_eq!(config.defaults.bundle_cli.download_retries, 2);
        assert_eq!(config.defaults.docs_url, "https://engineering.nike.com/brickflow/");
    }

    #[test]
    fn missing_file_means_builtin_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from_path(&dir.path().join("brickflow.json")).unwrap();
        assert_eq!(config.defaults.bundle_cli.version, builtin_defaults().bundle_cli.version);
    }

    #[test]
    fn invalid_file_reports_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brickflow.json");
        fs::write(&path, "{not json").unwrap();

        let err = load_config_from_path(&path).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidJson);
    }
}
