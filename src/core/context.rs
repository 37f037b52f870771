use std::path::{Path, PathBuf};

use crate::cli_version::{self, CliVersion, ForceLockFlag};
use crate::defaults::{self, Defaults};
use crate::env::{EnvSnapshot, EnvVar};
use crate::paths;
use crate::settings::DeploymentSettings;

/// Everything a command handler needs, built once per CLI invocation.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub env: EnvSnapshot,
    pub defaults: Defaults,
    pub settings: DeploymentSettings,
    /// Directory that relative install paths resolve against.
    pub base_dir: PathBuf,
}

impl CommandContext {
    pub fn new(env: EnvSnapshot, defaults: Defaults, base_dir: impl Into<PathBuf>) -> Self {
        let settings = DeploymentSettings::from_env(&env);
        Self {
            env,
            defaults,
            settings,
            base_dir: base_dir.into(),
        }
    }

    /// Context for the running process: real environment, brickflow.json, cwd.
    pub fn from_process() -> Self {
        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(EnvSnapshot::from_process(), defaults::load_defaults(), base_dir)
    }

    /// Target bundle environment: `--env`, then BRICKFLOW_ENV, then the configured default.
    pub fn bundles_project_env(&self) -> String {
        self.settings
            .env
            .clone()
            .unwrap_or_else(|| self.defaults.env.clone())
    }

    pub fn cli_version(&self) -> CliVersion {
        cli_version::configured_version(&self.env, &self.defaults)
    }

    pub fn force_lock_flag(&self) -> ForceLockFlag {
        cli_version::force_flag_from_env(&self.env, &self.defaults)
    }

    pub fn install_dir(&self) -> PathBuf {
        self.resolve(&self.defaults.bundle_cli.install_dir)
    }

    /// Explicit executable from BRICKFLOW_BUNDLE_CLI_EXEC, if any.
    pub fn cli_exec_override(&self) -> Option<&str> {
        self.env.get(EnvVar::BundleCliExec)
    }

    pub fn no_download(&self) -> bool {
        self.env.flag(EnvVar::BundleNoDownload)
    }

    pub fn no_deploy(&self) -> bool {
        self.env.flag(EnvVar::BundleNoDeploy)
    }

    fn resolve(&self, configured: &str) -> PathBuf {
        let expanded = paths::expand(configured);
        if expanded.is_absolute() {
            expanded
        } else {
            self.base_dir.join(expanded)
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}
