//! Environment variables recognized by brickflow.
//!
//! The process environment is captured once into an [`EnvSnapshot`] and
//! handed around explicitly, so nothing downstream reads `std::env` directly.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvVar {
    /// Target bundle environment (`-e` value).
    Env,
    /// Databricks CLI version pin, or `auto`.
    BundleCliVersion,
    /// Explicit Databricks CLI executable, bypassing download.
    BundleCliExec,
    /// Never download the CLI; use `databricks` from PATH.
    BundleNoDownload,
    /// Skip bundle deploy/destroy entirely.
    BundleNoDeploy,
    /// Child process timeout in seconds.
    BundleCliTimeout,
    AutoAddLibraries,
    ProjectName,
    WorkflowsDir,
}

impl EnvVar {
    pub const ALL: [EnvVar; 9] = [
        EnvVar::Env,
        EnvVar::BundleCliVersion,
        EnvVar::BundleCliExec,
        EnvVar::BundleNoDownload,
        EnvVar::BundleNoDeploy,
        EnvVar::BundleCliTimeout,
        EnvVar::AutoAddLibraries,
        EnvVar::ProjectName,
        EnvVar::WorkflowsDir,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnvVar::Env => "BRICKFLOW_ENV",
            EnvVar::BundleCliVersion => "BRICKFLOW_BUNDLE_CLI_VERSION",
            EnvVar::BundleCliExec => "BRICKFLOW_BUNDLE_CLI_EXEC",
            EnvVar::BundleNoDownload => "BRICKFLOW_BUNDLE_NO_DOWNLOAD",
            EnvVar::BundleNoDeploy => "BRICKFLOW_BUNDLE_NO_DEPLOY",
            EnvVar::BundleCliTimeout => "BRICKFLOW_BUNDLE_CLI_TIMEOUT",
            EnvVar::AutoAddLibraries => "BRICKFLOW_AUTO_ADD_LIBRARIES",
            EnvVar::ProjectName => "BRICKFLOW_PROJECT_NAME",
            EnvVar::WorkflowsDir => "BRICKFLOW_WORKFLOWS_DIR",
        }
    }
}

/// Immutable view of the `BRICKFLOW_*` variables for one invocation.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    values: HashMap<EnvVar, String>,
}

impl EnvSnapshot {
    /// Capture the recognized variables from the current process.
    pub fn from_process() -> Self {
        let values = EnvVar::ALL
            .iter()
            .filter_map(|var| std::env::var(var.as_str()).ok().map(|v| (*var, v)))
            .collect();
        Self { values }
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (EnvVar, S)>,
        S: Into<String>,
    {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k, v.into())).collect(),
        }
    }

    /// Value of `var`, with empty strings treated as unset.
    pub fn get(&self, var: EnvVar) -> Option<&str> {
        self.values
            .get(&var)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// Boolean flag: `true`, `1`, `yes` (any case) are truthy, anything else is false.
    pub fn flag(&self, var: EnvVar) -> bool {
        self.get(var).map(parse_bool).unwrap_or(false)
    }

    /// Tri-state boolean for settings that distinguish "unset" from false.
    pub fn optional_flag(&self, var: EnvVar) -> Option<bool> {
        self.get(var).map(parse_bool)
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_values_are_treated_as_unset() {
        let env = EnvSnapshot::from_pairs([(EnvVar::Env, "  ")]);
        assert_eq!(env.get(EnvVar::Env), None);
    }

    #[test]
    fn flag_accepts_common_truthy_spellings() {
        for value in ["true", "TRUE", "1", "yes"] {
            let env = EnvSnapshot::from_pairs([(EnvVar::BundleNoDownload, value)]);
            assert!(env.flag(EnvVar::BundleNoDownload), "{value}");
        }
        let env = EnvSnapshot::from_pairs([(EnvVar::BundleNoDownload, "false")]);
        assert!(!env.flag(EnvVar::BundleNoDownload));
    }

    #[test]
    fn optional_flag_distinguishes_unset() {
        let env = EnvSnapshot::default();
        assert_eq!(env.optional_flag(EnvVar::AutoAddLibraries), None);
        let env = EnvSnapshot::from_pairs([(EnvVar::AutoAddLibraries, "false")]);
        assert_eq!(env.optional_flag(EnvVar::AutoAddLibraries), Some(false));
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<_> = EnvVar::ALL.iter().map(|v| v.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), EnvVar::ALL.len());
    }
}
