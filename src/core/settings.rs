//! Per-invocation deployment toggles.
//!
//! Built from the environment when a command starts, mutated by its handler,
//! and exported to the Databricks CLI child as `BRICKFLOW_*` variables.

use serde::Serialize;

use crate::env::{EnvSnapshot, EnvVar};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeploymentSettings {
    /// `None` means unset; the child applies its own default.
    pub auto_add_libraries: Option<bool>,
    pub project_name: Option<String>,
    pub env: Option<String>,
}

impl DeploymentSettings {
    pub fn from_env(env: &EnvSnapshot) -> Self {
        Self {
            auto_add_libraries: env.optional_flag(EnvVar::AutoAddLibraries),
            project_name: env.get(EnvVar::ProjectName).map(str::to_string),
            env: env.get(EnvVar::Env).map(str::to_string),
        }
    }

    /// Environment pairs for the child process. Unset fields are omitted.
    pub fn to_env_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(value) = self.auto_add_libraries {
            pairs.push((EnvVar::AutoAddLibraries.as_str().to_string(), value.to_string()));
        }
        if let Some(name) = &self.project_name {
            pairs.push((EnvVar::ProjectName.as_str().to_string(), name.clone()));
        }
        if let Some(env) = &self.env {
            pairs.push((EnvVar::Env.as_str().to_string(), env.clone()));
        }
        pairs
    }
}

/// Library auto-add is the negation of `--skip-libraries`. Last write wins.
pub fn handle_libraries(settings: &mut DeploymentSettings, skip_libraries: bool) {
    settings.auto_add_libraries = Some(!skip_libraries);
}
