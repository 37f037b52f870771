//! Databricks CLI version pins and the force-lock flag they imply.
//!
//! Releases before 0.203.0 spell the lock override `--force`; later ones use
//! `--force-lock`. Anything we cannot parse is assumed to be a new release.

use regex::Regex;
use semver::Version;
use serde::Serialize;
use std::fmt;

use crate::defaults::Defaults;
use crate::env::{EnvSnapshot, EnvVar};

/// First release that accepts `--force-lock`.
pub const FORCE_LOCK_MIN_VERSION: Version = Version::new(0, 203, 0);

pub const AUTO: &str = "auto";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliVersion {
    /// Use whichever `databricks` binary is on PATH.
    Auto,
    Pinned(Version),
    /// Not `auto` and not a semantic version.
    Unparsed(String),
}

impl CliVersion {
    /// Parse a version pin. Never fails: unknown text becomes [`CliVersion::Unparsed`].
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case(AUTO) {
            return CliVersion::Auto;
        }
        let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
        match Version::parse(bare) {
            Ok(version) => CliVersion::Pinned(version),
            Err(_) => CliVersion::Unparsed(trimmed.to_string()),
        }
    }

    pub fn pinned(&self) -> Option<&Version> {
        match self {
            CliVersion::Pinned(v) => Some(v),
            _ => None,
        }
    }

    pub fn force_lock_flag(&self) -> ForceLockFlag {
        match self {
            CliVersion::Pinned(v) if *v < FORCE_LOCK_MIN_VERSION => ForceLockFlag::Force,
            _ => ForceLockFlag::ForceLock,
        }
    }
}

impl fmt::Display for CliVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliVersion::Auto => write!(f, "{}", AUTO),
            CliVersion::Pinned(v) => write!(f, "{}", v),
            CliVersion::Unparsed(raw) => write!(f, "{}", raw),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ForceLockFlag {
    #[serde(rename = "--force-lock")]
    ForceLock,
    #[serde(rename = "--force")]
    Force,
}

impl ForceLockFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForceLockFlag::ForceLock => "--force-lock",
            ForceLockFlag::Force => "--force",
        }
    }
}

impl fmt::Display for ForceLockFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flag token for a raw version string.
pub fn resolve_force_flag(raw: &str) -> ForceLockFlag {
    CliVersion::parse(raw).force_lock_flag()
}

/// Version pin for this invocation: env override first, then config.
pub fn configured_version(env: &EnvSnapshot, defaults: &Defaults) -> CliVersion {
    let raw = env
        .get(EnvVar::BundleCliVersion)
        .unwrap_or(&defaults.bundle_cli.version);
    CliVersion::parse(raw)
}

/// Force flag for the configured CLI version.
pub fn force_flag_from_env(env: &EnvSnapshot, defaults: &Defaults) -> ForceLockFlag {
    let version = configured_version(env, defaults);
    if let CliVersion::Unparsed(raw) = &version {
        crate::log_status!(
            "bundle",
            "Could not parse CLI version '{}', assuming {}",
            raw,
            ForceLockFlag::ForceLock
        );
    }
    version.force_lock_flag()
}

/// Extract the version from `databricks --version` output (`Databricks CLI v0.203.0`).
pub fn detect_cli_version(output: &str) -> Option<Version> {
    let pattern = Regex::new(r"Databricks CLI v(\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?)").ok()?;
    let captures = pattern.captures(output)?;
    Version::parse(captures.get(1)?.as_str()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_flag_follows_threshold() {
        assert_eq!(resolve_force_flag("0.203.0"), ForceLockFlag::ForceLock);
        assert_eq!(resolve_force_flag("0.202.0"), ForceLockFlag::Force);
        assert_eq!(resolve_force_flag("0.228.1"), ForceLockFlag::ForceLock);
        assert_eq!(resolve_force_flag("0.100.4"), ForceLockFlag::Force);
    }

    #[test]
    fn auto_and_garbage_assume_newest() {
        assert_eq!(resolve_force_flag("auto"), ForceLockFlag::ForceLock);
        assert_eq!(resolve_force_flag("something else"), ForceLockFlag::ForceLock);
        assert_eq!(resolve_force_flag("garbage-not-a-version"), ForceLockFlag::ForceLock);
        assert_eq!(resolve_force_flag(""), ForceLockFlag::ForceLock);
    }

    #[test]
    fn flag_tokens_render_literally() {
        assert_eq!(ForceLockFlag::ForceLock.as_str(), "--force-lock");
        assert_eq!(ForceLockFlag::Force.to_string(), "--force");
    }

    #[test]
    fn parse_accepts_v_prefix_and_case() {
        assert_eq!(
            CliVersion::parse("v0.202.0"),
            CliVersion::Pinned(Version::new(0, 202, 0))
        );
        assert_eq!(CliVersion::parse("AUTO"), CliVersion::Auto);
        assert_eq!(
            CliVersion::parse("0.203"),
            CliVersion::Unparsed("0.203".to_string())
        );
    }

    #[test]
    fn prerelease_below_threshold_uses_legacy_flag() {
        assert_eq!(resolve_force_flag("0.203.0-beta.1"), ForceLockFlag::Force);
    }

    #[test]
    fn configured_version_prefers_env() {
        let defaults = Defaults::default();
        let env = EnvSnapshot::from_pairs([(EnvVar::BundleCliVersion, "0.202.0")]);
        assert_eq!(force_flag_from_env(&env, &defaults), ForceLockFlag::Force);

        let env = EnvSnapshot::default();
        assert_eq!(
            configured_version(&env, &defaults).to_string(),
            defaults.bundle_cli.version
        );
    }

    #[test]
    fn detect_cli_version_reads_self_report() {
        assert_eq!(
            detect_cli_version("Databricks CLI v0.200.0\n"),
            Some(Version::new(0, 200, 0))
        );
        assert_eq!(detect_cli_version("databricks 1.0"), None);
    }
}
