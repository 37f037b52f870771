//! Download and unpack pinned Databricks CLI releases.
//!
//! Releases land in `<install_dir>/<version>/databricks`. The presence of that
//! file is the only "already installed" check, so an install is unpacked into
//! a staging directory and renamed into place once it is complete.

use chrono::Utc;
use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::cli_version::{detect_cli_version, CliVersion};
use crate::context::CommandContext;
use crate::error::{Error, Result};
use crate::executor::{exec_command, ProcessRunner};

pub const DEFAULT_DOWNLOAD_BASE_URL: &str = "https://github.com/databricks/cli/releases/download";
pub const SYSTEM_EXECUTABLE: &str = "databricks";
const RECEIPT_FILE: &str = ".brickflow-install.json";

// ============================================================================
// Platform
// ============================================================================

/// Release asset naming for an OS/arch pair (`linux`/`amd64`, `darwin`/`arm64`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Platform {
    pub os: &'static str,
    pub arch: &'static str,
}

impl Platform {
    pub fn new(os: &'static str, arch: &'static str) -> Self {
        Self { os, arch }
    }

    /// Detects the current platform. Returns `None` when no release is published for it.
    pub fn detect() -> Option<Self> {
        Self::from_consts(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn current() -> Result<Self> {
        Self::detect().ok_or_else(|| {
            Error::cli_unsupported_platform(std::env::consts::OS, std::env::consts::ARCH)
        })
    }

    fn from_consts(os: &str, arch: &str) -> Option<Self> {
        let os = match os {
            "linux" => "linux",
            "macos" => "darwin",
            "windows" => "windows",
            _ => return None,
        };
        let arch = match arch {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            _ => return None,
        };
        Some(Self { os, arch })
    }
}

// ============================================================================
// Release naming
// ============================================================================

pub fn archive_name(version: &Version, platform: Platform) -> String {
    format!(
        "databricks_cli_{}_{}_{}.zip",
        version, platform.os, platform.arch
    )
}

pub fn download_url_from(base_url: &str, version: &Version, platform: Platform) -> String {
    format!(
        "{}/v{}/{}",
        base_url.trim_end_matches('/'),
        version,
        archive_name(version, platform)
    )
}

/// Release archive URL for `version` on `platform`. Pure string construction.
pub fn download_url(version: &Version, platform: Platform) -> String {
    download_url_from(DEFAULT_DOWNLOAD_BASE_URL, version, platform)
}

/// Release archive URL for `version` on the current platform.
pub fn bundle_download_path(version: &Version) -> Result<String> {
    Ok(download_url(version, Platform::current()?))
}

pub fn checksums_url(base_url: &str, version: &Version) -> String {
    format!(
        "{}/v{}/databricks_cli_{}_SHA256SUMS",
        base_url.trim_end_matches('/'),
        version,
        version
    )
}

pub fn executable_name() -> &'static str {
    if cfg!(windows) {
        "databricks.exe"
    } else {
        "databricks"
    }
}

pub fn executable_path(install_dir: &Path, version: &Version) -> PathBuf {
    install_dir
        .join(version.to_string())
        .join(executable_name())
}

// ============================================================================
// Archive sources
// ============================================================================

/// Where release files come from. Implemented over HTTP in production.
pub trait ArchiveSource {
    /// Write the resource at `url` to `dest`, returning the number of bytes written.
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;

    /// Fetch a small text resource. `Ok(None)` when the server reports 404.
    fn fetch_text(&self, url: &str) -> Result<Option<String>>;
}

pub struct HttpArchiveSource {
    client: reqwest::blocking::Client,
}

impl HttpArchiveSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(format!("brickflow/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::internal_io(e.to_string(), Some("create HTTP client".to_string()))
            })?;
        Ok(Self { client })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        self.client
            .get(url)
            .send()
            .map_err(|e| Error::cli_download_failed(url, e.to_string(), None, 1))
    }
}

impl ArchiveSource for HttpArchiveSource {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self.get(url)?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::cli_download_failed(
                url,
                status.canonical_reason().unwrap_or("request failed"),
                Some(status.as_u16()),
                1,
            ));
        }

        let mut file = File::create(dest).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("create {}", dest.display())))
        })?;
        response
            .copy_to(&mut file)
            .map_err(|e| Error::cli_download_failed(url, e.to_string(), None, 1))
    }

    fn fetch_text(&self, url: &str) -> Result<Option<String>> {
        let response = self.get(url)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::cli_download_failed(
                url,
                status.canonical_reason().unwrap_or("request failed"),
                Some(status.as_u16()),
                1,
            ));
        }
        response
            .text()
            .map(Some)
            .map_err(|e| Error::cli_download_failed(url, e.to_string(), None, 1))
    }
}

// ============================================================================
// Installer
// ============================================================================

#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub base_url: String,
    pub verify_checksums: bool,
    /// Extra attempts after a retryable download failure.
    pub download_retries: u32,
    /// Delay before retry `n` is `retry_backoff * n`.
    pub retry_backoff: Duration,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DOWNLOAD_BASE_URL.to_string(),
            verify_checksums: true,
            download_retries: 2,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

/// Written next to an installed binary to record where it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallReceipt {
    pub version: String,
    pub url: String,
    pub sha256: String,
    pub installed_at: String,
}

pub struct Installer<'a> {
    source: &'a dyn ArchiveSource,
    install_dir: PathBuf,
    platform: Platform,
    options: InstallOptions,
}

impl<'a> Installer<'a> {
    pub fn new(
        source: &'a dyn ArchiveSource,
        install_dir: impl Into<PathBuf>,
        platform: Platform,
        options: InstallOptions,
    ) -> Self {
        Self {
            source,
            install_dir: install_dir.into(),
            platform,
            options,
        }
    }

    pub fn from_context(ctx: &CommandContext, source: &'a dyn ArchiveSource) -> Result<Self> {
        let cli = &ctx.defaults.bundle_cli;
        let options = InstallOptions {
            base_url: cli.download_base_url.clone(),
            verify_checksums: cli.verify_checksums,
            download_retries: cli.download_retries,
            ..InstallOptions::default()
        };
        Ok(Self::new(source, ctx.install_dir(), Platform::current()?, options))
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn download_url(&self, version: &Version) -> String {
        download_url_from(&self.options.base_url, version, self.platform)
    }

    pub fn executable_path(&self, version: &Version) -> PathBuf {
        executable_path(&self.install_dir, version)
    }

    pub fn is_installed(&self, version: &Version) -> bool {
        self.executable_path(version).is_file()
    }

    /// Install `version` unless it is already present. Returns the executable path.
    pub fn install(&self, version: &Version) -> Result<PathBuf> {
        let exe = self.executable_path(version);
        if exe.is_file() {
            crate::log_status!("install", "Databricks CLI v{} already installed", version);
            return Ok(exe);
        }

        let url = self.download_url(version);
        fs::create_dir_all(&self.install_dir).map_err(|e| {
            Error::internal_io(
                e.to_string(),
                Some(format!("create {}", self.install_dir.display())),
            )
        })?;

        let staging = self.install_dir.join(format!(".{}.partial", version));
        let archive = self
            .install_dir
            .join(format!("{}.download", archive_name(version, self.platform)));
        remove_dir_if_exists(&staging)?;

        crate::log_status!("install", "Downloading Databricks CLI v{} from {}", version, url);
        let result = self.fetch_verify_unpack(version, &url, &archive, &staging);
        let _ = fs::remove_file(&archive);
        let sha256 = match result {
            Ok(sha256) => sha256,
            Err(err) => {
                let _ = fs::remove_dir_all(&staging);
                return Err(err);
            }
        };

        let version_dir = self.install_dir.join(version.to_string());
        remove_dir_if_exists(&version_dir)?;
        fs::rename(&staging, &version_dir).map_err(|e| {
            Error::internal_io(
                e.to_string(),
                Some(format!("move install into {}", version_dir.display())),
            )
        })?;

        write_receipt(
            &version_dir,
            &InstallReceipt {
                version: version.to_string(),
                url,
                sha256,
                installed_at: Utc::now().to_rfc3339(),
            },
        )?;

        crate::log_status!("install", "Installed {}", exe.display());
        Ok(exe)
    }

    fn fetch_verify_unpack(
        &self,
        version: &Version,
        url: &str,
        archive: &Path,
        staging: &Path,
    ) -> Result<String> {
        self.download_with_retries(url, archive)?;
        let sha256 = sha256_file(archive)?;
        if self.options.verify_checksums {
            self.verify_checksum(version, &sha256)?;
        }
        unpack(version, archive, staging)?;
        Ok(sha256)
    }

    fn download_with_retries(&self, url: &str, dest: &Path) -> Result<u64> {
        let max_attempts = self.options.download_retries + 1;
        let mut attempt = 1;
        loop {
            match self.source.fetch(url, dest) {
                Ok(bytes) => return Ok(bytes),
                Err(err) if err.retryable == Some(true) && attempt < max_attempts => {
                    crate::log_status!(
                        "install",
                        "Download attempt {}/{} failed: {}",
                        attempt,
                        max_attempts,
                        err.details["error"].as_str().unwrap_or(&err.message)
                    );
                    thread::sleep(self.options.retry_backoff * attempt);
                    attempt += 1;
                }
                Err(mut err) => {
                    if let Some(details) = err.details.as_object_mut() {
                        details.insert("attempts".to_string(), attempt.into());
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Run the installed binary's `--version` and require it to report `version`.
    ///
    /// A binary that reports anything else is removed, so the next install
    /// downloads it again instead of trusting the existing file.
    pub fn verify(&self, runner: &dyn ProcessRunner, version: &Version) -> Result<Version> {
        let exe = self.executable_path(version);
        let exe_str = exe.display().to_string();
        let banner = exec_command(runner, &exe_str, "--version", &[], true)?;

        let problem = match detect_cli_version(&banner) {
            Some(reported) if &reported == version => return Ok(reported),
            Some(reported) => format!("binary reports v{}", reported),
            None => format!("binary did not report a version (got '{}')", banner),
        };

        let version_dir = self.install_dir.join(version.to_string());
        remove_dir_if_exists(&version_dir)?;
        Err(Error::cli_install_failed(
            version.to_string(),
            problem,
            Some(exe_str),
        ))
    }

    /// Compare against the release's SHA256SUMS. A missing sums file only warns.
    fn verify_checksum(&self, version: &Version, actual: &str) -> Result<()> {
        let sums_url = checksums_url(&self.options.base_url, version);
        let sums = match self.source.fetch_text(&sums_url) {
            Ok(Some(sums)) => sums,
            Ok(None) => {
                crate::log_status!("install", "No checksums published at {}", sums_url);
                return Ok(());
            }
            Err(err) => {
                crate::log_status!("install", "Skipping checksum verification: {}", err);
                return Ok(());
            }
        };

        let name = archive_name(version, self.platform);
        match expected_checksum(&sums, &name) {
            Some(expected) if expected.eq_ignore_ascii_case(actual) => Ok(()),
            Some(expected) => Err(Error::cli_install_failed(
                version.to_string(),
                format!(
                    "checksum mismatch for {}: expected {}, got {}",
                    name, expected, actual
                ),
                None,
            )),
            None => {
                crate::log_status!("install", "{} not listed in {}", name, sums_url);
                Ok(())
            }
        }
    }
}

/// Executable to run for bundle commands in this context.
///
/// BRICKFLOW_BUNDLE_CLI_EXEC wins. `auto`, unparsable pins, and
/// BRICKFLOW_BUNDLE_NO_DOWNLOAD use `databricks` from PATH. Otherwise the
/// pinned release is installed on demand.
pub fn resolve_bundle_cli(ctx: &CommandContext, source: &dyn ArchiveSource) -> Result<String> {
    if let Some(exec) = ctx.cli_exec_override() {
        return Ok(exec.to_string());
    }

    match ctx.cli_version() {
        CliVersion::Pinned(version) if !ctx.no_download() => {
            let installer = Installer::from_context(ctx, source)?;
            Ok(installer.install(&version)?.display().to_string())
        }
        CliVersion::Unparsed(raw) => {
            crate::log_status!(
                "install",
                "Could not parse CLI version '{}', using {} from PATH",
                raw,
                SYSTEM_EXECUTABLE
            );
            Ok(SYSTEM_EXECUTABLE.to_string())
        }
        _ => Ok(SYSTEM_EXECUTABLE.to_string()),
    }
}

/// Executable [`resolve_bundle_cli`] would pick, without installing anything.
pub fn planned_bundle_cli(ctx: &CommandContext) -> String {
    if let Some(exec) = ctx.cli_exec_override() {
        return exec.to_string();
    }
    match ctx.cli_version() {
        CliVersion::Pinned(version) if !ctx.no_download() => {
            executable_path(&ctx.install_dir(), &version)
                .display()
                .to_string()
        }
        _ => SYSTEM_EXECUTABLE.to_string(),
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn unpack(version: &Version, archive: &Path, dest: &Path) -> Result<()> {
    let install_error =
        |problem: String| Error::cli_install_failed(version.to_string(), problem, None);

    let file = File::open(archive).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("open {}", archive.display())))
    })?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| install_error(format!("unreadable archive: {}", e)))?;

    fs::create_dir_all(dest).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("create {}", dest.display())))
    })?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| install_error(format!("corrupt archive entry: {}", e)))?;
        let relative = match entry.enclosed_name() {
            Some(path) => path.to_path_buf(),
            None => continue,
        };
        let target = dest.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| {
                Error::internal_io(e.to_string(), Some(format!("create {}", target.display())))
            })?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::internal_io(e.to_string(), Some(format!("create {}", parent.display())))
            })?;
        }
        let mut out = File::create(&target).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("create {}", target.display())))
        })?;
        io::copy(&mut entry, &mut out)
            .map_err(|e| install_error(format!("failed to extract {}: {}", relative.display(), e)))?;
    }

    let exe = dest.join(executable_name());
    if !exe.is_file() {
        return Err(install_error(format!(
            "archive does not contain {}",
            executable_name()
        )));
    }
    make_executable(&exe)
}

#[allow(unused_variables)]
fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut permissions = fs::metadata(path)
            .map_err(|e| {
                Error::internal_io(e.to_string(), Some(format!("stat {}", path.display())))
            })?
            .permissions();
        permissions.set_mode(permissions.mode() | 0o755);
        fs::set_permissions(path, permissions).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("chmod {}", path.display())))
        })?;
    }

    Ok(())
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("open {}", path.display())))
    })?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("hash {}", path.display())))
    })?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Find `name` in `sha256sum`-style output (`<hex>  <file>`).
fn expected_checksum<'s>(sums: &'s str, name: &str) -> Option<&'s str> {
    sums.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let hash = parts.next()?;
        let file = parts.next()?.trim_start_matches('*');
        (file == name).then_some(hash)
    })
}

fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("remove {}", dir.display())))
        })?;
    }
    Ok(())
}

fn write_receipt(dir: &Path, receipt: &InstallReceipt) -> Result<()> {
    let path = dir.join(RECEIPT_FILE);
    let content = serde_json::to_string_pretty(receipt)
        .map_err(|e| Error::internal_json(e.to_string(), Some("serialize receipt".to_string())))?;
    fs::write(&path, content).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("write {}", path.display())))
    })
}

/// Receipt for an installed version, if one was written.
pub fn read_receipt(install_dir: &Path, version: &Version) -> Option<InstallReceipt> {
    let path = install_dir.join(version.to_string()).join(RECEIPT_FILE);
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::io::Write;

    /// Build a release-shaped zip whose `databricks` entry is a shell script
    /// that reports `version`.
    pub fn fake_release_zip(version: &str, include_executable: bool) -> Vec<u8> {
        let mut buf = io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::FileOptions::default()
                .compression_method(zip::CompressionMethod::Stored)
                .unix_permissions(0o644);

            zip.start_file("LICENSE", options).unwrap();
            zip.write_all(b"license").unwrap();

            if include_executable {
                zip.start_file(executable_name(), options).unwrap();
                write!(zip, "#!/bin/sh\necho \"Databricks CLI v{}\"\n", version).unwrap();
            }
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        format!("{:x}", Sha256::digest(bytes))
    }

    /// Serves canned bytes and counts fetches. `failures` makes the first
    /// N archive fetches fail with a retryable network error.
    #[derive(Default)]
    pub struct FakeSource {
        pub archive: Vec<u8>,
        pub sums: Option<String>,
        pub failures: Cell<u32>,
        pub client_error: Option<u16>,
        pub fetched: RefCell<Vec<String>>,
    }

    impl FakeSource {
        pub fn serving(archive: Vec<u8>) -> Self {
            Self {
                archive,
                ..Default::default()
            }
        }

        pub fn archive_fetches(&self) -> usize {
            self.fetched
                .borrow()
                .iter()
                .filter(|u| u.ends_with(".zip"))
                .count()
        }
    }

    impl ArchiveSource for FakeSource {
        fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
            self.fetched.borrow_mut().push(url.to_string());
            if let Some(status) = self.client_error {
                return Err(Error::cli_download_failed(url, "client error", Some(status), 1));
            }
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(Error::cli_download_failed(url, "connection reset", None, 1));
            }
            fs::write(dest, &self.archive).unwrap();
            Ok(self.archive.len() as u64)
        }

        fn fetch_text(&self, url: &str) -> Result<Option<String>> {
            self.fetched.borrow_mut().push(url.to_string());
            Ok(self.sums.clone())
        }
    }
}
