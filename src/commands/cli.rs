use clap::{Args, Subcommand};
use serde::Serialize;

use brickflow::cli_version::{self, CliVersion, ForceLockFlag};
use brickflow::executor::{self, SystemRunner};
use brickflow::installer::{self, HttpArchiveSource, Installer};
use brickflow::{defaults, CommandContext, Error};

use super::CmdResult;

#[derive(Args)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand)]
pub enum CliCommand {
    /// Download and unpack the pinned Databricks CLI release
    Install {
        /// Release to install (defaults to BRICKFLOW_BUNDLE_CLI_VERSION or the configured pin)
        #[arg(long)]
        version: Option<String>,
    },
    /// Show which Databricks CLI bundle commands will use
    Info,
}

#[derive(Serialize)]
#[serde(tag = "command")]
pub enum CliOutput {
    #[serde(rename = "cli.install")]
    Install {
        version: String,
        url: String,
        executable: String,
        reported_version: String,
    },

    #[serde(rename = "cli.info")]
    Info {
        version: String,
        force_flag: ForceLockFlag,
        #[serde(skip_serializing_if = "Option::is_none")]
        download_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        executable: Option<String>,
        installed: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reported_version: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        config_path: Option<String>,
    },
}

pub fn run(args: CliArgs, ctx: &mut CommandContext) -> CmdResult<CliOutput> {
    match args.command {
        CliCommand::Install { version } => install(ctx, version.as_deref()),
        CliCommand::Info => info(ctx),
    }
}

fn install(ctx: &CommandContext, requested: Option<&str>) -> CmdResult<CliOutput> {
    let version = match requested {
        Some(raw) => CliVersion::parse(raw),
        None => ctx.cli_version(),
    };
    let version = version.pinned().cloned().ok_or_else(|| {
        Error::validation_invalid_argument(
            "version",
            format!("'{}' is not an installable release", version),
            Some(version.to_string()),
            None,
        )
        .with_hint("Pass an exact release, e.g. --version 0.228.1")
    })?;

    let source = HttpArchiveSource::new(ctx.defaults.bundle_cli.download_timeout())?;
    let installer = Installer::from_context(ctx, &source)?;
    let exe = installer.install(&version)?;
    let exe_str = exe.display().to_string();

    let runner = SystemRunner::from_config(&ctx.env, &ctx.defaults)?;
    let reported = installer.verify(&runner, &version)?;

    Ok((
        CliOutput::Install {
            url: installer.download_url(&version),
            version: version.to_string(),
            executable: exe_str,
            reported_version: reported.to_string(),
        },
        0,
    ))
}

fn info(ctx: &CommandContext) -> CmdResult<CliOutput> {
    let version = ctx.cli_version();
    let platform = installer::Platform::detect();

    let (download_url, executable, installed) = match ctx.cli_exec_override() {
        Some(exec) => (None, Some(exec.to_string()), false),
        None => match (version.pinned(), platform) {
            (Some(v), Some(platform)) => {
                let exe = installer::executable_path(&ctx.install_dir(), v);
                (
                    Some(installer::download_url_from(
                        &ctx.defaults.bundle_cli.download_base_url,
                        v,
                        platform,
                    )),
                    Some(exe.display().to_string()),
                    exe.is_file(),
                )
            }
            _ => (None, None, false),
        },
    };

    // Probing is best effort: a missing or broken binary just leaves it unset.
    let reported_version = match (&executable, installed || ctx.cli_exec_override().is_some()) {
        (Some(exe), true) => report_version(ctx, exe),
        _ => None,
    };

    Ok((
        CliOutput::Info {
            version: version.to_string(),
            force_flag: version.force_lock_flag(),
            download_url,
            executable,
            installed,
            reported_version,
            config_path: defaults::config_path().ok(),
        },
        0,
    ))
}

fn report_version(ctx: &CommandContext, exe: &str) -> Option<String> {
    let runner = SystemRunner::from_config(&ctx.env, &ctx.defaults).ok()?;
    let banner = executor::exec_command(&runner, exe, "--version", &[], true).ok()?;
    cli_version::detect_cli_version(&banner).map(|v| v.to_string())
}
