//! `databricks bundle deploy|destroy` invocations.

use serde::Serialize;

use crate::cli_version::ForceLockFlag;
use crate::context::CommandContext;
use crate::env::EnvVar;
use crate::error::Result;
use crate::executor::{exec_command_with_env, ProcessRunner};
use crate::installer::{self, ArchiveSource};

pub const BUNDLE_SUBCOMMAND: &str = "bundle";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleCommand {
    Deploy,
    Destroy,
}

impl BundleCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleCommand::Deploy => "deploy",
            BundleCommand::Destroy => "destroy",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BundleOptions {
    pub force_acquire_lock: bool,
    pub workflows_dir: Option<String>,
    pub debug: bool,
    /// Deploy only: refuse to deploy while jobs are running.
    pub fail_on_active_runs: bool,
}

/// Arguments that follow `bundle` on the CLI command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleInvocation {
    pub command: BundleCommand,
    pub env: String,
    pub force_flag: Option<ForceLockFlag>,
    pub debug: bool,
    pub fail_on_active_runs: bool,
}

impl BundleInvocation {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            self.command.as_str().to_string(),
            "-e".to_string(),
            self.env.clone(),
        ];
        if let Some(flag) = self.force_flag {
            args.push(flag.as_str().to_string());
        }
        if self.debug {
            args.push("--debug".to_string());
        }
        if self.fail_on_active_runs && self.command == BundleCommand::Deploy {
            args.push("--fail-on-active-runs".to_string());
        }
        args
    }
}

/// What a bundle command did, for the JSON response.
#[derive(Debug, Clone, Serialize)]
pub struct BundleOutcome {
    pub executable: String,
    pub invocation: BundleInvocation,
    pub args: Vec<String>,
    /// True when BRICKFLOW_BUNDLE_NO_DEPLOY suppressed execution.
    pub skipped: bool,
}

pub fn build_invocation(
    ctx: &CommandContext,
    command: BundleCommand,
    options: &BundleOptions,
) -> BundleInvocation {
    BundleInvocation {
        command,
        env: ctx.bundles_project_env(),
        force_flag: options.force_acquire_lock.then(|| ctx.force_lock_flag()),
        debug: options.debug,
        fail_on_active_runs: options.fail_on_active_runs,
    }
}

pub fn bundle_deploy(
    ctx: &CommandContext,
    runner: &dyn ProcessRunner,
    executable: &str,
    options: &BundleOptions,
) -> Result<BundleOutcome> {
    run_bundle(ctx, runner, executable, BundleCommand::Deploy, options)
}

pub fn bundle_destroy(
    ctx: &CommandContext,
    runner: &dyn ProcessRunner,
    executable: &str,
    options: &BundleOptions,
) -> Result<BundleOutcome> {
    run_bundle(ctx, runner, executable, BundleCommand::Destroy, options)
}

/// Resolve the CLI (installing it if needed) and run `command`.
///
/// With BRICKFLOW_BUNDLE_NO_DEPLOY set nothing is downloaded or run.
pub fn run_with_cli(
    ctx: &CommandContext,
    runner: &dyn ProcessRunner,
    source: &dyn ArchiveSource,
    command: BundleCommand,
    options: &BundleOptions,
) -> Result<BundleOutcome> {
    if ctx.no_deploy() {
        return Ok(skipped(ctx, &installer::planned_bundle_cli(ctx), command, options));
    }
    let executable = installer::resolve_bundle_cli(ctx, source)?;
    match command {
        BundleCommand::Deploy => bundle_deploy(ctx, runner, &executable, options),
        BundleCommand::Destroy => bundle_destroy(ctx, runner, &executable, options),
    }
}

fn skipped(
    ctx: &CommandContext,
    executable: &str,
    command: BundleCommand,
    options: &BundleOptions,
) -> BundleOutcome {
    crate::log_status!(
        "bundle",
        "{} is set, skipping bundle {}",
        EnvVar::BundleNoDeploy.as_str(),
        command.as_str()
    );
    let invocation = build_invocation(ctx, command, options);
    BundleOutcome {
        executable: executable.to_string(),
        args: invocation.to_args(),
        invocation,
        skipped: true,
    }
}

fn run_bundle(
    ctx: &CommandContext,
    runner: &dyn ProcessRunner,
    executable: &str,
    command: BundleCommand,
    options: &BundleOptions,
) -> Result<BundleOutcome> {
    if ctx.no_deploy() {
        return Ok(skipped(ctx, executable, command, options));
    }

    let invocation = build_invocation(ctx, command, options);
    let args = invocation.to_args();

    let mut envs = ctx.settings.to_env_pairs();
    if let Some(dir) = &options.workflows_dir {
        crate::log_status!("bundle", "Workflows directory: {}", dir);
        envs.push((EnvVar::WorkflowsDir.as_str().to_string(), dir.clone()));
    }

    crate::log_status!(
        "bundle",
        "Running bundle {} against '{}'",
        command.as_str(),
        invocation.env
    );
    exec_command_with_env(runner, executable, BUNDLE_SUBCOMMAND, &args, envs, false)?;

    Ok(BundleOutcome {
        executable: executable.to_string(),
        invocation,
        args,
        skipped: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::Defaults;
    use crate::env::EnvSnapshot;
    use crate::executor::testing::RecordingRunner;
    use crate::installer::testing::FakeSource;
    use crate::ErrorCode;

    fn context(pairs: Vec<(EnvVar, &str)>) -> CommandContext {
        CommandContext::new(EnvSnapshot::from_pairs(pairs), Defaults::default(), ".")
    }

    fn forced(workflows_dir: &str) -> BundleOptions {
        BundleOptions {
            force_acquire_lock: true,
            workflows_dir: Some(workflows_dir.to_string()),
            ..Default::default()
        }
    }

    type BundleFn =
        fn(&CommandContext, &dyn ProcessRunner, &str, &BundleOptions) -> Result<BundleOutcome>;

    #[test]
    fn deploy_and_destroy_pass_exact_arguments() {
        let cases: [(BundleFn, &str, &str); 2] = [
            (bundle_deploy, "deploy", "/path/to/deploy/workflows"),
            (bundle_destroy, "destroy", "/path/to/destroy/workflows"),
        ];

        for (function, command, workflows_dir) in cases {
            let ctx = context(vec![
                (EnvVar::Env, "test_env"),
                (EnvVar::BundleCliVersion, "0.203.0"),
            ]);
            let runner = RecordingRunner::default();

            function(&ctx, &runner, "test_bundle_cli", &forced(workflows_dir)).unwrap();

            let calls = runner.calls.borrow();
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].program, "test_bundle_cli");
            assert_eq!(
                calls[0].args,
                vec!["bundle", command, "-e", "test_env", "--force-lock"]
            );
            assert!(calls[0]
                .envs
                .contains(&("BRICKFLOW_WORKFLOWS_DIR".to_string(), workflows_dir.to_string())));
        }
    }

    #[test]
    fn legacy_cli_gets_legacy_flag() {
        let ctx = context(vec![(EnvVar::BundleCliVersion, "0.202.0")]);
        let runner = RecordingRunner::default();

        bundle_deploy(&ctx, &runner, "databricks", &forced("wf")).unwrap();

        assert_eq!(
            runner.calls.borrow()[0].args,
            vec!["bundle", "deploy", "-e", "local", "--force"]
        );
    }

    #[test]
    fn force_flag_is_omitted_without_lock_request() {
        let ctx = context(vec![]);
        let invocation = build_invocation(&ctx, BundleCommand::Destroy, &BundleOptions::default());
        assert_eq!(invocation.force_flag, None);
        assert_eq!(invocation.to_args(), vec!["destroy", "-e", "local"]);
    }

    #[test]
    fn optional_flags_are_appended_in_order() {
        let invocation = BundleInvocation {
            command: BundleCommand::Deploy,
            env: "dev".to_string(),
            force_flag: Some(ForceLockFlag::ForceLock),
            debug: true,
            fail_on_active_runs: true,
        };
        assert_eq!(
            invocation.to_args(),
            vec!["deploy", "-e", "dev", "--force-lock", "--debug", "--fail-on-active-runs"]
        );
    }

    #[test]
    fn fail_on_active_runs_is_deploy_only() {
        let invocation = BundleInvocation {
            command: BundleCommand::Destroy,
            env: "dev".to_string(),
            force_flag: None,
            debug: false,
            fail_on_active_runs: true,
        };
        assert_eq!(invocation.to_args(), vec!["destroy", "-e", "dev"]);
    }

    #[test]
    fn no_deploy_skips_execution() {
        let ctx = context(vec![(EnvVar::BundleNoDeploy, "true")]);
        let runner = RecordingRunner::default();

        let outcome = bundle_deploy(&ctx, &runner, "databricks", &BundleOptions::default()).unwrap();

        assert!(outcome.skipped);
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn no_deploy_skips_cli_download() {
        let ctx = context(vec![
            (EnvVar::BundleNoDeploy, "true"),
            (EnvVar::BundleCliVersion, "0.210.0"),
            (EnvVar::Env, "dev"),
        ]);
        let runner = RecordingRunner::default();
        let source = FakeSource {
            client_error: Some(503),
            ..Default::default()
        };

        let outcome =
            run_with_cli(&ctx, &runner, &source, BundleCommand::Deploy, &forced("wf")).unwrap();

        assert!(outcome.skipped);
        assert!(source.fetched.borrow().is_empty());
        assert!(runner.calls.borrow().is_empty());
        assert_eq!(outcome.executable, installer::planned_bundle_cli(&ctx));
        assert!(outcome.executable.contains("0.210.0"));
        assert_eq!(outcome.args, vec!["deploy", "-e", "dev", "--force-lock"]);
    }

    #[test]
    fn run_with_cli_uses_exec_override() {
        let ctx = context(vec![(EnvVar::BundleCliExec, "/opt/databricks")]);
        let runner = RecordingRunner::default();
        let source = FakeSource::default();

        let outcome = run_with_cli(
            &ctx,
            &runner,
            &source,
            BundleCommand::Destroy,
            &BundleOptions::default(),
        )
        .unwrap();

        assert!(!outcome.skipped);
        assert!(source.fetched.borrow().is_empty());
        assert_eq!(runner.calls.borrow()[0].program, "/opt/databricks");
    }

    #[test]
    fn settings_are_exported_to_child() {
        let mut ctx = context(vec![]);
        crate::settings::handle_libraries(&mut ctx.settings, true);
        let runner = RecordingRunner::default();

        bundle_destroy(&ctx, &runner, "databricks", &BundleOptions::default()).unwrap();

        assert!(runner.calls.borrow()[0].envs.contains(&(
            "BRICKFLOW_AUTO_ADD_LIBRARIES".to_string(),
            "false".to_string()
        )));
    }

    #[test]
    fn child_failure_surfaces() {
        let ctx = context(vec![]);
        let runner = RecordingRunner::failing(1);

        let err = bundle_deploy(&ctx, &runner, "databricks", &BundleOptions::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::CliCommandFailed);
    }
}
