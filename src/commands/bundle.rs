use clap::{Args, Subcommand};

use brickflow::bundle::{self, BundleCommand, BundleOptions, BundleOutcome};
use brickflow::executor::SystemRunner;
use brickflow::installer::HttpArchiveSource;
use brickflow::CommandContext;

use super::CmdResult;

#[derive(Args)]
pub struct BundleArgs {
    #[command(subcommand)]
    pub command: BundleSubcommand,
}

#[derive(Subcommand)]
pub enum BundleSubcommand {
    /// Deploy the project's workflows as a Databricks bundle
    Deploy(DeployArgs),
    /// Tear down a previously deployed bundle
    Destroy(DestroyArgs),
}

/// Flags shared by `deploy` and `destroy`.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonBundleArgs {
    /// Target bundle environment (defaults to BRICKFLOW_ENV, then "local")
    #[arg(short = 'e', long = "env")]
    pub env: Option<String>,

    /// Take the deployment lock even if another deployment holds it
    #[arg(long)]
    pub force_acquire_lock: bool,

    /// Directory containing the workflow definitions
    #[arg(long)]
    pub workflows_dir: Option<String>,

    /// Pass --debug through to the Databricks CLI
    #[arg(long)]
    pub debug: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DeployArgs {
    #[command(flatten)]
    pub common: CommonBundleArgs,

    /// Abort if jobs or pipelines from this bundle are running
    #[arg(long)]
    pub fail_on_active_runs: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DestroyArgs {
    #[command(flatten)]
    pub common: CommonBundleArgs,
}

impl BundleSubcommand {
    pub(crate) fn split(self) -> (BundleCommand, CommonBundleArgs, bool) {
        match self {
            BundleSubcommand::Deploy(args) => {
                (BundleCommand::Deploy, args.common, args.fail_on_active_runs)
            }
            BundleSubcommand::Destroy(args) => (BundleCommand::Destroy, args.common, false),
        }
    }
}

pub fn run(args: BundleArgs, ctx: &mut CommandContext) -> CmdResult<BundleOutcome> {
    let (command, common, fail_on_active_runs) = args.command.split();
    execute(ctx, command, common, fail_on_active_runs)
}

/// Apply the shared flags to `ctx`, resolve the CLI and run the bundle command.
pub(crate) fn execute(
    ctx: &mut CommandContext,
    command: BundleCommand,
    common: CommonBundleArgs,
    fail_on_active_runs: bool,
) -> CmdResult<BundleOutcome> {
    if let Some(env) = common.env {
        ctx.settings.env = Some(env);
    }

    let options = BundleOptions {
        force_acquire_lock: common.force_acquire_lock,
        workflows_dir: common.workflows_dir,
        debug: common.debug,
        fail_on_active_runs,
    };

    let runner = SystemRunner::from_config(&ctx.env, &ctx.defaults)?;
    let source = HttpArchiveSource::new(ctx.defaults.bundle_cli.download_timeout())?;
    let outcome = bundle::run_with_cli(ctx, &runner, &source, command, &options)?;
    Ok((outcome, 0))
}
