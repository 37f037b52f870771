use clap::{Args, Subcommand};

use brickflow::bundle::{BundleCommand, BundleOutcome};
use brickflow::settings;
use brickflow::CommandContext;

use super::bundle::{self, CommonBundleArgs};
use super::CmdResult;

#[derive(Args)]
pub struct ProjectsArgs {
    #[command(subcommand)]
    pub command: ProjectsCommand,
}

#[derive(Subcommand)]
pub enum ProjectsCommand {
    /// Deploy a brickflow project
    Deploy(ProjectDeployArgs),
    /// Destroy a deployed brickflow project
    Destroy(ProjectDestroyArgs),
}

/// Project selection flags shared by `deploy` and `destroy`.
#[derive(Args, Debug, Clone, Default)]
pub struct ProjectSelection {
    /// Project to act on (exported as BRICKFLOW_PROJECT_NAME)
    #[arg(short = 'p', long = "project")]
    pub project: Option<String>,

    /// Do not add the project's libraries to its tasks
    #[arg(long)]
    pub skip_libraries: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ProjectDeployArgs {
    #[command(flatten)]
    pub selection: ProjectSelection,

    #[command(flatten)]
    pub common: CommonBundleArgs,

    /// Abort if jobs or pipelines from this project are running
    #[arg(long)]
    pub fail_on_active_runs: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ProjectDestroyArgs {
    #[command(flatten)]
    pub selection: ProjectSelection,

    #[command(flatten)]
    pub common: CommonBundleArgs,
}

pub fn run(args: ProjectsArgs, ctx: &mut CommandContext) -> CmdResult<BundleOutcome> {
    let (command, selection, common, fail_on_active_runs) = match args.command {
        ProjectsCommand::Deploy(a) => (
            BundleCommand::Deploy,
            a.selection,
            a.common,
            a.fail_on_active_runs,
        ),
        ProjectsCommand::Destroy(a) => (BundleCommand::Destroy, a.selection, a.common, false),
    };

    apply_selection(ctx, &selection);
    bundle::execute(ctx, command, common, fail_on_active_runs)
}

fn apply_selection(ctx: &mut CommandContext, selection: &ProjectSelection) {
    if let Some(project) = &selection.project {
        ctx.settings.project_name = Some(project.clone());
    }
    settings::handle_libraries(&mut ctx.settings, selection.skip_libraries);
}

#[cfg(test)]
mod tests {
    use super::*;
    use brickflow::defaults::Defaults;
    use brickflow::env::{EnvSnapshot, EnvVar};

    #[test]
    fn selection_sets_project_and_libraries() {
        let mut ctx = CommandContext::new(
            EnvSnapshot::from_pairs([(EnvVar::AutoAddLibraries, "false")]),
            Defaults::default(),
            ".",
        );
        let selection = ProjectSelection {
            project: Some("sales".to_string()),
            skip_libraries: false,
        };

        apply_selection(&mut ctx, &selection);

        assert_eq!(ctx.settings.project_name.as_deref(), Some("sales"));
        assert_eq!(ctx.settings.auto_add_libraries, Some(true));
    }

    #[test]
    fn skip_libraries_disables_auto_add() {
        let mut ctx = CommandContext::new(EnvSnapshot::default(), Defaults::default(), ".");
        apply_selection(
            &mut ctx,
            &ProjectSelection {
                project: None,
                skip_libraries: true,
            },
        );
        assert_eq!(ctx.settings.auto_add_libraries, Some(false));
        assert_eq!(ctx.settings.project_name, None);
    }
}
