use brickflow::CommandContext;

pub type CmdResult<T> = brickflow::Result<(T, i32)>;

pub mod bundle;
pub mod cli;
pub mod docs;
pub mod projects;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $ctx:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $ctx))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    ctx: &mut CommandContext,
) -> (brickflow::Result<serde_json::Value>, i32) {
    crate::tty::status("brickflow is working...");

    match command {
        crate::Commands::Cli(args) => dispatch!(args, ctx, cli),
        crate::Commands::Bundle(args) => dispatch!(args, ctx, bundle),
        crate::Commands::Projects(args) => dispatch!(args, ctx, projects),
        crate::Commands::Docs => crate::output::map_cmd_result_to_json(docs::run(ctx)),
    }
}
