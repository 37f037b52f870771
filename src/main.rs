use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{Parser, Subcommand};

use brickflow::CommandContext;

#[derive(Debug, Clone, Copy)]
enum ResponseMode {
    Json,
    Raw,
}

mod commands;
mod output;
mod tty;

use commands::{bundle, cli, projects};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const BIN_NAME: &str = "brickflow";

/// Exit code for usage errors, matching click.
const USAGE_EXIT_CODE: u8 = 2;

#[derive(Parser)]
#[command(name = BIN_NAME)]
#[command(version = VERSION)]
#[command(about = "Deploy brickflow projects with the Databricks CLI bundle commands")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the brickflow documentation in a browser
    Docs,
    /// Install and inspect the pinned Databricks CLI
    Cli(cli::CliArgs),
    /// Run Databricks bundle commands
    Bundle(bundle::BundleArgs),
    /// Deploy or destroy brickflow projects
    #[command(visible_alias = "project")]
    Projects(projects::ProjectsArgs),
}

fn response_mode(command: &Commands) -> ResponseMode {
    match command {
        Commands::Docs => ResponseMode::Raw,
        _ => ResponseMode::Json,
    }
}

/// Click-style rendering of an unknown command, at whatever depth it occurred.
///
/// `args` is the full argument vector, used to rebuild the command path
/// (`brickflow bundle`) that precedes the unknown name.
fn unknown_command_message(err: &clap::Error, args: &[String]) -> Option<String> {
    if err.kind() != ErrorKind::InvalidSubcommand {
        return None;
    }
    let name = match err.get(ContextKind::InvalidSubcommand)? {
        ContextValue::String(name) => name.clone(),
        _ => return None,
    };

    let path = std::iter::once(BIN_NAME)
        .chain(
            args.iter()
                .skip(1)
                .take_while(|arg| **arg != name)
                .filter(|arg| !arg.starts_with('-'))
                .map(String::as_str),
        )
        .collect::<Vec<_>>()
        .join(" ");

    Some(format!(
        "Usage: {path} [OPTIONS] COMMAND [ARGS]...\nTry '{path} --help' for help.\n\nError: No such command '{name}'.",
        path = path,
        name = name
    ))
}

fn main() -> std::process::ExitCode {
    let args: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(e) => {
            if let Some(message) = unknown_command_message(&e, &args) {
                eprintln!("{}", message);
                return std::process::ExitCode::from(USAGE_EXIT_CODE);
            }
            e.exit();
        }
    };

    let mut ctx = CommandContext::from_process();
    let mode = response_mode(&cli.command);
    let (json_result, exit_code) = commands::run_json(cli.command, &mut ctx);

    match (mode, json_result) {
        (ResponseMode::Json, result) => {
            let _ = output::print_json_result(result);
        }
        // Raw commands write their own output; only failures get the envelope
        (ResponseMode::Raw, Ok(_)) => {}
        (ResponseMode::Raw, Err(err)) => {
            let _ = output::print_result::<serde_json::Value>(Err(err));
        }
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
