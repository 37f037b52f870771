//! Process output helpers with consistent formatting.

use serde::Serialize;

/// Extract error text from captured streams.
///
/// Prefers stderr, falls back to stdout if stderr is empty.
pub fn error_text(stdout: &str, stderr: &str) -> String {
    if !stderr.trim().is_empty() {
        stderr.trim().to_string()
    } else {
        stdout.trim().to_string()
    }
}

/// Render a program and its arguments for logs and error messages.
///
/// Arguments containing whitespace are single-quoted.
pub fn display_command(program: &str, args: &[String]) -> String {
    std::iter::once(program.to_string())
        .chain(args.iter().map(|arg| {
            if arg.is_empty() || arg.chars().any(char::is_whitespace) {
                format!("'{}'", arg.replace('\'', r"'\''"))
            } else {
                arg.clone()
            }
        }))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Captured output from command execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CapturedOutput {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

impl CapturedOutput {
    pub fn from_bytes(stdout: &[u8], stderr: &[u8]) -> Self {
        Self {
            stdout: String::from_utf8_lossy(stdout).to_string(),
            stderr: String::from_utf8_lossy(stderr).to_string(),
        }
    }

    pub fn error_text(&self) -> String {
        error_text(&self.stdout, &self.stderr)
    }
}
