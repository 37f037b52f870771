use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationInvalidArgument,

    CliDownloadFailed,
    CliInstallFailed,
    CliUnsupportedPlatform,

    CliNotFound,
    CliCommandFailed,
    CliCommandTimeout,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::CliDownloadFailed => "cli.download_failed",
            ErrorCode::CliInstallFailed => "cli.install_failed",
            ErrorCode::CliUnsupportedPlatform => "cli.unsupported_platform",

            ErrorCode::CliNotFound => "cli.not_found",
            ErrorCode::CliCommandFailed => "cli.command_failed",
            ErrorCode::CliCommandTimeout => "cli.command_timeout",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidJsonDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalJsonErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadFailedDetails {
    pub url: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub attempts: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallFailedDetails {
    pub version: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFailedDetails {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandTimeoutDetails {
    pub command: String,
    pub timeout_secs: u64,
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.into(),
            id,
            tried,
        });

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            details,
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        let details = to_details(ConfigInvalidJsonDetails {
            path: path.into(),
            error: err.to_string(),
        });

        Self::new(
            ErrorCode::ConfigInvalidJson,
            "Invalid JSON in configuration",
            details,
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let details = to_details(ConfigInvalidValueDetails {
            key: key.into(),
            value,
            problem: problem.into(),
        });

        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            details,
        )
    }

    /// Archive fetch failed. Network errors and 5xx responses are retryable.
    pub fn cli_download_failed(
        url: impl Into<String>,
        error: impl Into<String>,
        status: Option<u16>,
        attempts: u32,
    ) -> Self {
        let retryable = status.is_none_or(|s| s >= 500);
        let mut err = Self::new(
            ErrorCode::CliDownloadFailed,
            "Failed to download Databricks CLI",
            to_details(DownloadFailedDetails {
                url: url.into(),
                error: error.into(),
                status,
                attempts,
            }),
        );
        err.retryable = Some(retryable);
        err
    }

    pub fn cli_install_failed(
        version: impl Into<String>,
        problem: impl Into<String>,
        path: Option<String>,
    ) -> Self {
        let problem = problem.into();
        Self::new(
            ErrorCode::CliInstallFailed,
            format!("Failed to install Databricks CLI: {}", problem),
            to_details(InstallFailedDetails {
                version: version.into(),
                problem,
                path,
            }),
        )
        .with_hint("Remove the .databricks/bin/cli directory and retry")
    }

    pub fn cli_unsupported_platform(os: &str, arch: &str) -> Self {
        Self::new(
            ErrorCode::CliUnsupportedPlatform,
            format!("No Databricks CLI release for {}/{}", os, arch),
            serde_json::json!({ "os": os, "arch": arch }),
        )
        .with_hint("Install the Databricks CLI manually and set BRICKFLOW_BUNDLE_CLI_EXEC")
    }

    pub fn cli_not_found(program: impl Into<String>, error: impl Into<String>) -> Self {
        let program = program.into();
        Self::new(
            ErrorCode::CliNotFound,
            format!("Could not run '{}'", program),
            serde_json::json!({ "program": program, "error": error.into() }),
        )
        .with_hint("Run 'brickflow cli install' or set BRICKFLOW_BUNDLE_CLI_EXEC")
    }

    pub fn cli_command_failed(details: CommandFailedDetails) -> Self {
        let message = format!(
            "'{}' exited with code {}",
            details.command, details.exit_code
        );
        Self::new(ErrorCode::CliCommandFailed, message, to_details(details))
    }

    pub fn cli_command_timeout(command: impl Into<String>, timeout_secs: u64) -> Self {
        let command = command.into();
        Self::new(
            ErrorCode::CliCommandTimeout,
            format!("'{}' timed out after {}s", command, timeout_secs),
            to_details(CommandTimeoutDetails {
                command,
                timeout_secs,
            }),
        )
        .with_hint("Raise the limit with BRICKFLOW_BUNDLE_CLI_TIMEOUT")
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalIoErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalJsonErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_failure_without_status_is_retryable() {
        let err = Error::cli_download_failed("https://example.com/a.zip", "timed out", None, 1);
        assert_eq!(err.code, ErrorCode::CliDownloadFailed);
        assert_eq!(err.retryable, Some(true));
    }

    #[test]
    fn download_failure_with_client_error_is_not_retryable() {
        let err = Error::cli_download_failed("https://example.com/a.zip", "not found", Some(404), 1);
        assert_eq!(err.retryable, Some(false));
        assert_eq!(err.details["status"], 404);
    }

    #[test]
    fn command_failed_message_includes_exit_code() {
        let err = Error::cli_command_failed(CommandFailedDetails {
            command: "databricks bundle deploy".to_string(),
            exit_code: 3,
            stdout: String::new(),
            stderr: "lock held".to_string(),
        });
        assert_eq!(err.message, "'databricks bundle deploy' exited with code 3");
        assert_eq!(err.details["exitCode"], 3);
        assert_eq!(err.details["stderr"], "lock held");
    }

    #[test]
    fn install_failed_carries_hint() {
        let err = Error::cli_install_failed("0.200.0", "archive is empty", None);
        assert_eq!(err.code.as_str(), "cli.install_failed");
        assert_eq!(err.hints.len(), 1);
    }
}
