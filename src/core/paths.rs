use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;

/// Base brickflow config directory (universal ~/.config/brickflow/ on all platforms)
pub fn brickflow() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected(
                "APPDATA environment variable not set on Windows".to_string(),
            )
        })?;
        Ok(PathBuf::from(appdata).join("brickflow"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("brickflow"))
    }
}

/// Global brickflow.json config file path
pub fn brickflow_json() -> Result<PathBuf> {
    Ok(brickflow()?.join("brickflow.json"))
}

/// Expand `~` and `$VAR` references in a configured path.
pub fn expand(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(path).as_ref()),
    }
}
