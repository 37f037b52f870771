use serde::Serialize;

use crate::defaults::Defaults;
use crate::error::{Error, Result};

pub const OPENING_MESSAGE: &str = "Opening browser for docs...";

#[derive(Debug, Clone, Serialize)]
pub struct DocsOutcome {
    pub url: String,
}

/// Open the documentation site with `open`, the browser launcher.
pub fn open_docs<F>(defaults: &Defaults, open: F) -> Result<DocsOutcome>
where
    F: FnOnce(&str) -> std::io::Result<()>,
{
    let url = defaults.docs_url.clone();
    open(&url).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("open browser at {}", url)))
            .with_hint(format!("Visit {} manually", url))
    })?;
    Ok(DocsOutcome { url })
}

/// Launch the system default browser.
pub fn system_browser(url: &str) -> std::io::Result<()> {
    webbrowser::open(url)
}
