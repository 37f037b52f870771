use std::io::{self, Write};

use brickflow::defaults::Defaults;
use brickflow::docs::{self, DocsOutcome};
use brickflow::{CommandContext, Error};

use super::CmdResult;

/// Announce on stdout, then open the documentation site in the default browser.
pub fn run(ctx: &CommandContext) -> CmdResult<DocsOutcome> {
    announce_and_open(&mut io::stdout(), &ctx.defaults, docs::system_browser)
}

fn announce_and_open<W, F>(out: &mut W, defaults: &Defaults, open: F) -> CmdResult<DocsOutcome>
where
    W: Write,
    F: FnOnce(&str) -> io::Result<()>,
{
    writeln!(out, "{}", docs::OPENING_MESSAGE)
        .and_then(|_| out.flush())
        .map_err(|e| Error::internal_io(e.to_string(), Some("write stdout".to_string())))?;
    let outcome = docs::open_docs(defaults, open)?;
    Ok((outcome, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_message_and_opens_docs() {
        let mut out = Vec::new();
        let mut opened = false;

        let (outcome, exit_code) = announce_and_open(&mut out, &Defaults::default(), |_| {
            opened = true;
            Ok(())
        })
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Opening browser for docs..."));
        assert!(opened);
        assert_eq!(exit_code, 0);
        assert_eq!(outcome.url, "https://engineering.nike.com/brickflow/");
    }

    #[test]
    fn browser_failure_is_an_error() {
        let mut out = Vec::new();
        let result = announce_and_open(&mut out, &Defaults::default(), |_| {
            Err(io::Error::new(io::ErrorKind::NotFound, "no browser"))
        });

        assert!(result.is_err());
        assert!(String::from_utf8(out).unwrap().starts_with("Opening browser for docs..."));
    }
}
