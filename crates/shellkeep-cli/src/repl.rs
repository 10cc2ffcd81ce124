//! Interactive line-by-line front end over one shell session.
//!
//! Every input line is one command. Lines starting with `:` are meta
//! commands handled here instead of by the shell.

use std::io::Write;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use shellkeep_core::{Error, ShellSession};

use crate::output::write_result;

/// One parsed line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput {
    Empty,
    /// `:alive`: report whether the shell is still running.
    Alive,
    /// `:resync`: recover after a timed-out command.
    Resync,
    /// `:quit` or `:q`.
    Quit,
    /// A `:` line that is not a known meta command.
    UnknownMeta(String),
    Command(String),
}

impl ReplInput {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        match trimmed {
            ":alive" => Self::Alive,
            ":resync" => Self::Resync,
            ":quit" | ":q" => Self::Quit,
            meta if meta.starts_with(':') => Self::UnknownMeta(meta.to_string()),
            _ => Self::Command(line.trim_end().to_string()),
        }
    }
}

/// REPL settings.
#[derive(Debug, Clone)]
pub struct ReplConfig {
    /// Print results as JSON lines.
    pub json: bool,
    /// Budget for `:resync`.
    pub resync_timeout: Duration,
}

/// Read commands from `input` until EOF, `:quit`, or the shell exits.
///
/// Timeouts are reported and leave the session waiting for `:resync`; a dead
/// shell ends the loop.
pub async fn run<R, O, E>(
    session: &mut ShellSession,
    input: R,
    out: &mut O,
    err: &mut E,
    config: &ReplConfig,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    O: Write,
    E: Write,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        match ReplInput::parse(&line) {
            ReplInput::Empty => {}
            ReplInput::Quit => break,
            ReplInput::Alive => {
                writeln!(out, "{}", if session.is_alive() { "alive" } else { "dead" })?;
            }
            ReplInput::Resync => match session.resync(config.resync_timeout).await {
                Ok(()) => writeln!(err, "[resynchronized]")?,
                Err(e) => writeln!(err, "[resync failed: {e}]")?,
            },
            ReplInput::UnknownMeta(meta) => {
                writeln!(err, "[unknown command {meta}; try :alive, :resync or :quit]")?;
            }
            ReplInput::Command(command) => match session.run(&command, None).await {
                Ok(result) => write_result(out, err, &result, config.json)?,
                Err(Error::SessionDead) => {
                    writeln!(err, "[shell has exited]")?;
                    break;
                }
                Err(e @ Error::CommandTimeout { .. }) => {
                    warn!(%command, "Command timed out");
                    writeln!(err, "[{e}; run :resync to continue]")?;
                }
                Err(Error::Desynchronized) => {
                    writeln!(err, "[session is out of sync; run :resync first]")?;
                }
                Err(e) => return Err(e.into()),
            },
        }
        out.flush()?;

        if !session.is_alive() {
            debug!("Shell exited, leaving REPL");
            break;
        }
    }
    Ok(())
}
