//! `shellkeep exec`: run commands in order in one session.

use std::io::Write;
use std::time::Duration;

use tracing::info;

use shellkeep_core::ShellSession;

use crate::output::write_result;

/// Run each command, printing results as they finish. Returns the last
/// command's exit code, or 0 when `commands` is empty.
///
/// Stops early when the shell exits (e.g. the command was `exit 3`).
pub async fn run<O: Write, E: Write>(
    session: &mut ShellSession,
    commands: &[String],
    timeout: Option<Duration>,
    json: bool,
    out: &mut O,
    err: &mut E,
) -> anyhow::Result<i32> {
    let mut last_code = 0;
    for (index, command) in commands.iter().enumerate() {
        let result = session.run(command, timeout).await?;
        write_result(out, err, &result, json)?;
        last_code = result.exit_code;

        if !session.is_alive() && index + 1 < commands.len() {
            info!(
                skipped = commands.len() - index - 1,
                "Shell exited before all commands ran"
            );
            break;
        }
    }
    out.flush()?;
    Ok(last_code)
}
