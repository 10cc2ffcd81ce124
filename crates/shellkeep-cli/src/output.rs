//! Printing command results.
//!
//! User-facing output uses writeln! (this is a CLI binary, not debug output).

use std::io::{self, Write};

use shellkeep_core::CommandResult;

/// Write `result` as text: stdout to `out`, stderr and a non-zero exit
/// status to `err`. With `json` the whole result goes to `out` as one line.
pub fn write_result<O: Write, E: Write>(
    out: &mut O,
    err: &mut E,
    result: &CommandResult,
    json: bool,
) -> io::Result<()> {
    if json {
        let line = serde_json::to_string(result).map_err(io::Error::other)?;
        return writeln!(out, "{line}");
    }
    if !result.stdout.is_empty() {
        writeln!(out, "{}", result.stdout)?;
    }
    if !result.stderr.is_empty() {
        writeln!(err, "{}", result.stderr)?;
    }
    if !result.success() {
        writeln!(err, "[exit {}]", result.exit_code)?;
    }
    Ok(())
}

/// Map a shell status onto a process exit code. Out-of-range and unknown
/// statuses become 1.
pub fn exit_status_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
