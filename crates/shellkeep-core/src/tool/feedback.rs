//! Formatting of command results as tool responses for the model.

use crate::session::CommandResult;

/// Format one result as `<TOOL RES i ERROR_CODE=n>stdout\n--error_msg--\nstderr\n</TOOL RES>`.
///
/// `ERROR_CODE` only appears for non-zero exit codes and the error section
/// only when stderr has text. Silent results yield `None`.
pub fn format_tool_response(index: usize, result: &CommandResult) -> Option<String> {
    if result.is_silent() {
        return None;
    }
    let code = if result.success() {
        String::new()
    } else {
        format!(" ERROR_CODE={}", result.exit_code)
    };
    let error = if result.stderr.is_empty() {
        String::new()
    } else {
        format!("--error_msg--\n{}\n", result.stderr)
    };
    Some(format!(
        "<TOOL RES {index}{code}>{}\n{error}</TOOL RES>",
        result.stdout
    ))
}

/// Join the responses for a batch of `(index, result)` pairs.
///
/// `None` when every result was silent, meaning there is nothing to send back.
pub fn build_feedback<'a, I>(results: I) -> Option<String>
where
    I: IntoIterator<Item = (usize, &'a CommandResult)>,
{
    let responses: Vec<String> = results
        .into_iter()
        .filter_map(|(index, result)| format_tool_response(index, result))
        .collect();
    (!responses.is_empty()).then(|| responses.join("\n"))
}
