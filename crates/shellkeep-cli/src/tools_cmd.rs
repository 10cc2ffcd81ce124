//! `shellkeep tools`: replay a model reply against a live session.
//!
//! Runs every `<TOOL>` block and produces the feedback message the tool loop
//! would send back to the model.

use std::time::Duration;

use tracing::debug;

use shellkeep_core::tool::{build_feedback, extract_sections};
use shellkeep_core::{CommandResult, ShellSession};

/// What running a reply's tool blocks produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolReplay {
    pub commands: Vec<String>,
    pub results: Vec<CommandResult>,
    /// `None` when every result was silent.
    pub feedback: Option<String>,
}

impl ToolReplay {
    /// Exit code of the last command that ran, 0 if none did.
    pub fn last_exit_code(&self) -> i32 {
        self.results.last().map_or(0, |r| r.exit_code)
    }
}

/// Execute the `<TOOL>` blocks in `reply` in order.
pub async fn replay(
    session: &mut ShellSession,
    reply: &str,
    timeout: Option<Duration>,
) -> anyhow::Result<ToolReplay> {
    let sections = extract_sections(reply);
    if let Some(think) = &sections.think {
        debug!(think = %think, "Reply reasoning");
    }

    let mut results = Vec::with_capacity(sections.tools.len());
    for command in &sections.tools {
        results.push(session.run(command, timeout).await?);
    }
    let feedback = build_feedback(results.iter().enumerate().map(|(i, r)| (i + 1, r)));

    Ok(ToolReplay {
        commands: sections.tools,
        results,
        feedback,
    })
}
