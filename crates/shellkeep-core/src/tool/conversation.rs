//! The tool loop: model reply → `<TOOL>` commands → shell → feedback → model.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::feedback::build_feedback;
use super::tags::extract_tool_commands;
use crate::config::AgentConfig;
use crate::error::Result;
use crate::path::to_posix_drive_paths;
use crate::session::{CommandResult, ShellSession};

/// A chat model that keeps its own conversation history.
pub trait ChatModel {
    /// Send `message` as the next user turn and return the full reply.
    fn send(&mut self, message: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Outcome of driving one user message to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnSummary {
    /// Model round-trips made.
    pub rounds: u32,
    /// Shell commands executed across all rounds.
    pub commands_run: usize,
    /// The model's final reply.
    pub last_response: String,
    /// True when the loop stopped at `max_rounds` rather than on its own.
    pub hit_round_limit: bool,
}

/// Drives the exchange between a [`ChatModel`] and a [`ShellSession`].
#[derive(Debug, Clone)]
pub struct Conversation {
    max_rounds: u32,
    command_timeout: Option<Duration>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

impl Conversation {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            max_rounds: config.max_rounds.max(1),
            command_timeout: config.command_timeout_secs.map(Duration::from_secs),
        }
    }

    #[must_use]
    pub const fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = if max_rounds == 0 { 1 } else { max_rounds };
        self
    }

    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Send `user_message` and keep executing the model's `<TOOL>` blocks,
    /// feeding results back, until the model stops asking for commands or
    /// every command in a round was silent.
    ///
    /// Session errors (timeout, dead shell) end the turn; retrying is left to
    /// the caller.
    pub async fn drive<M: ChatModel>(
        &self,
        model: &mut M,
        session: &mut ShellSession,
        user_message: &str,
    ) -> Result<TurnSummary> {
        let mut message = to_posix_drive_paths(user_message);
        let mut summary = TurnSummary {
            rounds: 0,
            commands_run: 0,
            last_response: String::new(),
            hit_round_limit: false,
        };

        loop {
            if summary.rounds >= self.max_rounds {
                warn!(max_rounds = self.max_rounds, "Tool loop hit round limit");
                summary.hit_round_limit = true;
                break;
            }

            let response = model.send(&message).await?;
            summary.rounds += 1;

            let commands = extract_tool_commands(&response);
            summary.last_response = response;
            if commands.is_empty() {
                debug!(rounds = summary.rounds, "Model requested no commands");
                break;
            }

            let mut results: Vec<CommandResult> = Vec::with_capacity(commands.len());
            for command in &commands {
                let result = session.run(command, self.command_timeout).await?;
                debug!(exit_code = result.exit_code, "Tool command finished");
                results.push(result);
                summary.commands_run += 1;
            }

            match build_feedback(results.iter().enumerate().map(|(i, r)| (i + 1, r))) {
                Some(feedback) => message = feedback,
                None => {
                    debug!("All tool results silent, ending turn");
                    break;
                }
            }
        }

        info!(
            rounds = summary.rounds,
            commands = summary.commands_run,
            "Turn complete"
        );
        Ok(summary)
    }
}
