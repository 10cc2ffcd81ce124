//! Error types for the shellkeep core library.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the shellkeep [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for shellkeep operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The shell could not be located, spawned, or initialised.
    #[error("Failed to start shell session: {reason}")]
    SessionStart { reason: String },

    /// The shell process has already exited (or the session was closed).
    #[error("Shell session is no longer running")]
    SessionDead,

    /// Writing a command to the shell's stdin failed.
    #[error("Failed to write to shell stdin: {0}")]
    Write(#[source] std::io::Error),

    /// No end marker was observed before the deadline.
    #[error("Command timed out after {timeout:?}: {command}")]
    CommandTimeout { command: String, timeout: Duration },

    /// A previous command timed out and the session was not resynchronised.
    #[error("Shell session is desynchronized after a timeout; call resync() or start a new session")]
    Desynchronized,

    /// The chat model failed to produce a reply.
    #[error("Chat model request failed: {0}")]
    Model(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the session that produced this error can still accept commands.
    ///
    /// Timeouts leave the process running but out of step; callers must
    /// resynchronise or discard before reuse, so they count as unusable here.
    pub const fn session_usable(&self) -> bool {
        !matches!(
            self,
            Self::SessionStart { .. }
                | Self::SessionDead
                | Self::Write(_)
                | Self::CommandTimeout { .. }
                | Self::Desynchronized
        )
    }
}
