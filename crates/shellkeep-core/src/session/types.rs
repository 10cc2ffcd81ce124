//! Session value types: command results and spawn options.

use std::path::PathBuf;
use std::time::Duration;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// Exit code reported when the end marker could not be parsed or the shell
/// vanished without a status.
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Outcome of a single command run inside a [`ShellSession`](super::ShellSession).
///
/// Serialises with a derived `success` field; it is ignored when reading back.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandResult {
    /// Captured standard output, trailing newlines trimmed.
    pub stdout: String,
    /// Captured standard error with protocol markers removed, trailing newlines trimmed.
    pub stderr: String,
    /// The shell's `$?` after the command, or [`UNKNOWN_EXIT_CODE`].
    pub exit_code: i32,
}

impl CommandResult {
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// True when neither stream produced any text.
    pub fn is_silent(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}

impl Serialize for CommandResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("CommandResult", 4)?;
        state.serialize_field("stdout", &self.stdout)?;
        state.serialize_field("stderr", &self.stderr)?;
        state.serialize_field("exit_code", &self.exit_code)?;
        state.serialize_field("success", &self.success())?;
        state.end()
    }
}

/// Options for spawning a [`ShellSession`](super::ShellSession).
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Shell executable. A bare name is looked up on `PATH`; `None` picks the
    /// platform default.
    pub shell: Option<PathBuf>,
    /// Initial working directory of the shell.
    pub working_directory: PathBuf,
    /// Timeout applied when `run` is called without one.
    pub default_timeout: Duration,
    /// How long the shell may take to echo the ready marker after init.
    pub startup_timeout: Duration,
    /// Value exported as `LANG` and `LC_ALL`.
    pub locale: String,
    /// Wait after writing `exit` before escalating to SIGTERM.
    pub exit_grace: Duration,
    /// Wait after SIGTERM before force-killing.
    pub terminate_grace: Duration,
    /// Upper bound on waiting for the stderr fence once stdout completed.
    pub stderr_settle: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            shell: None,
            working_directory: std::env::current_dir().unwrap_or_default(),
            default_timeout: Duration::from_secs(30),
            startup_timeout: Duration::from_secs(10),
            locale: "C.UTF-8".to_string(),
            exit_grace: Duration::from_secs(2),
            terminate_grace: Duration::from_secs(3),
            stderr_settle: Duration::from_millis(250),
        }
    }
}

impl SessionOptions {
    /// Options rooted at `working_directory`, defaults elsewhere.
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: working_directory.into(),
            ..Default::default()
        }
    }

    /// Set the shell executable.
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = Some(shell.into());
        self
    }

    /// Set the default per-command timeout.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the locale exported into the shell.
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }
}
