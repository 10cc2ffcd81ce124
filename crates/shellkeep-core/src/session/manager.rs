//! Persistent shell session.
//!
//! Owns one long-lived shell process and runs commands in it one at a time.
//! Shell state (cwd, variables, exports) carries over between commands.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::{Instant, error::Elapsed, timeout, timeout_at};
use tracing::{debug, info, trace, warn};

use super::drain::ErrorDrain;
use super::marker::{MarkerGenerator, MarkerPair};
use super::reader::LineReader;
use super::types::{CommandResult, SessionOptions, UNKNOWN_EXIT_CODE};
use crate::error::{Error, Result};

/// Default Git Bash location on Windows.
#[cfg(windows)]
const GIT_BASH_PATH: &str = r"C:\Program Files\Git\bin\bash.exe";

/// A live shell process with its pipes and stderr drain.
#[derive(Debug)]
struct ShellProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: LineReader<ChildStdout>,
    errors: ErrorDrain,
}

/// What the stdout read loop saw for one command.
#[derive(Debug)]
struct FramedOutput {
    lines: Vec<String>,
    /// `None` when stdout closed before the end marker.
    exit_code: Option<i32>,
}

impl ShellProcess {
    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn write(&mut self, payload: &[u8]) -> std::io::Result<()> {
        self.stdin.write_all(payload).await?;
        self.stdin.flush().await
    }

    /// Read stdout until a line containing `marker`. `Ok(false)` on EOF.
    async fn wait_for_marker(
        &mut self,
        marker: &str,
        deadline: Instant,
    ) -> std::result::Result<bool, Elapsed> {
        loop {
            match timeout_at(deadline, self.stdout.next_line()).await? {
                Ok(Some(line)) if line.contains(marker) => return Ok(true),
                Ok(Some(line)) => trace!(line = %line, "Discarding output while synchronising"),
                Ok(None) => return Ok(false),
                Err(e) => {
                    debug!(error = %e, "stdout read failed while synchronising");
                    return Ok(false);
                }
            }
        }
    }

    async fn read_framed(
        &mut self,
        markers: &MarkerPair,
        deadline: Instant,
    ) -> std::result::Result<FramedOutput, Elapsed> {
        let mut seen_start = false;
        let mut lines = Vec::new();
        loop {
            let line = match timeout_at(deadline, self.stdout.next_line()).await? {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("stdout closed before end marker");
                    return Ok(FramedOutput {
                        lines,
                        exit_code: None,
                    });
                }
                Err(e) => {
                    warn!(error = %e, "stdout read failed, returning partial output");
                    return Ok(FramedOutput {
                        lines,
                        exit_code: None,
                    });
                }
            };

            if !seen_start {
                if line.contains(markers.start()) {
                    seen_start = true;
                } else {
                    trace!(line = %line, "Discarding stale output before start marker");
                }
                continue;
            }

            if let Some(end) = markers.parse_end(&line) {
                if !end.preceding.is_empty() {
                    lines.push(end.preceding.to_string());
                }
                return Ok(FramedOutput {
                    lines,
                    exit_code: Some(end.exit_code),
                });
            }
            lines.push(line);
        }
    }

    /// Exit status of a process that has closed its stdout, if it exits in time.
    async fn exit_status_within(&mut self, wait: Duration) -> Option<i32> {
        match timeout(wait, self.child.wait()).await {
            Ok(Ok(status)) => status.code(),
            Ok(Err(e)) => {
                debug!(error = %e, "Failed to reap shell");
                None
            }
            Err(_) => None,
        }
    }

    fn terminate(&mut self) {
        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                // SAFETY: pid is a valid process ID obtained from our own Child handle.
                // kill(2) with SIGTERM is safe to call on any owned subprocess.
                #[allow(unsafe_code)]
                #[allow(clippy::cast_possible_wrap)]
                let ret = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
                if ret != 0 {
                    let err = std::io::Error::last_os_error();
                    warn!(pid, error = %err, "Failed to send SIGTERM");
                }
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = self.child.start_kill() {
                warn!(error = %e, "Failed to terminate shell");
            }
        }
    }

    /// Exit sequence: `exit`, then SIGTERM, then kill. Never fails.
    async fn shutdown(mut self, exit_grace: Duration, terminate_grace: Duration) {
        if self.is_running() {
            if let Err(e) = self.write(b"exit\n").await {
                debug!(error = %e, "Failed to write exit command");
            }
            match timeout(exit_grace, self.child.wait()).await {
                Ok(Ok(status)) => info!(?status, "Shell exited"),
                _ => {
                    warn!("Shell did not exit in time, sending SIGTERM");
                    self.terminate();
                    match timeout(terminate_grace, self.child.wait()).await {
                        Ok(Ok(status)) => info!(?status, "Shell terminated"),
                        _ => {
                            warn!("Shell ignored SIGTERM, killing");
                            if let Err(e) = self.child.kill().await {
                                warn!(error = %e, "Failed to kill shell");
                            }
                        }
                    }
                }
            }
        }
        self.errors.stop();
        // stdin, stdout and the drain's stderr handle close on drop.
    }
}

/// A persistent shell session.
///
/// Commands run strictly one after another; `run` takes `&mut self`, so a
/// session cannot have two commands in flight. The process is killed if the
/// session is dropped without [`close`](Self::close).
#[derive(Debug)]
pub struct ShellSession {
    options: SessionOptions,
    shell: PathBuf,
    process: Option<ShellProcess>,
    markers: MarkerGenerator,
    desynchronized: bool,
}

impl ShellSession {
    /// Spawn the shell, start the stderr drain and run the init sequence.
    pub async fn start(options: SessionOptions) -> Result<Self> {
        let shell = resolve_shell(options.shell.as_deref())?;

        info!(
            shell = %shell.display(),
            working_dir = %options.working_directory.display(),
            "Spawning shell session"
        );
        let child = Command::new(&shell)
            .arg("--login")
            .current_dir(&options.working_directory)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::SessionStart {
                reason: format!("failed to spawn {}: {e}", shell.display()),
            })?;

        let mut session = Self::attach(options, shell, child)?;
        session.initialize().await?;
        Ok(session)
    }

    /// Take the child's pipes and start the stderr drain.
    fn attach(options: SessionOptions, shell: PathBuf, mut child: Child) -> Result<Self> {
        let stdin = child.stdin.take().ok_or_else(|| Error::SessionStart {
            reason: "Failed to capture stdin".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| Error::SessionStart {
            reason: "Failed to capture stdout".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| Error::SessionStart {
            reason: "Failed to capture stderr".to_string(),
        })?;

        // The drain must be running before the shell produces any stderr.
        let errors = ErrorDrain::spawn(stderr);

        Ok(Self {
            options,
            shell,
            process: Some(ShellProcess {
                child,
                stdin,
                stdout: LineReader::new(stdout),
                errors,
            }),
            markers: MarkerGenerator::new(),
            desynchronized: false,
        })
    }

    async fn initialize(&mut self) -> Result<()> {
        let ready = self.markers.next_ready();
        let payload = format!(
            "{}echo \"{ready}\"\necho \"{ready}\" 1>&2\n",
            init_script(&self.options)
        );
        let startup_timeout = self.options.startup_timeout;
        let settle = self.options.stderr_settle;
        let process = self.process.as_mut().ok_or(Error::SessionDead)?;

        process
            .write(payload.as_bytes())
            .await
            .map_err(|e| Error::SessionStart {
                reason: format!("failed to write init commands: {e}"),
            })?;

        match process
            .wait_for_marker(&ready, Instant::now() + startup_timeout)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                return Err(Error::SessionStart {
                    reason: "shell exited during initialisation".to_string(),
                });
            }
            Err(_) => {
                return Err(Error::SessionStart {
                    reason: format!("shell not ready within {startup_timeout:?}"),
                });
            }
        }

        let discarded = process.errors.drain_through(&ready, settle).await.len();
        debug!(discarded, "Shell ready, initialisation noise discarded");
        Ok(())
    }

    /// Run `command` verbatim in the shell and wait for its result.
    ///
    /// `timeout` defaults to the session's configured timeout. On
    /// [`Error::CommandTimeout`] the command keeps running in the shell and
    /// its late output is still in the pipes; the session refuses further
    /// commands until [`resync`](Self::resync) succeeds. Discarding the
    /// session is the other option.
    pub async fn run(&mut self, command: &str, timeout: Option<Duration>) -> Result<CommandResult> {
        let timeout = timeout.unwrap_or(self.options.default_timeout);
        let process = self.process.as_mut().ok_or(Error::SessionDead)?;
        if !process.is_running() {
            warn!("Shell process has exited");
            return Err(Error::SessionDead);
        }
        if self.desynchronized {
            return Err(Error::Desynchronized);
        }

        let markers = self.markers.next_pair();
        let started = Instant::now();
        let deadline = started + timeout;
        debug!(token = markers.token(), ?timeout, "Dispatching command");

        process
            .write(markers.frame(command).as_bytes())
            .await
            .map_err(Error::Write)?;

        let Ok(framed) = process.read_framed(&markers, deadline).await else {
            self.desynchronized = true;
            warn!(
                token = markers.token(),
                ?timeout,
                "Command timed out, session desynchronized"
            );
            return Err(Error::CommandTimeout {
                command: command.to_string(),
                timeout,
            });
        };

        let exit_code = match framed.exit_code {
            Some(code) => code,
            None => process
                .exit_status_within(self.options.exit_grace)
                .await
                .unwrap_or(UNKNOWN_EXIT_CODE),
        };

        let stderr_lines: Vec<String> = process
            .errors
            .drain_through(markers.end(), self.options.stderr_settle)
            .await
            .iter()
            .filter_map(|line| markers.clean_stderr_line(line))
            .collect();

        let result = CommandResult {
            stdout: join_output(&framed.lines),
            stderr: join_output(&stderr_lines),
            exit_code,
        };
        debug!(
            token = markers.token(),
            exit_code,
            elapsed_ms = started.elapsed().as_millis(),
            stdout_bytes = result.stdout.len(),
            stderr_bytes = result.stderr.len(),
            "Command completed"
        );
        Ok(result)
    }

    /// Bring a desynchronized session back in step after a timeout.
    ///
    /// Waits for everything the timed-out command still writes, bounded by
    /// `timeout`, and discards it.
    pub async fn resync(&mut self, timeout: Duration) -> Result<()> {
        let process = self.process.as_mut().ok_or(Error::SessionDead)?;
        if !process.is_running() {
            return Err(Error::SessionDead);
        }

        let ready = self.markers.next_ready();
        process
            .write(format!("echo \"{ready}\"\necho \"{ready}\" 1>&2\n").as_bytes())
            .await
            .map_err(Error::Write)?;

        match process.wait_for_marker(&ready, Instant::now() + timeout).await {
            Ok(true) => {}
            Ok(false) => return Err(Error::SessionDead),
            Err(_) => {
                return Err(Error::CommandTimeout {
                    command: "resync".to_string(),
                    timeout,
                });
            }
        }
        let discarded = process
            .errors
            .drain_through(&ready, self.options.stderr_settle)
            .await
            .len();
        info!(discarded, "Session resynchronized");
        self.desynchronized = false;
        Ok(())
    }

    /// Non-blocking liveness probe.
    pub fn is_alive(&mut self) -> bool {
        self.process.as_mut().is_some_and(ShellProcess::is_running)
    }

    /// True after a timeout until [`resync`](Self::resync) succeeds.
    pub const fn is_desynchronized(&self) -> bool {
        self.desynchronized
    }

    /// Shut the shell down. Safe to call more than once.
    pub async fn close(&mut self) {
        let Some(process) = self.process.take() else {
            debug!("Shell session already closed");
            return;
        };
        process
            .shutdown(self.options.exit_grace, self.options.terminate_grace)
            .await;
    }

    /// The resolved shell executable.
    pub fn shell(&self) -> &Path {
        &self.shell
    }

    /// Directory the shell was started in (the shell may have moved since).
    pub fn working_directory(&self) -> &Path {
        &self.options.working_directory
    }

    pub const fn default_timeout(&self) -> Duration {
        self.options.default_timeout
    }
}

/// Locate the shell executable.
///
/// Paths are checked as given, bare names are searched on `PATH`, and with no
/// configured shell the platform default is used (Git Bash on Windows, `bash`
/// elsewhere).
pub fn resolve_shell(configured: Option<&Path>) -> Result<PathBuf> {
    match configured {
        Some(path) if path.is_absolute() || path.components().count() > 1 => {
            if path.is_file() {
                Ok(path.to_path_buf())
            } else {
                Err(Error::SessionStart {
                    reason: format!("shell executable not found: {}", path.display()),
                })
            }
        }
        Some(name) => which::which(name).map_err(|e| Error::SessionStart {
            reason: format!("shell `{}` not found on PATH: {e}", name.display()),
        }),
        None => default_shell(),
    }
}

fn default_shell() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let git_bash = PathBuf::from(GIT_BASH_PATH);
        if git_bash.is_file() {
            return Ok(git_bash);
        }
    }
    which::which("bash").map_err(|e| Error::SessionStart {
        reason: format!("bash not found on PATH: {e}"),
    })
}

/// Commands that silence echo and prompts, pin the locale and enter the
/// working directory.
fn init_script(options: &SessionOptions) -> String {
    let locale = shell_quote(&options.locale);
    let cwd = shell_quote(&options.working_directory.to_string_lossy());
    let lines = [
        "set +v".to_string(),
        "set +x".to_string(),
        "export PS1=\"\"".to_string(),
        "export PS2=\"\"".to_string(),
        "export PS4=\"\"".to_string(),
        format!("export LANG={locale}"),
        format!("export LC_ALL={locale}"),
        format!("cd {cwd}"),
    ];
    let mut script = lines.join("\n");
    script.push('\n');
    script
}

/// Single-quote `value` for POSIX shells.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn join_output(lines: &[String]) -> String {
    lines.join("\n").trim_end_matches('\n').to_string()
}
