//! Per-command delimiters injected around a command's output.
//!
//! A command is framed as `echo "___START_<token>___"`, the command text, then
//! `echo "___END_<token>___:$?"`. A copy of the end marker is also echoed to
//! stderr so the consumer knows when the error drain has caught up.

use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;

use super::types::UNKNOWN_EXIT_CODE;

/// Shell echoes of injected marker commands (verbose mode on shells that
/// ignore `set +v`).
static MARKER_ECHO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"echo.*___(?:START|END|READY)_").expect("static regex is valid")
});

/// Any marker this module generates, whichever command it belonged to.
static ANY_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"___(?:START|END|READY)_\d+_[0-9a-f]{8}___").expect("static regex is valid")
});

/// Start/end markers for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerPair {
    token: String,
    start: String,
    end: String,
}

/// The end marker as found on a stdout line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndMarker<'a> {
    /// Output that preceded the marker on the same line (command output
    /// without a trailing newline).
    pub preceding: &'a str,
    pub exit_code: i32,
}

impl MarkerPair {
    fn from_token(token: String) -> Self {
        Self {
            start: format!("___START_{token}___"),
            end: format!("___END_{token}___"),
            token,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn end(&self) -> &str {
        &self.end
    }

    /// Wrap `command` verbatim between the marker echoes.
    pub fn frame(&self, command: &str) -> String {
        format!(
            "echo \"{start}\"\n{command}\necho \"{end}:$?\"\necho \"{end}\" 1>&2\n",
            start = self.start,
            end = self.end,
        )
    }

    /// Locate the end marker on a stdout line and parse the trailing `:<code>`.
    pub fn parse_end<'a>(&self, line: &'a str) -> Option<EndMarker<'a>> {
        let idx = line.find(&self.end)?;
        let exit_code = line[idx + self.end.len()..]
            .strip_prefix(':')
            .and_then(|code| code.trim().parse().ok())
            .unwrap_or(UNKNOWN_EXIT_CODE);
        Some(EndMarker {
            preceding: &line[..idx],
            exit_code,
        })
    }

    /// Strip protocol noise from a stderr line.
    ///
    /// Returns `None` when the line is entirely marker traffic. Text written
    /// without a trailing newline ends up glued in front of the stderr fence;
    /// that prefix is kept.
    pub fn clean_stderr_line(&self, line: &str) -> Option<String> {
        if MARKER_ECHO_RE.is_match(line) {
            return None;
        }
        if let Some(idx) = line.find(&self.end) {
            let prefix = &line[..idx];
            return (!prefix.is_empty()).then(|| prefix.to_string());
        }
        if line.contains(&self.token) {
            return None;
        }
        // A fence left over from an earlier command that missed its settle window.
        if let Some(stale) = ANY_MARKER_RE.find(line) {
            let prefix = &line[..stale.start()];
            return (!prefix.is_empty()).then(|| prefix.to_string());
        }
        Some(line.to_string())
    }
}

/// Produces markers that never repeat within a session.
///
/// The token is the wall-clock time in microseconds, forced strictly
/// increasing, plus 32 random bits.
#[derive(Debug, Default)]
pub struct MarkerGenerator {
    last_micros: u128,
}

impl MarkerGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_token(&mut self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros())
            .unwrap_or_default();
        let micros = now.max(self.last_micros + 1);
        self.last_micros = micros;
        let salt = uuid::Uuid::new_v4().as_fields().0;
        format!("{micros}_{salt:08x}")
    }

    /// Fresh marker pair for the next command.
    pub fn next_pair(&mut self) -> MarkerPair {
        MarkerPair::from_token(self.next_token())
    }

    /// Standalone marker used to synchronise on shell readiness.
    pub fn next_ready(&mut self) -> String {
        format!("___READY_{}___", self.next_token())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn marker_format() {
        let pair = MarkerPair::from_token("123_abcd".into());
        assert_eq!(pair.start(), "___START_123_abcd___");
        assert_eq!(pair.end(), "___END_123_abcd___");
    }

    #[test]
    fn frame_passes_command_verbatim() {
        let pair = MarkerPair::from_token("1_0".into());
        let framed = pair.frame("echo \"$HOME\" && ls 'a b'");
        assert_eq!(
            framed,
            "echo \"___START_1_0___\"\necho \"$HOME\" && ls 'a b'\necho \"___END_1_0___:$?\"\necho \"___END_1_0___\" 1>&2\n"
        );
    }

    #[test]
    fn parse_end_reads_exit_code() {
        let pair = MarkerPair::from_token("7_f".into());
        let end = pair.parse_end("___END_7_f___:127").unwrap();
        assert_eq!(end.exit_code, 127);
        assert_eq!(end.preceding, "");
    }

    #[test]
    fn parse_end_keeps_unterminated_output() {
        let pair = MarkerPair::from_token("7_f".into());
        let end = pair.parse_end("no newline___END_7_f___:0").unwrap();
        assert_eq!(end.preceding, "no newline");
        assert_eq!(end.exit_code, 0);
    }

    #[test]
    fn parse_end_unknown_code() {
        let pair = MarkerPair::from_token("7_f".into());
        assert_eq!(
            pair.parse_end("___END_7_f___:garbage").unwrap().exit_code,
            UNKNOWN_EXIT_CODE
        );
        assert_eq!(
            pair.parse_end("___END_7_f___").unwrap().exit_code,
            UNKNOWN_EXIT_CODE
        );
        assert!(pair.parse_end("___END_8_f___:0").is_none());
    }

    #[test]
    fn stderr_cleaning() {
        let pair = MarkerPair::from_token("9_a".into());
        assert_eq!(pair.clean_stderr_line("___END_9_a___"), None);
        assert_eq!(pair.clean_stderr_line("echo \"___START_9_a___\""), None);
        assert_eq!(
            pair.clean_stderr_line("partial___END_9_a___").as_deref(),
            Some("partial")
        );
        assert_eq!(
            pair.clean_stderr_line("ls: cannot access 'x'").as_deref(),
            Some("ls: cannot access 'x'")
        );
        // Markers of other commands are still echo noise.
        assert_eq!(pair.clean_stderr_line("+ echo ___END_1_b___:0"), None);
    }

    #[test]
    fn stale_fences_from_earlier_commands_are_dropped() {
        let mut markers = MarkerGenerator::new();
        let earlier = markers.next_pair();
        let current = markers.next_pair();

        assert_eq!(current.clean_stderr_line(earlier.end()), None);
        assert_eq!(
            current
                .clean_stderr_line(&format!("late tail{}", earlier.end()))
                .as_deref(),
            Some("late tail")
        );
        // Marker-like text that is not a generated token is ordinary output.
        assert_eq!(
            current.clean_stderr_line("___END_x___").as_deref(),
            Some("___END_x___")
        );
    }

    #[test]
    fn tokens_never_collide() {
        let mut markers = MarkerGenerator::new();
        let tokens: HashSet<String> = (0..10_000)
            .map(|_| markers.next_pair().token().to_string())
            .collect();
        assert_eq!(tokens.len(), 10_000);
    }

    #[test]
    fn ready_marker_shape() {
        let mut markers = MarkerGenerator::new();
        let ready = markers.next_ready();
        assert!(ready.starts_with("___READY_"));
        assert!(ready.ends_with("___"));
    }
}
