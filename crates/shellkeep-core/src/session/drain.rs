//! Background stderr drain.
//!
//! The shell's stderr is read by a dedicated task for the whole process
//! lifetime and pushed into an unbounded queue. Reading it only after stdout
//! framing completes would let a chatty command fill the pipe buffer and
//! stall the shell while the session waits on stdout.

use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::reader::LineReader;

/// Consumer side of the stderr queue plus the task feeding it.
#[derive(Debug)]
pub struct ErrorDrain {
    rx: mpsc::UnboundedReceiver<String>,
    task: JoinHandle<()>,
}

impl ErrorDrain {
    /// Start draining `stderr` on a background task.
    pub fn spawn<R>(stderr: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let mut reader = LineReader::new(stderr);
            loop {
                match reader.next_line().await {
                    Ok(Some(line)) => {
                        trace!(line = %line, "stderr");
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(error = %e, "stderr read failed");
                        break;
                    }
                }
            }
            debug!("stderr drain finished");
        });
        Self { rx, task }
    }

    /// Pop every line queued so far without waiting for more.
    pub fn drain_now(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    /// Collect lines until one containing `fence` arrives, the drain ends, or
    /// `wait` elapses; then take whatever else is already queued.
    pub async fn drain_through(&mut self, fence: &str, wait: Duration) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + wait;
        let mut lines = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(line)) => {
                    let reached = line.contains(fence);
                    lines.push(line);
                    if reached {
                        break;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    debug!(?wait, "stderr fence not seen in time");
                    break;
                }
            }
        }
        lines.extend(self.drain_now());
        lines
    }

    /// Whether the background task has stopped (pipe closed).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the background task.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for ErrorDrain {
    fn drop(&mut self) {
        self.task.abort();
    }
}
