//! Lossy line reader over a child pipe.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Reads newline-terminated lines, decoding invalid UTF-8 lossily.
///
/// Bytes of an unfinished line stay buffered across calls, so a
/// `next_line` future dropped by a timeout loses nothing.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: BufReader<R>,
    pending: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            pending: Vec::new(),
        }
    }

    /// Next line without its terminator, or `None` at end of stream.
    ///
    /// A final line without a newline is returned as-is at EOF.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let read = self.inner.read_until(b'\n', &mut self.pending).await?;
        if read == 0 && self.pending.is_empty() {
            return Ok(None);
        }
        let mut bytes = std::mem::take(&mut self.pending);
        if bytes.last() == Some(&b'\n') {
            bytes.pop();
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }
}
