//! Prompt-driven channel over a transport link.

use std::time::Duration;

use log::{debug, trace};
use regex::bytes::Regex;

use super::buffer::PatternBuffer;
use crate::error::{ChannelError, Result};
use crate::transport::Link;

/// Interactive channel to a device shell.
///
/// Wraps a [`Link`] and provides sends plus reads that stop once one of a
/// set of patterns matches the tail of the output.
pub struct PtyChannel<L> {
    link: L,

    /// Pattern buffer for accumulating output.
    buffer: PatternBuffer,

    /// Default timeout for each wait.
    timeout: Duration,
}

impl<L: Link> PtyChannel<L> {
    /// Create a channel over an open link.
    pub fn new(link: L, timeout: Duration) -> Self {
        Self {
            link,
            buffer: PatternBuffer::default(),
            timeout,
        }
    }

    /// Send a line of input followed by the link's newline.
    pub async fn send(&mut self, input: &str) -> Result<()> {
        debug!("send: {}", input);
        self.write_line(input).await
    }

    /// Send a line without logging its content (passwords).
    pub async fn send_hidden(&mut self, input: &str) -> Result<()> {
        debug!("send: ********");
        self.write_line(input).await
    }

    async fn write_line(&mut self, input: &str) -> Result<()> {
        let mut line = String::with_capacity(input.len() + 2);
        line.push_str(input);
        line.push_str(self.link.newline());
        self.link.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Read until `pattern` matches the tail of the output.
    pub async fn read_until(&mut self, pattern: &Regex) -> Result<Vec<u8>> {
        let (_, data) = self.expect(&[pattern]).await?;
        Ok(data)
    }

    /// Read until any of `patterns` matches the tail of the output.
    ///
    /// Patterns are checked in order, so put the most specific first.
    /// Returns the index of the matching pattern and everything read up to
    /// the end of the match.
    pub async fn expect(&mut self, patterns: &[&Regex]) -> Result<(usize, Vec<u8>)> {
        let deadline = tokio::time::Instant::now() + self.timeout;

        loop {
            for (idx, pattern) in patterns.iter().enumerate() {
                if let Some(end) = self.buffer.search_tail(pattern) {
                    let mut data = self.buffer.take();
                    let rest = data.split_off(end);
                    if !rest.is_empty() {
                        self.buffer.extend(&rest);
                    }
                    trace!("matched pattern {} after {} bytes", idx, data.len());
                    return Ok((idx, data));
                }
            }

            match tokio::time::timeout_at(deadline, self.link.read_chunk()).await {
                Err(_) => {
                    trace!(
                        "timed out, buffer tail: {:?}",
                        String::from_utf8_lossy(tail(self.buffer.as_slice(), 200))
                    );
                    return Err(ChannelError::PatternTimeout(self.timeout).into());
                }
                Ok(Ok(None)) => return Err(ChannelError::Closed.into()),
                Ok(Ok(Some(chunk))) => self.buffer.extend(&chunk),
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Discard anything buffered so far.
    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
    }

    /// Close the underlying link.
    pub async fn close(self) -> Result<()> {
        self.link.close().await?;
        Ok(())
    }
}

fn tail(data: &[u8], n: usize) -> &[u8] {
    &data[data.len().saturating_sub(n)..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::patterns::{PASSWORD_PROMPT, USERNAME_PROMPT, prompt_pattern};
    use crate::error::Error;
    use crate::transport::TelnetLink;

    const NO_ENDINGS: [&str; 0] = [];

    #[tokio::test]
    async fn test_read_until_prompt_across_chunks() {
        let mock = tokio_test::io::Builder::new()
            .read(b"\r\nrout")
            .read(b"er#")
            .build();
        let mut channel = PtyChannel::new(TelnetLink::new(mock), Duration::from_secs(1));

        let pattern = prompt_pattern(&NO_ENDINGS).unwrap();
        let data = channel.read_until(&pattern).await.unwrap();
        assert_eq!(data, b"\r\nrouter#");
    }

    #[tokio::test]
    async fn test_expect_reports_matching_index() {
        let mock = tokio_test::io::Builder::new()
            .read(b"User Access Verification\r\n\r\nPassword: ")
            .build();
        let mut channel = PtyChannel::new(TelnetLink::new(mock), Duration::from_secs(1));

        let (idx, _) = channel
            .expect(&[&*USERNAME_PROMPT, &*PASSWORD_PROMPT])
            .await
            .unwrap();
        assert_eq!(idx, 1);
    }

    #[tokio::test]
    async fn test_send_appends_newline() {
        let mock = tokio_test::io::Builder::new()
            .write(b"show version\r")
            .build();
        let mut channel = PtyChannel::new(TelnetLink::new(mock), Duration::from_secs(1));
        channel.send("show version").await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_before_prompt() {
        let mock = tokio_test::io::Builder::new().read(b"% Connection refused").build();
        let mut channel = PtyChannel::new(TelnetLink::new(mock), Duration::from_secs(1));

        let pattern = prompt_pattern(&NO_ENDINGS).unwrap();
        let err = channel.read_until(&pattern).await.unwrap_err();
        assert!(matches!(err, Error::Channel(ChannelError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_waiting_for_prompt() {
        let mock = tokio_test::io::Builder::new()
            .read(b"Building configuration...")
            .wait(Duration::from_secs(10))
            .build();
        let mut channel = PtyChannel::new(TelnetLink::new(mock), Duration::from_secs(2));

        let pattern = prompt_pattern(&NO_ENDINGS).unwrap();
        let err = channel.read_until(&pattern).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Channel(ChannelError::PatternTimeout(d)) if d == Duration::from_secs(2)
        ));
    }
}
