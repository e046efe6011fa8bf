//! Telnet transport over a tokio TCP stream.
//!
//! Option negotiation is minimal: we let the server echo and suppress
//! go-ahead, and refuse everything else. Subnegotiations are discarded.

use bytes::{BufMut, BytesMut};
use log::{debug, trace};
use memchr::memchr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use super::Link;
use super::config::TelnetConfig;
use crate::error::TransportError;

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

const OPT_ECHO: u8 = 1;
const OPT_SGA: u8 = 3;

/// Telnet connection to a device.
pub struct TelnetLink<S> {
    stream: S,
    negotiator: Negotiator,
    read_buf: Vec<u8>,
}

impl TelnetLink<TcpStream> {
    /// Open a TCP connection to the Telnet server.
    pub async fn connect(config: &TelnetConfig) -> Result<Self, TransportError> {
        debug!("Opening Telnet connection to {}:{}", config.host, config.port);
        let stream = tokio::time::timeout(
            config.timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout))?
        .map_err(|source| TransportError::ConnectionFailed {
            host: config.host.clone(),
            port: config.port,
            source,
        })?;

        Ok(Self::new(stream))
    }
}

impl<S> TelnetLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            negotiator: Negotiator::default(),
            read_buf: vec![0; 4096],
        }
    }
}

impl<S> Link for TelnetLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut escaped = Vec::with_capacity(data.len());
        for &byte in data {
            if byte == IAC {
                escaped.push(IAC);
            }
            escaped.push(byte);
        }
        self.stream.write_all(&escaped).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            let n = self.stream.read(&mut self.read_buf).await?;
            if n == 0 {
                return Ok(None);
            }

            let mut data = BytesMut::with_capacity(n);
            let mut replies = Vec::new();
            self.negotiator
                .feed(&self.read_buf[..n], &mut data, &mut replies);

            if !replies.is_empty() {
                self.stream.write_all(&replies).await?;
                self.stream.flush().await?;
            }
            if !data.is_empty() {
                return Ok(Some(data.to_vec()));
            }
        }
    }

    fn newline(&self) -> &'static str {
        "\r"
    }

    async fn close(mut self) -> Result<(), TransportError> {
        match self.stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Data,
    Iac,
    Option(u8),
    Sub,
    SubIac,
}

/// Strips Telnet commands from the byte stream and answers negotiations.
///
/// State survives across reads, so a command split over two TCP segments
/// is handled.
#[derive(Debug)]
struct Negotiator {
    state: State,
    /// Options the server has agreed to perform.
    remote: [bool; 256],
    /// Options we have agreed to perform.
    local: [bool; 256],
}

impl Default for Negotiator {
    fn default() -> Self {
        Self {
            state: State::Data,
            remote: [false; 256],
            local: [false; 256],
        }
    }
}

impl Negotiator {
    fn feed(&mut self, input: &[u8], data: &mut BytesMut, replies: &mut Vec<u8>) {
        let mut rest = input;
        while !rest.is_empty() {
            match self.state {
                State::Data => match memchr(IAC, rest) {
                    Some(pos) => {
                        data.put_slice(&rest[..pos]);
                        self.state = State::Iac;
                        rest = &rest[pos + 1..];
                    }
                    None => {
                        data.put_slice(rest);
                        rest = &[];
                    }
                },
                state => {
                    let byte = rest[0];
                    rest = &rest[1..];
                    self.step(state, byte, data, replies);
                }
            }
        }
    }

    fn step(&mut self, state: State, byte: u8, data: &mut BytesMut, replies: &mut Vec<u8>) {
        self.state = match state {
            State::Data => State::Data,
            State::Iac => match byte {
                IAC => {
                    data.put_u8(IAC);
                    State::Data
                }
                WILL | WONT | DO | DONT => State::Option(byte),
                SB => State::Sub,
                // NOP, GA, data mark and friends carry nothing for us
                _ => State::Data,
            },
            State::Option(command) => {
                self.negotiate(command, byte, replies);
                State::Data
            }
            State::Sub => {
                if byte == IAC {
                    State::SubIac
                } else {
                    State::Sub
                }
            }
            State::SubIac => {
                if byte == SE {
                    State::Data
                } else {
                    State::Sub
                }
            }
        };
    }

    /// Answer one option command. Only state changes get a reply.
    fn negotiate(&mut self, command: u8, option: u8, replies: &mut Vec<u8>) {
        let idx = usize::from(option);
        trace!("telnet negotiation: command {} option {}", command, option);
        match command {
            WILL => {
                let accept = matches!(option, OPT_ECHO | OPT_SGA);
                if accept && !self.remote[idx] {
                    self.remote[idx] = true;
                    replies.extend_from_slice(&[IAC, DO, option]);
                } else if !accept {
                    replies.extend_from_slice(&[IAC, DONT, option]);
                }
            }
            WONT => {
                if self.remote[idx] {
                    self.remote[idx] = false;
                    replies.extend_from_slice(&[IAC, DONT, option]);
                }
            }
            DO => {
                let accept = option == OPT_SGA;
                if accept && !self.local[idx] {
                    self.local[idx] = true;
                    replies.extend_from_slice(&[IAC, WILL, option]);
                } else if !accept {
                    replies.extend_from_slice(&[IAC, WONT, option]);
                }
            }
            DONT => {
                if self.local[idx] {
                    self.local[idx] = false;
                    replies.extend_from_slice(&[IAC, WONT, option]);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(negotiator: &mut Negotiator, input: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut data = BytesMut::new();
        let mut replies = Vec::new();
        negotiator.feed(input, &mut data, &mut replies);
        (data.to_vec(), replies)
    }

    #[test]
    fn test_plain_data_passes_through() {
        let mut n = Negotiator::default();
        let (data, replies) = feed(&mut n, b"Username: ");
        assert_eq!(data, b"Username: ");
        assert!(replies.is_empty());
    }

    #[test]
    fn test_accepts_echo_and_refuses_terminal_type() {
        let mut n = Negotiator::default();
        let (data, replies) = feed(&mut n, &[IAC, WILL, OPT_ECHO, IAC, DO, 24, b'>']);
        assert_eq!(data, b">");
        assert_eq!(replies, vec![IAC, DO, OPT_ECHO, IAC, WONT, 24]);

        // Repeating an agreed option does not trigger another reply
        let (_, replies) = feed(&mut n, &[IAC, WILL, OPT_ECHO]);
        assert!(replies.is_empty());
    }

    #[test]
    fn test_command_split_across_reads() {
        let mut n = Negotiator::default();
        let (data, replies) = feed(&mut n, &[b'a', IAC]);
        assert_eq!(data, b"a");
        assert!(replies.is_empty());

        let (data, replies) = feed(&mut n, &[WILL, OPT_SGA, b'b']);
        assert_eq!(data, b"b");
        assert_eq!(replies, vec![IAC, DO, OPT_SGA]);
    }

    #[test]
    fn test_subnegotiation_discarded_and_escaped_iac_kept() {
        let mut n = Negotiator::default();
        let input = [IAC, SB, 24, 1, IAC, SE, b'x', IAC, IAC, b'y'];
        let (data, replies) = feed(&mut n, &input);
        assert_eq!(data, vec![b'x', IAC, b'y']);
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn test_link_answers_negotiation_and_returns_text() {
        let mock = tokio_test::io::Builder::new()
            .read(&[IAC, WILL, OPT_ECHO])
            .write(&[IAC, DO, OPT_ECHO])
            .read(b"Username: ")
            .write(b"admin\r")
            .build();
        let mut link = TelnetLink::new(mock);

        let chunk = link.read_chunk().await.unwrap();
        assert_eq!(chunk.as_deref(), Some(&b"Username: "[..]));

        link.write_all(b"admin\r").await.unwrap();
    }

    #[tokio::test]
    async fn test_link_escapes_iac_on_write() {
        let mock = tokio_test::io::Builder::new()
            .write(&[b'a', IAC, IAC, b'b'])
            .build();
        let mut link = TelnetLink::new(mock);
        link.write_all(&[b'a', IAC, b'b']).await.unwrap();
    }

    #[tokio::test]
    async fn test_link_eof() {
        let mock = tokio_test::io::Builder::new().build();
        let mut link = TelnetLink::new(mock);
        assert!(link.read_chunk().await.unwrap().is_none());
    }
}
