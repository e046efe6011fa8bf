//! Byte-level transports for device sessions.
//!
//! SSH goes through russh, Telnet through a plain tokio TCP stream with
//! just enough option negotiation to reach a login prompt. Both are
//! exposed as a [`Link`], which the channel layer reads prompts from.

pub mod config;
mod ssh;
mod telnet;

use std::future::Future;

use tokio::net::TcpStream;

pub use config::{HostKeyVerification, SshConfig, TelnetConfig};
pub use ssh::{SshLink, SshTransport};
pub use telnet::TelnetLink;

use crate::error::TransportError;

/// A bidirectional byte stream to a device shell.
pub trait Link: Send {
    /// Write all bytes to the remote side.
    fn write_all(
        &mut self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Read the next chunk of output. `None` means the remote side closed.
    fn read_chunk(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Line terminator to send after each command.
    fn newline(&self) -> &'static str;

    /// Shut the link down.
    fn close(self) -> impl Future<Output = Result<(), TransportError>> + Send
    where
        Self: Sized;
}

/// The link a live session runs over.
pub enum Connection {
    Ssh(SshLink),
    Telnet(TelnetLink<TcpStream>),
}

impl Link for Connection {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        match self {
            Self::Ssh(link) => link.write_all(data).await,
            Self::Telnet(link) => link.write_all(data).await,
        }
    }

    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match self {
            Self::Ssh(link) => link.read_chunk().await,
            Self::Telnet(link) => link.read_chunk().await,
        }
    }

    fn newline(&self) -> &'static str {
        match self {
            Self::Ssh(link) => link.newline(),
            Self::Telnet(link) => link.newline(),
        }
    }

    async fn close(self) -> Result<(), TransportError> {
        match self {
            Self::Ssh(link) => link.close().await,
            Self::Telnet(link) => link.close().await,
        }
    }
}
