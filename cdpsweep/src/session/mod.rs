//! Device sessions.
//!
//! A [`Session`] is the single connection handle the batch runner drives.
//! It is either disconnected, connected straight to a device, or connected
//! to a jump host with an optional proxied hop to a device on top.
//!
//! Every fallible operation returns a [`SessionError`], which is either a
//! connect failure or an interaction failure. The runner decides what to do
//! with each kind; the session never aborts the batch on its own.

mod cli;
mod jump;
mod scripted;

use std::future::Future;

use secrecy::SecretString;

pub use cli::{CliSession, SessionConfig};
pub use scripted::{ScriptedSession, SessionCall};

use crate::error::SessionResult;
use crate::inventory::Protocol;

/// Connection handle to network devices, possibly through a jump host.
pub trait Session: Send {
    /// Whether any leg (direct or jump) is open.
    fn is_connected(&self) -> bool;

    /// Hostname of the device at the current prompt, once known.
    fn hostname(&self) -> Option<&str>;

    /// Connect straight to a device with its own credentials.
    fn connect(
        &mut self,
        host: &str,
        username: &str,
        password: &SecretString,
        protocol: Protocol,
    ) -> impl Future<Output = SessionResult<()>> + Send;

    /// Connect over SSH, recognising prompts by `prompt_endings`.
    ///
    /// Used for the jump host, whose shell prompt usually ends in `$`.
    fn connect_ssh(
        &mut self,
        host: &str,
        username: &str,
        password: &SecretString,
        prompt_endings: &[String],
    ) -> impl Future<Output = SessionResult<()>> + Send;

    /// From the connected jump host, open an SSH hop to `host`.
    fn ssh_via_jump(
        &mut self,
        host: &str,
        username: &str,
        password: &SecretString,
    ) -> impl Future<Output = SessionResult<()>> + Send;

    /// From the connected jump host, open a Telnet hop to `host`.
    fn telnet_via_jump(
        &mut self,
        host: &str,
        username: &str,
        password: &SecretString,
    ) -> impl Future<Output = SessionResult<()>> + Send;

    /// Close the proxied hop and return to the jump host prompt.
    fn disconnect_via_jump(&mut self) -> impl Future<Output = SessionResult<()>> + Send;

    /// Close everything. Always ends disconnected.
    fn disconnect(&mut self) -> impl Future<Output = ()> + Send;

    /// Enter privileged mode if needed and turn off paging.
    fn start_cisco_session(
        &mut self,
        enable_secret: Option<&SecretString>,
    ) -> impl Future<Output = SessionResult<()>> + Send;

    /// Run a command and return its output without echo or prompt.
    fn get_command_output(
        &mut self,
        command: &str,
    ) -> impl Future<Output = SessionResult<String>> + Send;
}
