//! Simulated session for dry runs and tests.
//!
//! Nothing touches the network. Every call is recorded, and failures are
//! injected per host ahead of time.

use std::collections::VecDeque;

use indexmap::IndexMap;
use log::info;
use secrecy::SecretString;

use super::Session;
use crate::error::{SessionError, SessionResult};
use crate::inventory::Protocol;

/// One call made on a [`ScriptedSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Connect { host: String, protocol: Protocol },
    ConnectSsh { host: String },
    SshViaJump { host: String },
    TelnetViaJump { host: String },
    DisconnectViaJump,
    Disconnect,
    StartCiscoSession { host: String },
    Command { host: String, command: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Disconnected,
    Direct { host: String },
    Jump { jump: String },
    Proxied { jump: String, host: String },
}

/// Session that plays back a prepared script.
#[derive(Debug)]
pub struct ScriptedSession {
    state: State,
    calls: Vec<SessionCall>,

    /// Failures to return from the next connects to a host, in order.
    connect_failures: IndexMap<String, VecDeque<SessionError>>,

    /// Failure returned by every command on a host.
    command_failures: IndexMap<String, SessionError>,

    /// Failure returned once when leaving a hop to a host.
    unhop_failures: IndexMap<String, SessionError>,

    /// Canned output by command.
    outputs: IndexMap<String, String>,
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedSession {
    /// A disconnected session where every call succeeds.
    pub fn new() -> Self {
        Self {
            state: State::Disconnected,
            calls: Vec::new(),
            connect_failures: IndexMap::new(),
            command_failures: IndexMap::new(),
            unhop_failures: IndexMap::new(),
            outputs: IndexMap::new(),
        }
    }

    /// A session already connected straight to `host`.
    pub fn connected_to(host: impl Into<String>) -> Self {
        Self {
            state: State::Direct { host: host.into() },
            ..Self::new()
        }
    }

    /// Fail the next connect to `host` with `error`.
    ///
    /// Applies to direct connects, jump host connects and hops alike.
    /// Calling it again queues another failure behind the first.
    pub fn fail_connect(mut self, host: impl Into<String>, error: SessionError) -> Self {
        self.connect_failures
            .entry(host.into())
            .or_default()
            .push_back(error);
        self
    }

    /// Fail every command run on `host`, including `start_cisco_session`.
    pub fn fail_commands_on(mut self, host: impl Into<String>, error: SessionError) -> Self {
        self.command_failures.insert(host.into(), error);
        self
    }

    /// Fail the next `disconnect_via_jump` away from `host`.
    ///
    /// The hop stays open, as when the device never hands back the jump
    /// prompt.
    pub fn fail_disconnect_via_jump(mut self, host: impl Into<String>, error: SessionError) -> Self {
        self.unhop_failures.insert(host.into(), error);
        self
    }

    /// Return `output` whenever `command` is run.
    pub fn with_output(mut self, command: impl Into<String>, output: impl Into<String>) -> Self {
        self.outputs.insert(command.into(), output.into());
        self
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> &[SessionCall] {
        &self.calls
    }

    fn record(&mut self, call: SessionCall) {
        info!("[dry run] {:?}", call);
        self.calls.push(call);
    }

    fn take_connect_failure(&mut self, host: &str) -> SessionResult<()> {
        let Some(queue) = self.connect_failures.get_mut(host) else {
            return Ok(());
        };
        let failure = queue.pop_front();
        if queue.is_empty() {
            self.connect_failures.shift_remove(host);
        }
        failure.map_or(Ok(()), Err)
    }

    /// The device a command would run on.
    fn device(&self) -> SessionResult<String> {
        match &self.state {
            State::Direct { host } | State::Proxied { host, .. } => Ok(host.clone()),
            State::Jump { .. } => Err(SessionError::interaction(
                "No device session is open on the jump host",
            )),
            State::Disconnected => Err(SessionError::interaction("Session is not connected")),
        }
    }

    fn hop(&mut self, host: &str, call: SessionCall) -> SessionResult<()> {
        self.record(call);
        let jump = match &self.state {
            State::Jump { jump } => jump.clone(),
            State::Proxied { .. } => {
                return Err(SessionError::interaction(
                    "A proxied connection is already open",
                ));
            }
            _ => return Err(SessionError::interaction("Not connected to a jump host")),
        };
        self.take_connect_failure(host)?;
        self.state = State::Proxied {
            jump,
            host: host.to_string(),
        };
        Ok(())
    }

    fn open(&mut self, host: &str, call: SessionCall, jump: bool) -> SessionResult<()> {
        self.record(call);
        if self.state != State::Disconnected {
            return Err(SessionError::interaction("Session is already connected"));
        }
        self.take_connect_failure(host)?;
        let host = host.to_string();
        self.state = if jump {
            State::Jump { jump: host }
        } else {
            State::Direct { host }
        };
        Ok(())
    }

    fn command(&mut self, call: SessionCall) -> SessionResult<String> {
        let host = self.device();
        self.record(call);
        let host = host?;
        if let Some(error) = self.command_failures.get(&host) {
            return Err(error.clone());
        }
        Ok(String::new())
    }
}

impl Session for ScriptedSession {
    fn is_connected(&self) -> bool {
        self.state != State::Disconnected
    }

    fn hostname(&self) -> Option<&str> {
        match &self.state {
            State::Disconnected => None,
            State::Direct { host } | State::Proxied { host, .. } => Some(host.as_str()),
            State::Jump { jump } => Some(jump.as_str()),
        }
    }

    async fn connect(
        &mut self,
        host: &str,
        _username: &str,
        _password: &SecretString,
        protocol: Protocol,
    ) -> SessionResult<()> {
        let call = SessionCall::Connect {
            host: host.to_string(),
            protocol,
        };
        self.open(host, call, false)
    }

    async fn connect_ssh(
        &mut self,
        host: &str,
        _username: &str,
        _password: &SecretString,
        _prompt_endings: &[String],
    ) -> SessionResult<()> {
        let call = SessionCall::ConnectSsh {
            host: host.to_string(),
        };
        self.open(host, call, true)
    }

    async fn ssh_via_jump(
        &mut self,
        host: &str,
        _username: &str,
        _password: &SecretString,
    ) -> SessionResult<()> {
        let call = SessionCall::SshViaJump {
            host: host.to_string(),
        };
        self.hop(host, call)
    }

    async fn telnet_via_jump(
        &mut self,
        host: &str,
        _username: &str,
        _password: &SecretString,
    ) -> SessionResult<()> {
        let call = SessionCall::TelnetViaJump {
            host: host.to_string(),
        };
        self.hop(host, call)
    }

    async fn disconnect_via_jump(&mut self) -> SessionResult<()> {
        self.record(SessionCall::DisconnectViaJump);
        match std::mem::replace(&mut self.state, State::Disconnected) {
            State::Proxied { jump, host } => {
                if let Some(error) = self.unhop_failures.shift_remove(&host) {
                    self.state = State::Proxied { jump, host };
                    return Err(error);
                }
                self.state = State::Jump { jump };
                Ok(())
            }
            other => {
                self.state = other;
                Err(SessionError::interaction("No proxied connection is open"))
            }
        }
    }

    async fn disconnect(&mut self) {
        self.record(SessionCall::Disconnect);
        self.state = State::Disconnected;
    }

    async fn start_cisco_session(&mut self, _enable_secret: Option<&SecretString>) -> SessionResult<()> {
        let call = SessionCall::StartCiscoSession {
            host: self.device().unwrap_or_default(),
        };
        self.command(call).map(|_| ())
    }

    async fn get_command_output(&mut self, command: &str) -> SessionResult<String> {
        let call = SessionCall::Command {
            host: self.device().unwrap_or_default(),
            command: command.to_string(),
        };
        self.command(call)?;
        Ok(self.outputs.get(command).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> SecretString {
        SecretString::from("pw")
    }

    #[tokio::test]
    async fn test_direct_connect_and_disconnect() {
        let mut session = ScriptedSession::new().with_output("show clock", "10:00");

        session
            .connect("r1", "admin", &secret(), Protocol::Ssh)
            .await
            .unwrap();
        assert!(session.is_connected());
        assert_eq!(session.hostname(), Some("r1"));
        assert_eq!(session.get_command_output("show clock").await.unwrap(), "10:00");

        session.disconnect().await;
        assert!(!session.is_connected());
        assert_eq!(
            session.calls(),
            &[
                SessionCall::Connect {
                    host: "r1".to_string(),
                    protocol: Protocol::Ssh
                },
                SessionCall::Command {
                    host: "r1".to_string(),
                    command: "show clock".to_string()
                },
                SessionCall::Disconnect,
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_failures_are_queued_per_host() {
        let mut session = ScriptedSession::new()
            .fail_connect("r1", SessionError::connect("refused"))
            .fail_connect("r1", SessionError::connect("timed out"));

        let err = session
            .connect("r1", "admin", &secret(), Protocol::Telnet)
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::connect("refused"));
        assert!(!session.is_connected());

        let err = session
            .connect("r1", "admin", &secret(), Protocol::Telnet)
            .await
            .unwrap_err();
        assert_eq!(err.message(), "timed out");

        session
            .connect("r1", "admin", &secret(), Protocol::Telnet)
            .await
            .unwrap();
        assert_eq!(session.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_hops_need_a_jump_leg() {
        let mut session = ScriptedSession::new();
        let err = session.ssh_via_jump("r1", "admin", &secret()).await.unwrap_err();
        assert!(matches!(err, SessionError::Interaction { .. }));

        session
            .connect_ssh("jump", "ops", &secret(), &["$".to_string()])
            .await
            .unwrap();
        assert_eq!(session.hostname(), Some("jump"));
        assert!(session.get_command_output("show cdp").await.is_err());

        session.telnet_via_jump("r1", "admin", &secret()).await.unwrap();
        assert_eq!(session.hostname(), Some("r1"));

        session.disconnect_via_jump().await.unwrap();
        assert_eq!(session.hostname(), Some("jump"));
        assert!(session.disconnect_via_jump().await.is_err());
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_command_failures() {
        let mut session = ScriptedSession::connected_to("r2")
            .fail_commands_on("r2", SessionError::interaction("% Invalid input"));

        let err = session.start_cisco_session(None).await.unwrap_err();
        assert_eq!(err.message(), "% Invalid input");
        assert!(session.get_command_output("show version").await.is_err());
        assert_eq!(session.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_second_connect_is_refused() {
        let mut session = ScriptedSession::connected_to("r1");
        let err = session
            .connect("r2", "admin", &secret(), Protocol::Ssh)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Interaction { .. }));
        assert_eq!(session.hostname(), Some("r1"));
    }

    #[tokio::test]
    async fn test_unhop_failure_leaves_hop_open_once() {
        let mut session = ScriptedSession::new()
            .fail_disconnect_via_jump("r1", SessionError::interaction("Channel closed"));
        session
            .connect_ssh("jump", "ops", &secret(), &[])
            .await
            .unwrap();
        session.ssh_via_jump("r1", "admin", &secret()).await.unwrap();

        let err = session.disconnect_via_jump().await.unwrap_err();
        assert_eq!(err, SessionError::interaction("Channel closed"));
        assert_eq!(session.hostname(), Some("r1"));

        session.disconnect_via_jump().await.unwrap();
        assert_eq!(session.hostname(), Some("jump"));
    }
}
