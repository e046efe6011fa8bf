//! Live session over SSH or Telnet.

use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info, warn};
use regex::bytes::Regex;
use secrecy::{ExposeSecret, SecretString};

use super::Session;
use crate::channel::PtyChannel;
use crate::channel::patterns::{
    DEFAULT_PROMPT_ENDINGS, PASSWORD_PROMPT, USERNAME_PROMPT, host_prompt_pattern,
    hostname_from_prompt, prompt_pattern,
};
use crate::error::{Error, SessionError, SessionResult};
use crate::inventory::Protocol;
use crate::transport::{
    Connection, HostKeyVerification, Link, SshConfig, SshTransport, TelnetConfig, TelnetLink,
};

/// Settings shared by every connection a [`CliSession`] makes.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Timeout for connecting and for every prompt wait.
    pub timeout: Duration,

    /// Host key verification for SSH connections.
    pub host_key_verification: HostKeyVerification,

    /// Alternate known_hosts file.
    pub known_hosts_path: Option<PathBuf>,

    /// Prompt endings for devices reached with `connect` or through a hop.
    pub prompt_endings: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            prompt_endings: DEFAULT_PROMPT_ENDINGS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// The prompt of one leg of the session.
#[derive(Debug, Clone)]
pub(super) struct PromptInfo {
    /// Last prompt line seen, trimmed.
    pub(super) prompt: String,
    pub(super) hostname: String,
    pub(super) endings: Vec<String>,
}

/// Session backed by a real SSH or Telnet connection.
pub struct CliSession {
    pub(super) config: SessionConfig,

    /// Open channel, `None` while disconnected.
    pub(super) channel: Option<PtyChannel<Connection>>,

    /// Prompt of the device currently being talked to.
    pub(super) current: Option<PromptInfo>,

    /// Jump host prompt, set while a proxied hop is open.
    pub(super) jump: Option<PromptInfo>,
}

impl CliSession {
    /// Create a disconnected session.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            channel: None,
            current: None,
            jump: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The prompt currently expected from the device.
    pub fn prompt(&self) -> Option<&str> {
        self.current.as_ref().map(|p| p.prompt.as_str())
    }

    async fn open_ssh(
        &self,
        host: &str,
        username: &str,
        password: &SecretString,
    ) -> crate::error::Result<PtyChannel<Connection>> {
        let mut ssh = SshConfig::new(host, username, password.clone());
        ssh.timeout = self.config.timeout;
        ssh.host_key_verification = self.config.host_key_verification.clone();
        ssh.known_hosts_path = self.config.known_hosts_path.clone();

        let link = SshTransport::connect(ssh).await?.open_shell().await?;
        Ok(PtyChannel::new(Connection::Ssh(link), self.config.timeout))
    }

    async fn open_telnet(&self, host: &str) -> crate::error::Result<PtyChannel<Connection>> {
        let mut telnet = TelnetConfig::new(host);
        telnet.timeout = self.config.timeout;

        let link = TelnetLink::connect(&telnet).await?;
        Ok(PtyChannel::new(Connection::Telnet(link), self.config.timeout))
    }

    /// Open a leg and find its prompt. A half-open leg is closed on failure.
    async fn establish(
        &mut self,
        host: &str,
        username: &str,
        password: &SecretString,
        protocol: Protocol,
        endings: Vec<String>,
    ) -> SessionResult<()> {
        if self.channel.is_some() {
            return Err(SessionError::interaction("Session is already connected"));
        }

        info!("Connecting to {} with {}", host, protocol);
        let channel = match protocol {
            Protocol::Ssh => self.open_ssh(host, username, password).await,
            Protocol::Telnet => self.open_telnet(host).await,
        }
        .map_err(connect_failure)?;
        self.channel = Some(channel);

        let result = self.finish_login(username, password, protocol, endings).await;
        if let Err(e) = result {
            self.disconnect().await;
            return Err(e);
        }
        Ok(())
    }

    async fn finish_login(
        &mut self,
        username: &str,
        password: &SecretString,
        protocol: Protocol,
        endings: Vec<String>,
    ) -> SessionResult<()> {
        match protocol {
            // SSH has authenticated already; the first prompt is pending
            Protocol::Ssh => self.discover_prompt(endings, true).await,
            Protocol::Telnet => {
                let pattern = prompt_pattern(endings.as_slice()).map_err(pattern_failure)?;
                telnet_login(self.channel_mut()?, username, password, &pattern).await?;
                self.discover_prompt(endings, false).await
            }
        }
    }

    pub(super) fn channel_mut(&mut self) -> SessionResult<&mut PtyChannel<Connection>> {
        self.channel
            .as_mut()
            .ok_or_else(|| SessionError::interaction("Session is not connected"))
    }

    /// Nudge the device with a newline and record the prompt it returns.
    ///
    /// With `drain_first`, one prompt is read before the newline is sent so
    /// that a banner prompt does not linger in the stream.
    pub(super) async fn discover_prompt(
        &mut self,
        endings: Vec<String>,
        drain_first: bool,
    ) -> SessionResult<()> {
        let pattern = prompt_pattern(endings.as_slice()).map_err(pattern_failure)?;
        let channel = self.channel_mut()?;

        if drain_first {
            channel
                .read_until(&pattern)
                .await
                .map_err(connect_failure)?;
        }
        channel.send("").await.map_err(connect_failure)?;
        let data = channel
            .read_until(&pattern)
            .await
            .map_err(connect_failure)?;

        let prompt = last_line(&data);
        let hostname = hostname_from_prompt(&prompt, endings.as_slice());
        debug!("Prompt is {:?}, hostname {:?}", prompt, hostname);
        self.current = Some(PromptInfo {
            prompt,
            hostname,
            endings,
        });
        Ok(())
    }

    /// Pattern for the current device prompt in any mode.
    fn device_prompt(&self) -> SessionResult<Regex> {
        let current = self
            .current
            .as_ref()
            .ok_or_else(|| SessionError::interaction("Session is not connected"))?;
        host_prompt_pattern(&current.hostname, current.endings.as_slice())
            .map_err(pattern_failure)
    }

    fn update_prompt(&mut self, data: &[u8]) {
        let prompt = last_line(data);
        if let Some(current) = self.current.as_mut() {
            current.prompt = prompt;
        }
    }

    async fn enable(&mut self, secret: &SecretString) -> SessionResult<()> {
        let device = self.device_prompt()?;
        let data = enable_exchange(self.channel_mut()?, secret, &device).await?;
        self.update_prompt(&data);
        Ok(())
    }
}

impl Session for CliSession {
    fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    fn hostname(&self) -> Option<&str> {
        self.current.as_ref().map(|p| p.hostname.as_str())
    }

    async fn connect(
        &mut self,
        host: &str,
        username: &str,
        password: &SecretString,
        protocol: Protocol,
    ) -> SessionResult<()> {
        let endings = self.config.prompt_endings.clone();
        self.establish(host, username, password, protocol, endings)
            .await
    }

    async fn connect_ssh(
        &mut self,
        host: &str,
        username: &str,
        password: &SecretString,
        prompt_endings: &[String],
    ) -> SessionResult<()> {
        let endings = if prompt_endings.is_empty() {
            self.config.prompt_endings.clone()
        } else {
            prompt_endings.to_vec()
        };
        self.establish(host, username, password, Protocol::Ssh, endings)
            .await
    }

    async fn ssh_via_jump(
        &mut self,
        host: &str,
        username: &str,
        password: &SecretString,
    ) -> SessionResult<()> {
        let command = format!("ssh -l {} {}", username, host);
        self.hop(&command, username, password).await
    }

    async fn telnet_via_jump(
        &mut self,
        host: &str,
        username: &str,
        password: &SecretString,
    ) -> SessionResult<()> {
        let command = format!("telnet {}", host);
        self.hop(&command, username, password).await
    }

    async fn disconnect_via_jump(&mut self) -> SessionResult<()> {
        self.unhop().await
    }

    async fn disconnect(&mut self) {
        self.current = None;
        self.jump = None;
        if let Some(channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                warn!("Error while closing session: {}", e);
            }
        }
    }

    async fn start_cisco_session(&mut self, enable_secret: Option<&SecretString>) -> SessionResult<()> {
        let prompt = self
            .prompt()
            .ok_or_else(|| SessionError::interaction("Session is not connected"))?
            .to_string();

        if prompt.ends_with('>') {
            let secret = enable_secret.ok_or_else(|| {
                SessionError::interaction("An enable secret is required to enter privileged mode")
            })?;
            self.enable(secret).await?;

            let now = self.prompt().unwrap_or_default();
            if !now.ends_with('#') {
                return Err(SessionError::interaction(format!(
                    "Failed to enter privileged mode, prompt is {:?}",
                    now
                )));
            }
        }

        self.get_command_output("terminal length 0").await?;
        self.get_command_output("terminal width 0").await?;
        Ok(())
    }

    async fn get_command_output(&mut self, command: &str) -> SessionResult<String> {
        let device = self.device_prompt()?;
        let channel = self.channel_mut()?;

        channel.send(command).await.map_err(interaction_failure)?;
        let data = channel
            .read_until(&device)
            .await
            .map_err(interaction_failure)?;

        self.update_prompt(&data);
        Ok(normalize_output(&String::from_utf8_lossy(&data), command))
    }
}

/// Answer Username/Password prompts until `prompt` shows up.
async fn telnet_login<L: Link>(
    channel: &mut PtyChannel<L>,
    username: &str,
    password: &SecretString,
    prompt: &Regex,
) -> SessionResult<Vec<u8>> {
    let mut password_sent = false;
    loop {
        let (idx, data) = channel
            .expect(&[&*USERNAME_PROMPT, &*PASSWORD_PROMPT, prompt])
            .await
            .map_err(connect_failure)?;
        match idx {
            0 | 1 if password_sent => {
                return Err(SessionError::connect(format!(
                    "Authentication failed for user '{}'",
                    username
                )));
            }
            0 => channel.send(username).await.map_err(connect_failure)?,
            1 => {
                channel
                    .send_hidden(password.expose_secret())
                    .await
                    .map_err(connect_failure)?;
                password_sent = true;
            }
            _ => return Ok(data),
        }
    }
}

/// Run `enable`, giving `secret` if asked, and wait for the device prompt.
///
/// Returns everything read up to the new prompt.
async fn enable_exchange<L: Link>(
    channel: &mut PtyChannel<L>,
    secret: &SecretString,
    device: &Regex,
) -> SessionResult<Vec<u8>> {
    channel.send("enable").await.map_err(interaction_failure)?;
    let (idx, data) = channel
        .expect(&[&*PASSWORD_PROMPT, device])
        .await
        .map_err(interaction_failure)?;
    if idx == 1 {
        return Ok(data);
    }

    channel
        .send_hidden(secret.expose_secret())
        .await
        .map_err(interaction_failure)?;
    let (idx, data) = channel
        .expect(&[&*PASSWORD_PROMPT, device])
        .await
        .map_err(interaction_failure)?;
    if idx == 0 {
        return Err(SessionError::interaction("Enable secret was rejected"));
    }
    Ok(data)
}

/// Message for an error, without the layer prefix.
pub(super) fn describe(e: &Error) -> String {
    match e {
        Error::Transport(inner) => inner.to_string(),
        Error::Channel(inner) => inner.to_string(),
        other => other.to_string(),
    }
}

pub(super) fn pattern_failure(e: regex::Error) -> SessionError {
    SessionError::interaction(format!("Invalid prompt pattern: {}", e))
}

pub(super) fn connect_failure(e: Error) -> SessionError {
    SessionError::connect(describe(&e))
}

pub(super) fn interaction_failure(e: Error) -> SessionError {
    SessionError::interaction(describe(&e))
}

/// Last non-empty line of output, trimmed.
pub(super) fn last_line(data: &[u8]) -> String {
    String::from_utf8_lossy(data)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or_default()
        .to_string()
}

/// Strip the command echo and the trailing prompt from raw output.
pub(super) fn normalize_output(raw: &str, command: &str) -> String {
    let text = raw.replace("\r\n", "\n").replace('\r', "");
    let text = text.trim_start_matches('\n');
    let output = text
        .strip_prefix(command)
        .unwrap_or(text)
        .trim_start_matches('\n');

    match output.rfind('\n') {
        Some(pos) => output[..pos].to_string(),
        None => String::new(),
    }
}
