//! Proxied hops through a jump host.
//!
//! The hop is made by typing an `ssh` or `telnet` command at the jump
//! host's shell, so the jump host needs those clients installed. The
//! jump prompt seen at connect time tells us when the hop has ended,
//! whether by logout or by failure.

use log::{debug, info};
use regex::bytes::Regex;
use secrecy::{ExposeSecret, SecretString};

use super::cli::{
    CliSession, connect_failure, interaction_failure, last_line, pattern_failure,
};
use crate::channel::PtyChannel;
use crate::channel::patterns::{
    HOST_KEY_PROMPT, PASSWORD_PROMPT, USERNAME_PROMPT, exact_prompt_pattern, prompt_pattern,
};
use crate::error::{SessionError, SessionResult};
use crate::transport::Link;

/// Upper bound on prompt exchanges during one hop.
const MAX_HOP_EXCHANGES: usize = 8;

impl CliSession {
    /// Type `command` at the jump prompt and log in to the far device.
    pub(super) async fn hop(
        &mut self,
        command: &str,
        username: &str,
        password: &SecretString,
    ) -> SessionResult<()> {
        if self.jump.is_some() {
            return Err(SessionError::interaction(
                "A proxied connection is already open",
            ));
        }
        let jump = self
            .current
            .clone()
            .ok_or_else(|| SessionError::interaction("Not connected to a jump host"))?;

        let back_at_jump = exact_prompt_pattern(&jump.prompt).map_err(pattern_failure)?;
        let endings = self.config.prompt_endings.clone();
        let device = prompt_pattern(endings.as_slice()).map_err(pattern_failure)?;

        info!("Connecting via {}: {}", jump.hostname, command);
        let channel = self.channel_mut()?;
        hop_exchange(channel, command, username, password, &back_at_jump, &device).await?;

        self.jump = Some(jump);
        self.discover_prompt(endings, false).await
    }

    /// Log out of the far device and wait for the jump prompt.
    pub(super) async fn unhop(&mut self) -> SessionResult<()> {
        let jump = self
            .jump
            .take()
            .ok_or_else(|| SessionError::interaction("No proxied connection is open"))?;
        let back_at_jump = exact_prompt_pattern(&jump.prompt).map_err(pattern_failure)?;

        unhop_exchange(self.channel_mut()?, &back_at_jump).await?;

        debug!("Back at jump host {}", jump.hostname);
        self.current = Some(jump);
        Ok(())
    }
}

/// Send the hop command and answer prompts until the device prompt shows.
///
/// Returns everything read up to the device prompt.
async fn hop_exchange<L: Link>(
    channel: &mut PtyChannel<L>,
    command: &str,
    username: &str,
    password: &SecretString,
    back_at_jump: &Regex,
    device: &Regex,
) -> SessionResult<Vec<u8>> {
    channel.clear_buffer();
    channel.send(command).await.map_err(connect_failure)?;

    let mut username_sent = false;
    let mut password_sent = false;
    for _ in 0..MAX_HOP_EXCHANGES {
        let (idx, data) = channel
            .expect(&[
                back_at_jump,
                &*HOST_KEY_PROMPT,
                &*USERNAME_PROMPT,
                &*PASSWORD_PROMPT,
                device,
            ])
            .await
            .map_err(connect_failure)?;

        match idx {
            0 => return Err(SessionError::connect(hop_failure_message(&data, command))),
            1 => channel.send("yes").await.map_err(connect_failure)?,
            2 | 3 if password_sent => {
                return Err(SessionError::connect(format!(
                    "Authentication failed for user '{}'",
                    username
                )));
            }
            2 if username_sent => {
                return Err(SessionError::connect(format!(
                    "Login prompt repeated for user '{}'",
                    username
                )));
            }
            2 => {
                channel.send(username).await.map_err(connect_failure)?;
                username_sent = true;
            }
            3 => {
                channel
                    .send_hidden(password.expose_secret())
                    .await
                    .map_err(connect_failure)?;
                password_sent = true;
            }
            _ => return Ok(data),
        }
    }

    Err(SessionError::connect(format!(
        "No device prompt after {} login exchanges",
        MAX_HOP_EXCHANGES
    )))
}

/// Send `exit` and read until the jump prompt is back.
async fn unhop_exchange<L: Link>(
    channel: &mut PtyChannel<L>,
    back_at_jump: &Regex,
) -> SessionResult<Vec<u8>> {
    channel.send("exit").await.map_err(interaction_failure)?;
    channel
        .read_until(back_at_jump)
        .await
        .map_err(interaction_failure)
}

/// Explain why the jump host prompt came back instead of the device.
///
/// The jump host's last words before its prompt are usually the reason,
/// e.g. `ssh: connect to host 10.1.1.1 port 22: Connection refused`.
fn hop_failure_message(data: &[u8], command: &str) -> String {
    let text = String::from_utf8_lossy(data);
    let prompt = last_line(data);
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != prompt && *l != command)
        .last()
        .map(str::to_string)
        .unwrap_or_else(|| "Connection closed by jump host".to_string())
}
