//! Connection configuration for the SSH and Telnet transports.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Default SSH port.
pub const SSH_PORT: u16 = 22;

/// Default Telnet port.
pub const TELNET_PORT: u16 = 23;

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys. Connection fails if the host
    /// is not already in known_hosts.
    Strict,

    /// Accept and auto-learn unknown keys, but reject changed keys.
    /// This is the default and matches common SSH client behavior.
    #[default]
    AcceptNew,

    /// Accept all keys without checking. For testing and lab use only.
    Disabled,
}

/// SSH connection configuration.
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Target host (hostname or IP address).
    pub host: String,

    /// SSH port (default: 22).
    pub port: u16,

    /// Username for authentication.
    pub username: String,

    /// Password, used for both password and keyboard-interactive auth.
    pub password: SecretString,

    /// Connection timeout.
    pub timeout: Duration,

    /// Terminal width for PTY.
    pub terminal_width: u32,

    /// Terminal height for PTY.
    pub terminal_height: u32,

    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// Path to known_hosts file.
    pub known_hosts_path: Option<PathBuf>,
}

impl SshConfig {
    /// Create a config with the default port, PTY size and timeout.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self {
            host: host.into(),
            port: SSH_PORT,
            username: username.into(),
            password,
            timeout: Duration::from_secs(30),
            terminal_width: 511,
            terminal_height: 24,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
        }
    }

    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Telnet connection configuration.
#[derive(Debug, Clone)]
pub struct TelnetConfig {
    /// Target host (hostname or IP address).
    pub host: String,

    /// Telnet port (default: 23).
    pub port: u16,

    /// Connection timeout.
    pub timeout: Duration,
}

impl TelnetConfig {
    /// Create a config with the default port and timeout.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: TELNET_PORT,
            timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        mode: HostKeyVerification,
    }

    #[test]
    fn test_host_key_mode_from_settings_text() {
        let w: Wrapper = toml::from_str(r#"mode = "accept-new""#).unwrap();
        assert_eq!(w.mode, HostKeyVerification::AcceptNew);
        let w: Wrapper = toml::from_str(r#"mode = "strict""#).unwrap();
        assert_eq!(w.mode, HostKeyVerification::Strict);
    }

    #[test]
    fn test_socket_addr() {
        let mut config = SshConfig::new("10.0.0.1", "admin", SecretString::from("pw"));
        config.port = 2222;
        assert_eq!(config.socket_addr(), "10.0.0.1:2222");
    }
}
