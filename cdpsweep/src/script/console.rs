//! Live environment: real connections, terminal prompts, settings on disk.

use std::path::PathBuf;

use inquire::{Password, PasswordDisplayMode, Text};

use super::ScriptEnvironment;
use crate::error::{Result, ScriptError};
use crate::inventory::{self, DeviceRecord};
use crate::output::OutputNamer;
use crate::session::{CliSession, SessionConfig};
use crate::settings::SettingsStore;

pub struct ConsoleScript {
    name: String,
    session: CliSession,
    settings: SettingsStore,
    output: OutputNamer,

    /// Device list given on the command line, asked for otherwise.
    devices_path: Option<PathBuf>,
}

impl ConsoleScript {
    pub fn new(
        name: impl Into<String>,
        settings: SettingsStore,
        devices_path: Option<PathBuf>,
    ) -> Self {
        let global = settings.global();
        let session = CliSession::new(SessionConfig {
            timeout: global.timeout(),
            host_key_verification: global.host_key_checking.clone(),
            known_hosts_path: global.known_hosts_path.clone(),
            ..SessionConfig::default()
        });
        let output = OutputNamer::new(global.output_dir.clone(), &global.date_format);

        Self {
            name: name.into(),
            session,
            settings,
            output,
            devices_path,
        }
    }
}

impl ScriptEnvironment for ConsoleScript {
    type Session = CliSession;

    fn session(&mut self) -> &mut CliSession {
        &mut self.session
    }

    fn settings(&mut self) -> &mut SettingsStore {
        &mut self.settings
    }

    fn prompt(&mut self, message: &str, hide_input: bool) -> Result<String> {
        let answer = if hide_input {
            Password::new(message)
                .without_confirmation()
                .with_display_mode(PasswordDisplayMode::Masked)
                .prompt()
        } else {
            Text::new(message).prompt()
        };
        Ok(answer.map_err(|e| ScriptError::Prompt(e.to_string()))?)
    }

    fn import_device_list(&mut self) -> Result<Vec<DeviceRecord>> {
        let path = match &self.devices_path {
            Some(path) => path.clone(),
            None => PathBuf::from(self.prompt_required(
                "Path to the device list CSV",
                "device list",
                false,
            )?),
        };
        Ok(inventory::load(&path)?)
    }

    fn output(&self) -> &OutputNamer {
        &self.output
    }

    fn script_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use super::*;
    use crate::settings::GlobalSettings;
    use crate::transport::HostKeyVerification;

    #[test]
    fn test_session_config_follows_settings() {
        let global = GlobalSettings {
            timeout_secs: 5,
            host_key_checking: HostKeyVerification::Strict,
            known_hosts_path: Some(PathBuf::from("/etc/cdpsweep/known_hosts")),
            ..GlobalSettings::default()
        };
        let mut env = ConsoleScript::new("cdpsweep", SettingsStore::in_memory(global), None);

        let config = env.session().config();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.host_key_verification, HostKeyVerification::Strict);
        assert_eq!(
            config.known_hosts_path.as_deref(),
            Some(Path::new("/etc/cdpsweep/known_hosts"))
        );
    }
}
