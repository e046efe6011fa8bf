//! Script environments.
//!
//! A [`ScriptEnvironment`] hands the batch runner everything it needs from
//! the outside world: the session, settings, operator prompts, the device
//! list and output naming. [`ConsoleScript`] is the live one;
//! [`DebugScript`] simulates everything for dry runs and tests.

mod console;
mod debug;

pub use console::ConsoleScript;
pub use debug::DebugScript;

use log::info;
use secrecy::SecretString;

use crate::error::{Result, ScriptError};
use crate::inventory::{self, DeviceRecord};
use crate::output::OutputNamer;
use crate::session::Session;
use crate::settings::SettingsStore;

/// Capabilities a batch script runs against.
pub trait ScriptEnvironment {
    type Session: Session;

    fn session(&mut self) -> &mut Self::Session;

    fn settings(&mut self) -> &mut SettingsStore;

    /// Ask the operator for a value. With `hide_input` the answer is masked.
    fn prompt(&mut self, message: &str, hide_input: bool) -> Result<String>;

    /// Read the device list as-is. A missing list is empty, not an error.
    fn import_device_list(&mut self) -> Result<Vec<DeviceRecord>>;

    fn output(&self) -> &OutputNamer;

    /// Short name used in output file names.
    fn script_name(&self) -> &str;

    /// Prompt, refusing an empty answer. Visible answers are trimmed.
    fn prompt_required(&mut self, message: &str, field: &str, hide_input: bool) -> Result<String> {
        let answer = self.prompt(message, hide_input)?;
        let answer = if hide_input {
            answer
        } else {
            answer.trim().to_string()
        };
        if answer.is_empty() {
            return Err(ScriptError::MissingInput {
                field: field.to_string(),
            }
            .into());
        }
        Ok(answer)
    }

    /// Import the device list and fill in missing credentials.
    ///
    /// If any row has no username or password, the operator is asked once
    /// for defaults that apply to every such row.
    fn device_list(&mut self) -> Result<Vec<DeviceRecord>> {
        let mut devices = self.import_device_list()?;

        let missing = devices.iter().filter(|d| d.lacks_credentials()).count();
        if missing > 0 {
            info!("{} devices have no credentials in the device list", missing);
            let username = self.prompt_required(
                "Enter the default USERNAME for devices without one",
                "default username",
                false,
            )?;
            let password = self.prompt_required(
                &format!("Enter the default PASSWORD for {}", username),
                "default password",
                true,
            )?;
            inventory::apply_default_credentials(
                &mut devices,
                &username,
                &SecretString::from(password),
            );
        }
        Ok(devices)
    }
}
