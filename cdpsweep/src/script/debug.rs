//! Simulated environment for dry runs and tests.

use std::collections::VecDeque;

use log::{debug, info};

use super::ScriptEnvironment;
use crate::error::{Result, ScriptError};
use crate::inventory::DeviceRecord;
use crate::output::OutputNamer;
use crate::session::{ScriptedSession, Session};
use crate::settings::{GlobalSettings, SettingsStore};

/// Subdirectory of the output directory that dry runs write to.
pub const DRY_RUN_DIR: &str = "dry-run";

/// Environment with an in-memory device list, in-memory settings and
/// prompts answered from a queue.
pub struct DebugScript<S = ScriptedSession> {
    name: String,
    session: S,
    settings: SettingsStore,
    output: OutputNamer,
    devices: Vec<DeviceRecord>,
    answers: VecDeque<String>,
    default_answer: Option<String>,

    /// Every prompt message shown, in order.
    prompts: Vec<String>,
    imports: usize,
}

impl<S: Session> DebugScript<S> {
    pub fn new(session: S, global: GlobalSettings) -> Self {
        let output = OutputNamer::new(global.output_dir.clone(), &global.date_format);
        Self {
            name: "cdpsweep".to_string(),
            session,
            settings: SettingsStore::in_memory(global),
            output,
            devices: Vec::new(),
            answers: VecDeque::new(),
            default_answer: None,
            prompts: Vec::new(),
            imports: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_output(mut self, output: OutputNamer) -> Self {
        self.output = output;
        self
    }

    pub fn with_devices(mut self, devices: Vec<DeviceRecord>) -> Self {
        self.devices = devices;
        self
    }

    /// Queue answers for the next prompts, in order.
    pub fn with_answers<I, T>(mut self, answers: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.answers.extend(answers.into_iter().map(Into::into));
        self
    }

    /// Answer used once the queue runs dry.
    pub fn with_default_answer(mut self, answer: impl Into<String>) -> Self {
        self.default_answer = Some(answer.into());
        self
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// How many times the device list was read.
    pub fn imports(&self) -> usize {
        self.imports
    }

    pub fn into_session(self) -> S {
        self.session
    }
}

impl DebugScript<ScriptedSession> {
    /// Simulated run over a fresh [`ScriptedSession`].
    ///
    /// Every prompt is answered `dry-run`, and files go to
    /// `<output_dir>/dry-run` so they are never mistaken for real captures.
    pub fn dry_run(global: GlobalSettings) -> Self {
        let output = OutputNamer::new(global.output_dir.join(DRY_RUN_DIR), &global.date_format);
        Self::new(ScriptedSession::new(), global)
            .with_output(output)
            .with_default_answer("dry-run")
    }
}

impl<S: Session> ScriptEnvironment for DebugScript<S> {
    type Session = S;

    fn session(&mut self) -> &mut S {
        &mut self.session
    }

    fn settings(&mut self) -> &mut SettingsStore {
        &mut self.settings
    }

    fn prompt(&mut self, message: &str, hide_input: bool) -> Result<String> {
        self.prompts.push(message.to_string());
        let answer = self
            .answers
            .pop_front()
            .or_else(|| self.default_answer.clone())
            .ok_or_else(|| ScriptError::Prompt(format!("No answer scripted for {:?}", message)))?;

        if hide_input {
            info!("[dry run] {} ********", message);
        } else {
            info!("[dry run] {} {}", message, answer);
        }
        Ok(answer)
    }

    fn import_device_list(&mut self) -> Result<Vec<DeviceRecord>> {
        self.imports += 1;
        debug!("Using {} in-memory devices", self.devices.len());
        Ok(self.devices.clone())
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
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_answers_then_default() {
        let mut env = DebugScript::new(ScriptedSession::new(), GlobalSettings::default())
            .with_answers(["jump1"])
            .with_default_answer("x");

        assert_eq!(env.prompt("host?", false).unwrap(), "jump1");
        assert_eq!(env.prompt("user?", false).unwrap(), "x");
        assert_eq!(env.prompts(), ["host?", "user?"]);
    }

    #[test]
    fn test_unanswered_prompt_fails() {
        let mut env = DebugScript::new(ScriptedSession::new(), GlobalSettings::default());
        let err = env.prompt("host?", false).unwrap_err();
        assert!(matches!(err, Error::Script(ScriptError::Prompt(_))));
    }

    #[test]
    fn test_prompt_required_rejects_blank() {
        let mut env = DebugScript::new(ScriptedSession::new(), GlobalSettings::default())
            .with_answers(["   ", " jump1 "]);

        let err = env.prompt_required("host?", "jump host", false).unwrap_err();
        assert!(matches!(
            err,
            Error::Script(ScriptError::MissingInput { ref field }) if field == "jump host"
        ));
        assert_eq!(env.prompt_required("host?", "jump host", false).unwrap(), "jump1");
    }

    #[test]
    fn test_device_list_asks_once_for_default_credentials() {
        let csv = "hostname,protocol,username,password\n\
                   r1,ssh,,\n\
                   r2,telnet,,\n\
                   r3,ssh,own,ownpw\n";
        let devices = crate::inventory::read(csv.as_bytes()).unwrap();
        let mut env = DebugScript::new(ScriptedSession::new(), GlobalSettings::default())
            .with_devices(devices)
            .with_answers(["ops", "opspw"]);

        let devices = env.device_list().unwrap();
        assert_eq!(env.prompts().len(), 2);
        assert_eq!(devices[0].username, "ops");
        assert_eq!(devices[1].username, "ops");
        assert_eq!(devices[2].username, "own");
        assert_eq!(env.imports(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_writes_under_its_own_dir() {
        let dir = tempfile::tempdir().unwrap();
        let global = GlobalSettings {
            output_dir: dir.path().to_path_buf(),
            ..GlobalSettings::default()
        };
        let devices =
            crate::inventory::read("hostname,protocol,username,password\nr1,ssh,admin,pw\n".as_bytes())
                .unwrap();
        let mut env = DebugScript::dry_run(global).with_devices(devices);
        assert_eq!(env.output().dir(), dir.path().join(DRY_RUN_DIR));

        let summary = crate::runner::sweep(&mut env).await.unwrap();
        assert_eq!(summary.succeeded, 1);

        let top: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(top, [DRY_RUN_DIR]);

        let captures: Vec<String> = std::fs::read_dir(dir.path().join(DRY_RUN_DIR))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(captures.len(), 1);
        assert!(captures[0].starts_with("r1-cdp-neighbors-"));
    }
}
