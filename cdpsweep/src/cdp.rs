//! Per-device work: capture CDP neighbor details.

use std::future::Future;

use log::info;
use secrecy::SecretString;

use crate::error::{Result, SessionError};
use crate::output::OutputNamer;
use crate::session::Session;

/// Command whose output is captured.
pub const CDP_COMMAND: &str = "show cdp neighbors detail";

/// Device replies that mean the capture cannot work.
const FAILURE_MARKERS: [&str; 2] = ["% CDP is not enabled", "% Invalid input"];

/// Work done on each device once its session is up.
///
/// The task must leave the session at the device prompt, connected, so
/// the runner can tear it down cleanly.
pub trait DeviceTask<S: Session> {
    fn run(
        &mut self,
        session: &mut S,
        enable_secret: Option<&SecretString>,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Saves the raw `show cdp neighbors detail` output of each device.
#[derive(Debug, Clone)]
pub struct CdpCapture {
    output: OutputNamer,
}

impl CdpCapture {
    pub fn new(output: OutputNamer) -> Self {
        Self { output }
    }
}

impl<S: Session> DeviceTask<S> for CdpCapture {
    async fn run(&mut self, session: &mut S, enable_secret: Option<&SecretString>) -> Result<()> {
        session.start_cisco_session(enable_secret).await?;
        let raw = session.get_command_output(CDP_COMMAND).await?;

        if let Some(line) = raw
            .lines()
            .map(str::trim)
            .find(|l| FAILURE_MARKERS.iter().any(|m| l.starts_with(m)))
        {
            return Err(SessionError::interaction(line).into());
        }

        let hostname = session.hostname().unwrap_or("unknown").to_string();
        let path = self.output.filename("cdp-neighbors", Some(&hostname), "txt");
        tokio::fs::create_dir_all(self.output.dir()).await?;
        tokio::fs::write(&path, raw).await?;

        info!("Saved CDP neighbors of {} to {}", hostname, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::session::{ScriptedSession, SessionCall};

    const NEIGHBORS: &str = "-------------------------\n\
                             Device ID: sw1.example.net\n\
                             Entry address(es):\n  IP address: 10.0.0.2\n";

    #[tokio::test]
    async fn test_capture_writes_raw_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut task = CdpCapture::new(OutputNamer::with_stamp(dir.path(), "t0"));
        let mut session =
            ScriptedSession::connected_to("r1").with_output(CDP_COMMAND, NEIGHBORS);

        task.run(&mut session, None).await.unwrap();

        let saved = std::fs::read_to_string(dir.path().join("r1-cdp-neighbors-t0.txt")).unwrap();
        assert_eq!(saved, NEIGHBORS);
        assert!(matches!(
            session.calls(),
            [
                SessionCall::StartCiscoSession { .. },
                SessionCall::Command { command, .. }
            ] if command == CDP_COMMAND
        ));
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_cdp_disabled_is_interaction_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut task = CdpCapture::new(OutputNamer::with_stamp(dir.path(), "t0"));
        let mut session = ScriptedSession::connected_to("r1")
            .with_output(CDP_COMMAND, "% CDP is not enabled\n");

        let err = task.run(&mut session, None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Session(SessionError::Interaction { ref message }) if message == "% CDP is not enabled"
        ));
        assert!(!dir.path().join("r1-cdp-neighbors-t0.txt").exists());
    }
}
