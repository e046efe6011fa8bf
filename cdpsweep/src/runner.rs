//! The batch loop.
//!
//! Devices are visited one at a time, in list order, either directly or
//! through a single jump host connection that is reused between devices.
//! A device that fails is written to the failure log and the loop moves
//! on. Whatever happens, the session ends disconnected.

use log::{debug, error, info, warn};
use secrecy::SecretString;

use crate::cdp::{CdpCapture, DeviceTask};
use crate::error::{Error, Result, ScriptError};
use crate::inventory::{DeviceRecord, Protocol};
use crate::output::FailureLog;
use crate::script::ScriptEnvironment;
use crate::session::Session;

/// Outcome of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    /// Hostname and failure message of each failed device, in list order.
    pub failed: Vec<(String, String)>,
}

/// Jump host details, resolved once per run.
struct JumpHost {
    host: String,
    username: String,
    password: SecretString,
    prompt_end: String,
}

/// Capture CDP neighbors from every device in the environment's list.
pub async fn sweep<E: ScriptEnvironment>(env: &mut E) -> Result<RunSummary> {
    let namer = env.output().clone();
    let log_name = format!("{}-LOG", env.script_name());
    let mut failures = FailureLog::new(namer.filename(&log_name, None, "txt"));
    let mut task = CdpCapture::new(namer);

    let summary = run(env, &mut task, &mut failures).await?;
    if failures.entries() > 0 {
        warn!(
            "{} devices failed, see {}",
            failures.entries(),
            failures.path().display()
        );
    }
    Ok(summary)
}

/// Run `task` on every device, recording failures in `failures`.
pub async fn run<E, T>(env: &mut E, task: &mut T, failures: &mut FailureLog) -> Result<RunSummary>
where
    E: ScriptEnvironment,
    T: DeviceTask<E::Session>,
{
    if env.session().is_connected() {
        return Err(ScriptError::AlreadyConnected.into());
    }

    let devices = env.device_list()?;
    if devices.is_empty() {
        info!("No devices to process");
        return Ok(RunSummary::default());
    }

    let jump = if env.settings().global().use_jumpbox {
        Some(resolve_jump_host(env)?)
    } else {
        None
    };

    let mut summary = RunSummary::default();
    let mut jump_connected = false;

    for device in &devices {
        summary.attempted += 1;
        let session = env.session();

        let outcome = match &jump {
            Some(jump) => {
                debug!("Connecting to {} via {}", device.hostname, jump.host);
                visit_via_jump(session, task, device, jump, &mut jump_connected).await
            }
            None => {
                debug!("Connecting to {}", device.hostname);
                visit_direct(session, task, device).await
            }
        };

        match outcome {
            Ok(()) => summary.succeeded += 1,
            Err(Error::Session(failure)) => {
                warn!("{}: {}", device.hostname, failure);
                if let Err(e) = failures.record(&device.hostname, &failure) {
                    abort(session).await;
                    return Err(e.into());
                }
                summary
                    .failed
                    .push((device.hostname.clone(), failure.message().to_string()));
            }
            Err(fatal) => {
                error!("Aborting at {}: {}", device.hostname, fatal);
                abort(session).await;
                return Err(fatal);
            }
        }
    }

    if jump_connected {
        debug!("Closing jump host connection");
        env.session().disconnect().await;
    }

    info!(
        "Processed {} devices: {} succeeded, {} failed",
        summary.attempted,
        summary.succeeded,
        summary.failed.len()
    );
    Ok(summary)
}

async fn abort<S: Session>(session: &mut S) {
    if session.is_connected() {
        session.disconnect().await;
    }
}

/// Connect, run, disconnect. The session is closed even after a failure.
async fn visit_direct<S, T>(session: &mut S, task: &mut T, device: &DeviceRecord) -> Result<()>
where
    S: Session,
    T: DeviceTask<S>,
{
    let result = match session
        .connect(
            &device.hostname,
            &device.username,
            &device.password,
            device.protocol,
        )
        .await
    {
        Ok(()) => task.run(session, device.enable.as_ref()).await,
        Err(e) => Err(e.into()),
    };
    session.disconnect().await;
    result
}

/// Hop to the device from the jump host and back.
///
/// Any failure closes the whole session, jump leg included, so the next
/// device starts from a fresh jump connection.
async fn visit_via_jump<S, T>(
    session: &mut S,
    task: &mut T,
    device: &DeviceRecord,
    jump: &JumpHost,
    jump_connected: &mut bool,
) -> Result<()>
where
    S: Session,
    T: DeviceTask<S>,
{
    let result = hop_and_run(session, task, device, jump, jump_connected).await;
    if result.is_err() {
        session.disconnect().await;
        *jump_connected = false;
    }
    result
}

async fn hop_and_run<S, T>(
    session: &mut S,
    task: &mut T,
    device: &DeviceRecord,
    jump: &JumpHost,
    jump_connected: &mut bool,
) -> Result<()>
where
    S: Session,
    T: DeviceTask<S>,
{
    if !*jump_connected {
        session
            .connect_ssh(
                &jump.host,
                &jump.username,
                &jump.password,
                std::slice::from_ref(&jump.prompt_end),
            )
            .await?;
        *jump_connected = true;
    }

    match device.protocol {
        Protocol::Ssh => {
            session
                .ssh_via_jump(&device.hostname, &device.username, &device.password)
                .await?
        }
        Protocol::Telnet => {
            session
                .telnet_via_jump(&device.hostname, &device.username, &device.password)
                .await?
        }
    }

    task.run(session, device.enable.as_ref()).await?;
    session.disconnect_via_jump().await?;
    Ok(())
}

/// Settle the jump host from settings, asking for whatever is missing.
///
/// Host, user and prompt ending are saved once supplied. The password is
/// asked for every run.
fn resolve_jump_host<E: ScriptEnvironment>(env: &mut E) -> Result<JumpHost> {
    let global = env.settings().global().clone();

    let host = match global.jumpbox_host() {
        Some(host) => host.to_string(),
        None => {
            let host = env.prompt_required(
                "Enter the HOSTNAME or IP of the jump host",
                "jump host",
                false,
            )?;
            env.settings().update(|g| g.jumpbox_host = host.clone())?;
            host
        }
    };

    let username = match global.jumpbox_user() {
        Some(user) => user.to_string(),
        None => {
            let user = env.prompt_required(
                &format!("JUMP HOST: Enter the USERNAME for {}", host),
                "jump host username",
                false,
            )?;
            env.settings().update(|g| g.jumpbox_user = user.clone())?;
            user
        }
    };

    let password = env.prompt_required(
        &format!("JUMP HOST: Enter the PASSWORD for {}", username),
        "jump host password",
        true,
    )?;

    let prompt_end = match global.jumpbox_prompt_end() {
        Some(end) => end.to_string(),
        None => {
            let end = env.prompt_required(
                "Enter the last character of the jump host prompt",
                "jump host prompt ending",
                false,
            )?;
            env.settings().update(|g| g.jumpbox_prompt_end = end.clone())?;
            end
        }
    };

    Ok(JumpHost {
        host,
        username,
        password: SecretString::from(password),
        prompt_end,
    })
}
