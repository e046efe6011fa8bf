//! # cdpsweep
//!
//! Batch CDP neighbor collection across network devices.
//!
//! Reads a CSV device list, reaches each device over SSH or Telnet (either
//! directly or through one shared jump host), saves the output of
//! `show cdp neighbors detail`, and appends each device that failed to a
//! per-run log.
//!
//! ## Layers
//!
//! - [`transport`]: SSH (russh) and Telnet byte links
//! - [`channel`]: prompt-terminated reads with ANSI stripping
//! - [`session`]: the [`Session`] trait, live and simulated
//! - [`runner`]: the batch loop
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cdpsweep::{ConsoleScript, SettingsStore, runner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), cdpsweep::Error> {
//!     let settings = SettingsStore::load("cdpsweep.toml".as_ref())?;
//!     let mut env = ConsoleScript::new("cdpsweep", settings, Some("devices.csv".into()));
//!
//!     let summary = runner::sweep(&mut env).await?;
//!     println!("{} of {} devices done", summary.succeeded, summary.attempted);
//!     Ok(())
//! }
//! ```

pub mod cdp;
pub mod channel;
pub mod error;
pub mod inventory;
pub mod output;
pub mod runner;
pub mod script;
pub mod session;
pub mod settings;
pub mod transport;

pub use cdp::{CdpCapture, DeviceTask};
pub use error::{Error, Result, SessionError, SessionResult};
pub use inventory::{DeviceRecord, Protocol};
pub use output::{FailureLog, OutputNamer};
pub use runner::RunSummary;
pub use script::{ConsoleScript, DebugScript, ScriptEnvironment};
pub use session::{CliSession, ScriptedSession, Session, SessionCall, SessionConfig};
pub use settings::{GlobalSettings, SettingsStore};
