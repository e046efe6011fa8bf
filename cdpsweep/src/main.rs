//! cdpsweep command line.
//!
//! ```bash
//! cdpsweep --devices devices.csv
//! cdpsweep --devices devices.csv --dry-run -v
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use cdpsweep::settings::DEFAULT_SETTINGS_FILE;
use cdpsweep::{
    ConsoleScript, DebugScript, GlobalSettings, Result, RunSummary, SettingsStore, inventory,
    runner,
};

const SCRIPT_NAME: &str = "cdpsweep";

/// Collect CDP neighbor details from a list of network devices.
#[derive(Parser, Debug)]
#[command(name = "cdpsweep", version, about)]
struct Args {
    /// Settings file, created with defaults if missing
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    settings: PathBuf,

    /// CSV device list (asked for if omitted)
    #[arg(long)]
    devices: Option<PathBuf>,

    /// Walk through the run without connecting to anything
    #[arg(long)]
    dry_run: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let settings = SettingsStore::load(&args.settings);
    let debug = args.verbose
        || settings
            .as_ref()
            .map(|s| s.global().debug_mode)
            .unwrap_or(false);
    let level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if settings.as_ref().is_ok_and(|s| s.created()) {
        info!("Created settings file {} with defaults", args.settings.display());
    }

    let result = match settings {
        Ok(settings) if args.dry_run => dry_run(settings, args.devices).await,
        Ok(settings) => {
            let mut env = ConsoleScript::new(SCRIPT_NAME, settings, args.devices);
            runner::sweep(&mut env).await
        }
        Err(e) => Err(e.into()),
    };

    let code = match result {
        Ok(summary) => {
            info!(
                "Done: {} of {} devices succeeded",
                summary.succeeded, summary.attempted
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    };

    log::logger().flush();
    code
}

/// Simulated run: the real device list and settings, but no connections,
/// no prompts and no settings written back. Files go to the `dry-run`
/// subdirectory of the output directory.
async fn dry_run(settings: SettingsStore, devices: Option<PathBuf>) -> Result<RunSummary> {
    let global: GlobalSettings = settings.global().clone();
    let devices = match devices {
        Some(path) => inventory::load(&path)?,
        None => Vec::new(),
    };
    info!("Dry run over {} devices", devices.len());

    let mut env = DebugScript::dry_run(global)
        .with_name(SCRIPT_NAME)
        .with_devices(devices);
    runner::sweep(&mut env).await
}
