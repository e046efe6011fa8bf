//! Output file naming and the per-run failure log.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{debug, warn};

use crate::error::SessionError;

const FALLBACK_DATE_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Builds timestamped file names in the output directory.
///
/// The timestamp is taken once, so every file of a run shares it.
#[derive(Debug, Clone)]
pub struct OutputNamer {
    dir: PathBuf,
    stamp: String,
}

impl OutputNamer {
    /// Stamp the current local time with a chrono format string.
    pub fn new(dir: impl Into<PathBuf>, date_format: &str) -> Self {
        let now = Local::now();
        let mut stamp = String::new();
        if write!(stamp, "{}", now.format(date_format)).is_err() {
            warn!(
                "Invalid date format {:?}, using {:?}",
                date_format, FALLBACK_DATE_FORMAT
            );
            stamp = now.format(FALLBACK_DATE_FORMAT).to_string();
        }
        Self::with_stamp(dir, stamp)
    }

    /// Use a fixed timestamp.
    pub fn with_stamp(dir: impl Into<PathBuf>, stamp: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stamp: stamp.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/[<hostname>-]<desc>-<stamp>.<ext>`
    pub fn filename(&self, desc: &str, hostname: Option<&str>, ext: &str) -> PathBuf {
        let name = match hostname {
            Some(host) => format!("{}-{}-{}.{}", host, desc, self.stamp, ext),
            None => format!("{}-{}.{}", desc, self.stamp, ext),
        };
        self.dir.join(name)
    }
}

/// Append-only record of devices that failed.
///
/// The file is only created when the first failure is recorded, and is
/// opened and closed again for every line.
#[derive(Debug)]
pub struct FailureLog {
    path: PathBuf,
    entries: usize,
}

impl FailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines written so far by this log.
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Record a device failure, worded by kind.
    pub fn record(&mut self, hostname: &str, error: &SessionError) -> io::Result<()> {
        let line = match error {
            SessionError::Connect { message } => {
                format!("Connect to {} failed: {}", hostname, message)
            }
            SessionError::Interaction { message } => {
                format!("Failure on {}: {}", hostname, message)
            }
        };
        self.append(&line)
    }

    fn append(&mut self, line: &str) -> io::Result<()> {
        if self.entries == 0 {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            debug!("Writing failures to {}", self.path.display());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        self.entries += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_with_and_without_host() {
        let namer = OutputNamer::with_stamp("/tmp/out", "2024-03-04-10-00-00");
        assert_eq!(
            namer.filename("cdp-neighbors", Some("r1"), "txt"),
            PathBuf::from("/tmp/out/r1-cdp-neighbors-2024-03-04-10-00-00.txt")
        );
        assert_eq!(
            namer.filename("cdpsweep-LOG", None, "txt"),
            PathBuf::from("/tmp/out/cdpsweep-LOG-2024-03-04-10-00-00.txt")
        );
    }

    #[test]
    fn test_invalid_date_format_falls_back() {
        let namer = OutputNamer::new(".", "%Q");
        let name = namer.filename("x", None, "txt");
        let name = name.file_name().unwrap().to_string_lossy().to_string();
        // x-YYYY-mm-dd-HH-MM-SS.txt
        assert_eq!(name.len(), "x-".len() + 19 + ".txt".len());
    }

    #[test]
    fn test_failure_log_is_lazy_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run-LOG.txt");
        let mut log = FailureLog::new(&path);
        assert!(!path.exists());

        log.record("r1", &SessionError::connect("Connection refused"))
            .unwrap();
        log.record("r2", &SessionError::interaction("% Invalid input"))
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "Connect to r1 failed: Connection refused\nFailure on r2: % Invalid input\n"
        );
        assert_eq!(log.entries(), 2);
    }
}
