//! Device list loading.
//!
//! The list is a CSV file with a header row. Recognised columns are
//! `hostname`, `protocol`, `username`, `password` and `enable`, matched
//! case-insensitively; anything else is ignored.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

use log::{debug, warn};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::InventoryError;

/// How to reach a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Ssh,
    Telnet,
}

impl FromStr for Protocol {
    type Err = InventoryError;

    /// `ssh`, `ssh1` and `ssh2` all mean SSH.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if lower.contains("ssh") {
            Ok(Self::Ssh)
        } else if lower == "telnet" {
            Ok(Self::Telnet)
        } else {
            Err(InventoryError::UnknownProtocol(s.trim().to_string()))
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ssh => write!(f, "SSH"),
            Self::Telnet => write!(f, "Telnet"),
        }
    }
}

/// One device to visit.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub hostname: String,
    pub protocol: Protocol,
    pub username: String,
    pub password: SecretString,
    pub enable: Option<SecretString>,
}

impl DeviceRecord {
    /// Whether the row left the username or password blank.
    pub fn lacks_credentials(&self) -> bool {
        self.username.is_empty() || self.password.expose_secret().is_empty()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Row {
    hostname: String,
    protocol: String,
    username: String,
    password: String,
    enable: String,
}

/// Load the device list at `path`.
///
/// A missing file is not an error: it yields an empty list so the batch
/// has nothing to do.
pub fn load(path: &Path) -> Result<Vec<DeviceRecord>, InventoryError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("Device list {} does not exist", path.display());
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(InventoryError::Csv {
                path: path.to_path_buf(),
                source: e.into(),
            });
        }
    };

    let devices = read(file).map_err(|source| InventoryError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Loaded {} devices from {}", devices.len(), path.display());
    Ok(devices)
}

/// Parse a device list. Rows that cannot be used are skipped with a warning.
pub fn read<R: Read>(reader: R) -> Result<Vec<DeviceRecord>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers: csv::StringRecord = reader
        .headers()?
        .iter()
        .map(|h| h.to_ascii_lowercase())
        .collect();
    reader.set_headers(headers);

    let mut devices = Vec::new();
    for (idx, result) in reader.deserialize::<Row>().enumerate() {
        // Line 1 is the header
        let line = idx + 2;
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                warn!("Skipping device list row {}: {}", line, e);
                continue;
            }
        };
        match into_record(row) {
            Ok(device) => devices.push(device),
            Err(reason) => warn!("Skipping device list row {}: {}", line, reason),
        }
    }
    Ok(devices)
}

fn into_record(row: Row) -> Result<DeviceRecord, String> {
    if row.hostname.is_empty() {
        return Err("no hostname".to_string());
    }
    let protocol = row.protocol.parse::<Protocol>().map_err(|e| e.to_string())?;
    let enable = (!row.enable.is_empty()).then(|| SecretString::from(row.enable));

    Ok(DeviceRecord {
        hostname: row.hostname,
        protocol,
        username: row.username,
        password: SecretString::from(row.password),
        enable,
    })
}

/// Fill blank usernames and passwords with operator-supplied defaults.
pub fn apply_default_credentials(
    devices: &mut [DeviceRecord],
    username: &str,
    password: &SecretString,
) {
    for device in devices.iter_mut() {
        if device.username.is_empty() {
            device.username = username.to_string();
        }
        if device.password.expose_secret().is_empty() {
            device.password = password.clone();
        }
    }
}
