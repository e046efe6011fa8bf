//! Persisted settings.
//!
//! Settings live in a TOML file under a `[global]` table. Values typed in
//! by the operator (jump host, user, prompt ending) are written back so the
//! next run does not ask again. Passwords have no field here and so can
//! never be saved.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;
use crate::transport::HostKeyVerification;

/// Default file name, next to wherever the tool is run from.
pub const DEFAULT_SETTINGS_FILE: &str = "cdpsweep.toml";

/// The `[global]` settings table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    /// Directory for the failure log and capture files
    pub output_dir: PathBuf,

    /// chrono format used in output file names
    pub date_format: String,

    /// Log at debug level
    pub debug_mode: bool,

    /// Reach devices through a jump host
    pub use_jumpbox: bool,

    pub jumpbox_host: String,
    pub jumpbox_user: String,

    /// Last character(s) of the jump host's shell prompt
    pub jumpbox_prompt_end: String,

    /// Timeout for connects and each prompt wait
    pub timeout_secs: u64,

    pub host_key_checking: HostKeyVerification,

    /// known_hosts file to use in place of `~/.ssh/known_hosts`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub known_hosts_path: Option<PathBuf>,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            date_format: "%Y-%m-%d-%H-%M-%S".to_string(),
            debug_mode: false,
            use_jumpbox: false,
            jumpbox_host: String::new(),
            jumpbox_user: String::new(),
            jumpbox_prompt_end: String::new(),
            timeout_secs: 30,
            host_key_checking: HostKeyVerification::default(),
            known_hosts_path: None,
        }
    }
}

impl GlobalSettings {
    /// Jump host, if set.
    pub fn jumpbox_host(&self) -> Option<&str> {
        non_empty(&self.jumpbox_host)
    }

    /// Jump host user, if set.
    pub fn jumpbox_user(&self) -> Option<&str> {
        non_empty(&self.jumpbox_user)
    }

    /// Jump host prompt ending, if set.
    pub fn jumpbox_prompt_end(&self) -> Option<&str> {
        non_empty(&self.jumpbox_prompt_end)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    global: GlobalSettings,
}

/// Settings plus where they are saved.
#[derive(Debug)]
pub struct SettingsStore {
    /// Backing file, `None` for in-memory settings.
    path: Option<PathBuf>,
    global: GlobalSettings,

    /// The backing file was missing and has just been written.
    created: bool,
}

impl SettingsStore {
    /// Load settings from `path`, creating the file with defaults if absent.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            let store = Self {
                path: Some(path.to_path_buf()),
                global: GlobalSettings::default(),
                created: true,
            };
            store.save()?;
            return Ok(store);
        }

        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: SettingsFile = toml::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        debug!("Loaded settings from {}", path.display());
        Ok(Self {
            path: Some(path.to_path_buf()),
            global: file.global,
            created: false,
        })
    }

    /// Settings that are never written anywhere.
    pub fn in_memory(global: GlobalSettings) -> Self {
        Self {
            path: None,
            global,
            created: false,
        }
    }

    pub fn global(&self) -> &GlobalSettings {
        &self.global
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether `load` found no file and wrote the defaults.
    pub fn created(&self) -> bool {
        self.created
    }

    /// Change settings and save them straight away.
    pub fn update<F>(&mut self, change: F) -> Result<(), SettingsError>
    where
        F: FnOnce(&mut GlobalSettings),
    {
        change(&mut self.global);
        self.save()
    }

    fn save(&self) -> Result<(), SettingsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let file = SettingsFile {
            global: self.global.clone(),
        };
        let content = toml::to_string_pretty(&file)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| SettingsError::Io {
            path: path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("cdpsweep.toml");

        let store = SettingsStore::load(&path).unwrap();
        assert_eq!(store.global(), &GlobalSettings::default());
        assert!(store.created());
        assert!(path.exists());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[global]"));
        assert!(content.contains("use_jumpbox = false"));
        assert!(!content.contains("known_hosts_path"));

        let reloaded = SettingsStore::load(&path).unwrap();
        assert!(!reloaded.created());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cdpsweep.toml");
        std::fs::write(
            &path,
            "[global]\nuse_jumpbox = true\njumpbox_host = \"\"\nhost_key_checking = \"strict\"\n\
             known_hosts_path = \"/etc/cdpsweep/known_hosts\"\n",
        )
        .unwrap();

        let store = SettingsStore::load(&path).unwrap();
        let global = store.global();
        assert!(global.use_jumpbox);
        assert_eq!(global.jumpbox_host(), None);
        assert_eq!(global.timeout(), Duration::from_secs(30));
        assert_eq!(global.host_key_checking, HostKeyVerification::Strict);
        assert_eq!(
            global.known_hosts_path.as_deref(),
            Some(Path::new("/etc/cdpsweep/known_hosts"))
        );
    }

    #[test]
    fn test_update_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cdpsweep.toml");

        let mut store = SettingsStore::load(&path).unwrap();
        store
            .update(|g| {
                g.jumpbox_host = "jump.example.net".to_string();
                g.jumpbox_user = "ops".to_string();
            })
            .unwrap();

        let reloaded = SettingsStore::load(&path).unwrap();
        assert_eq!(reloaded.global().jumpbox_host(), Some("jump.example.net"));
        assert_eq!(reloaded.global().jumpbox_user(), Some("ops"));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("password"));
    }

    #[test]
    fn test_invalid_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cdpsweep.toml");
        std::fs::write(&path, "[global]\ntimeout_secs = \"soon\"\n").unwrap();

        let err = SettingsStore::load(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }

    #[test]
    fn test_in_memory_update_writes_nothing() {
        let mut store = SettingsStore::in_memory(GlobalSettings::default());
        store.update(|g| g.jumpbox_prompt_end = "$".to_string()).unwrap();
        assert_eq!(store.global().jumpbox_prompt_end(), Some("$"));
        assert!(store.path().is_none());
    }
}
