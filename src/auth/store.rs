/// File-backed credential store
/// One JSON object maps provider keys to credential records. Every call
/// re-reads the file, so the file is the single source of truth.
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result;
use crate::types::CredentialRecord;

#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.storage.store_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All well-formed records. A missing or corrupt file reads as empty.
    pub fn load_all(&self) -> HashMap<String, CredentialRecord> {
        self.load_raw()
            .into_iter()
            .filter_map(|(key, value)| {
                serde_json::from_value::<CredentialRecord>(value)
                    .ok()
                    .map(|record| (key, record))
            })
            .collect()
    }

    /// Record for `key`, or `None` if missing or malformed.
    pub fn get(&self, key: &str) -> Option<CredentialRecord> {
        let value = self.load_raw().remove(key)?;
        match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(key, error = %e, "stored credential has an invalid shape");
                None
            }
        }
    }

    /// Replace the record for `key` and persist the whole mapping.
    pub fn set(&self, key: &str, record: &CredentialRecord) -> Result<()> {
        let mut data = self.load_raw();
        data.insert(key.to_string(), serde_json::to_value(record)?);
        self.write_atomic(&data)?;
        debug!(key, path = %self.path.display(), "stored credential");
        Ok(())
    }

    /// Drop the record for `key`. Returns whether anything was removed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let mut data = self.load_raw();
        if data.remove(key).is_none() {
            return Ok(false);
        }
        self.write_atomic(&data)?;
        debug!(key, "removed credential");
        Ok(true)
    }

    /// Raw JSON object, keeping entries we cannot decode so a write for one
    /// provider never drops another provider's data.
    fn load_raw(&self) -> Map<String, Value> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(_) => return Map::new(),
        };
        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!(path = %self.path.display(), "credential file is corrupt, treating as empty");
                Map::new()
            }
        }
    }

    /// Write to a sibling temp file, restrict it to 0600, then rename over
    /// the target so readers never observe a partial file.
    fn write_atomic(&self, data: &Map<String, Value>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(data)?;
        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("auth.json");
        let tmp_path = dir.join(format!(".{}.tmp.{}", file_name, std::process::id()));

        let written = create_private(&tmp_path).and_then(|mut file| {
            file.write_all(json.as_bytes())?;
            file.sync_all()
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600)) {
                warn!(path = %tmp_path.display(), error = %e, "could not restrict credential file permissions");
            }
        }

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        Ok(())
    }
}

/// Open a fresh file that is owner-only from the moment it exists.
fn create_private(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}
