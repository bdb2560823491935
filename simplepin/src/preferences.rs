use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const STORAGE_DIR: &str = "simplepin";
const PREFERENCES_FILENAME: &str = "preferences.json";

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("preferences file is corrupt: {0}")]
    Json(#[from] serde_json::Error),
    #[error("configuration directory unavailable for preferences")]
    MissingConfigDir,
}

/// User toggles plus the last update time reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub mark_as_read: bool,
    pub open_links_external: bool,
    pub reader_mode: bool,
    pub private_by_default: bool,
    pub unread_by_default: bool,
    pub exact_date: bool,
    pub sort_tags: bool,
    pub last_update: Option<i64>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            mark_as_read: false,
            open_links_external: false,
            reader_mode: true,
            private_by_default: false,
            unread_by_default: false,
            exact_date: false,
            sort_tags: false,
            last_update: None,
        }
    }
}

/// JSON-file backed preferences. Every update is written through before returning.
pub struct PreferenceStore {
    path: PathBuf,
    current: Mutex<Preferences>,
}

impl PreferenceStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PreferencesError> {
        let path = path.into();
        let current = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Preferences::default(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            current: Mutex::new(current),
        })
    }

    pub fn open_default() -> Result<Self, PreferencesError> {
        Self::open(default_preferences_path()?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Preferences {
        self.current.lock().clone()
    }

    pub fn update(&self, apply: impl FnOnce(&mut Preferences)) -> Result<(), PreferencesError> {
        let mut current = self.current.lock();
        let mut next = current.clone();
        apply(&mut next);
        write_atomically(&self.path, &serde_json::to_vec_pretty(&next)?)?;
        *current = next;
        Ok(())
    }

    pub fn last_update(&self) -> Option<i64> {
        self.current.lock().last_update
    }

    pub fn record_last_update(&self, timestamp: i64) -> Result<(), PreferencesError> {
        self.update(|prefs| prefs.last_update = Some(timestamp))
    }

    /// Resets everything to defaults, as on logout.
    pub fn clear(&self) -> Result<(), PreferencesError> {
        self.update(|prefs| *prefs = Preferences::default())
    }
}

pub fn default_preferences_path() -> Result<PathBuf, PreferencesError> {
    let base = dirs::config_dir().ok_or(PreferencesError::MissingConfigDir)?;
    Ok(base.join(STORAGE_DIR).join(PREFERENCES_FILENAME))
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), PreferencesError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);
    fs::write(&partial, bytes)?;
    fs::rename(partial, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let store = PreferenceStore::open(dir.path().join("prefs.json")).unwrap();
        let prefs = store.snapshot();
        assert!(prefs.reader_mode);
        assert!(!prefs.mark_as_read);
        assert_eq!(prefs.last_update, None);
    }

    #[test]
    fn updates_persist_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");
        let store = PreferenceStore::open(&path).unwrap();
        store.update(|prefs| prefs.mark_as_read = true).unwrap();
        store.record_last_update(150).unwrap();

        let reopened = PreferenceStore::open(&path).unwrap();
        assert!(reopened.snapshot().mark_as_read);
        assert_eq!(reopened.last_update(), Some(150));
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, br#"{"open_links_external": true}"#).unwrap();

        let prefs = PreferenceStore::open(&path).unwrap().snapshot();
        assert!(prefs.open_links_external);
        assert!(prefs.reader_mode);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            PreferenceStore::open(&path),
            Err(PreferencesError::Json(_))
        ));
    }

    #[test]
    fn clear_restores_defaults() {
        let dir = tempdir().unwrap();
        let store = PreferenceStore::open(dir.path().join("prefs.json")).unwrap();
        store.update(|prefs| prefs.sort_tags = true).unwrap();
        store.record_last_update(9).unwrap();
        store.clear().unwrap();
        assert_eq!(store.snapshot(), Preferences::default());
    }
}
