//! # Progress Persistence
//!
//! Lifetime progress lives in a single JSON file holding one entry per
//! user id, so several singers can share an installation.
//!
//! ## Features
//! - A missing file reads as fresh, empty progress
//! - Writes go to a sibling temp file that is renamed over the target,
//!   so an interrupted save leaves the previous file intact
//! - Entries of other users are preserved on save
//! - `FlushTimer` bounds how often the analysis loop asks for a save

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::error::StorageError;
use crate::progress::LifetimeProgress;

/// User id used when the host does not supply one.
pub const DEFAULT_USER: &str = "default";

type ProgressFile = BTreeMap<String, LifetimeProgress>;

/// One user's slot in a progress file.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
    user: String,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>, user: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            user: user.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Reads this user's progress.
    ///
    /// # Returns
    /// * `Ok(progress)` - Stored progress, or the default when the file
    ///   or the user entry does not exist yet
    /// * `Err(e)` - The file exists but could not be read or parsed
    pub fn load(&self) -> Result<LifetimeProgress, StorageError> {
        let progress = self.read_all()?.remove(&self.user).unwrap_or_default();
        info!(
            "[STORAGE] Loaded progress for `{}`: {} xp",
            self.user, progress.xp
        );
        Ok(progress)
    }

    /// Replaces this user's entry and writes the file atomically.
    pub fn save(&self, progress: &LifetimeProgress) -> Result<(), StorageError> {
        let mut all = self.read_all()?;
        all.insert(self.user.clone(), progress.clone());
        let json = serde_json::to_string_pretty(&all)?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| self.io_error(source))?;
        }

        let tmp = self.temp_path();
        fs::write(&tmp, json).map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| self.io_error(source))?;

        debug!("[STORAGE] Saved progress for `{}` to {}", self.user, self.path.display());
        Ok(())
    }

    fn read_all(&self) -> Result<ProgressFile, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(data) if data.trim().is_empty() => Ok(ProgressFile::new()),
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ProgressFile::new()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "progress".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Tells the analysis loop when a periodic save is due.
#[derive(Debug, Clone)]
pub struct FlushTimer {
    interval: Duration,
    last: Option<Instant>,
}

impl FlushTimer {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// True at most once per interval. The first call only arms the
    /// timer.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.last {
            None => {
                self.last = Some(now);
                false
            }
            Some(last) if now.saturating_duration_since(last) >= self.interval => {
                self.last = Some(now);
                true
            }
            Some(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("vocal_trainer_storage_tests");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    #[test]
    fn missing_file_loads_default() {
        let store = ProgressStore::new(scratch_file("missing.json"), "anna");
        assert_eq!(store.load().unwrap(), LifetimeProgress::default());
    }

    #[test]
    fn save_then_load_keeps_other_users() {
        let path = scratch_file("shared.json");
        let anna = ProgressStore::new(&path, "anna");
        let boris = ProgressStore::new(&path, "boris");

        let mut progress = LifetimeProgress::default();
        progress.xp = 42;
        anna.save(&progress).unwrap();

        let mut other = LifetimeProgress::default();
        other.last_practice_day = Some("2024-05-01".into());
        boris.save(&other).unwrap();

        assert_eq!(anna.load().unwrap().xp, 42);
        assert_eq!(boris.load().unwrap(), other);
        assert!(!path.with_file_name("shared.json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_an_error_and_is_not_overwritten() {
        let path = scratch_file("corrupt.json");
        fs::write(&path, "{ not json").unwrap();
        let store = ProgressStore::new(&path, "anna");

        assert!(matches!(store.load(), Err(StorageError::Serialize(_))));
        assert!(store.save(&LifetimeProgress::default()).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn flush_timer_fires_once_per_interval() {
        let mut timer = FlushTimer::new(Duration::from_secs(5));
        let t0 = Instant::now();
        assert!(!timer.due(t0));
        assert!(!timer.due(t0 + Duration::from_secs(4)));
        assert!(timer.due(t0 + Duration::from_secs(5)));
        assert!(!timer.due(t0 + Duration::from_secs(6)));
        assert!(timer.due(t0 + Duration::from_secs(10)));
    }
}
