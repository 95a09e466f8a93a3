//! Durable JSON state files.
//!
//! State is small (failure records, progress counters) and owned exclusively
//! by this process, so it is serialized wholesale on every save. Writes go
//! to a temp file in the same directory followed by a rename, so a crash
//! mid-write can never leave a half-written store behind.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// One JSON-serialized value persisted at a fixed path.
pub struct StateFile<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T> StateFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted value.
    ///
    /// A missing file is a normal first start and a corrupt file is never
    /// fatal; both yield the default value (corruption with a warning).
    pub fn load(&self) -> T {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {:?}, starting fresh", self.path);
                return T::default();
            }
            Err(e) => {
                warn!(
                    "Failed to read state file {:?}: {}, starting fresh",
                    self.path, e
                );
                return T::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    "State file {:?} is corrupt: {}, starting fresh",
                    self.path, e
                );
                T::default()
            }
        }
    }

    /// Persist `value` atomically (write to temp file, then rename).
    pub fn save(&self, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value).context("Failed to serialize state")?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory {:?}", dir))?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {:?}", dir))?;
        std::io::Write::write_all(&mut temp, json.as_bytes())
            .context("Failed to write state to temp file")?;
        temp.persist(&self.path)
            .with_context(|| format!("Failed to replace state file {:?}", self.path))?;

        Ok(())
    }
}
