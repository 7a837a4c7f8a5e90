//! Durable key-value persistence
//!
//! The core only needs string and bool slots under well-known keys. Two
//! adapters are provided: an in-memory map for tests and short-lived tools,
//! and a JSON file that is rewritten atomically (temp file + rename) on
//! every change.
//!
//! Writes are synchronous, fsync included. The status write happens on the
//! fix-processing path under the service state lock, so `clear` and
//! `shutdown` may wait for one in-flight write; StatusStore readers do not.
//! Transitions are rare, which keeps that wait to one write at most.

use crate::domain::{GeoError, GeoResult};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Last observed zone state
pub const KEY_LIVE_STATUS: &str = "live_status";
/// JSON-encoded active geofence definition (empty when cleared)
pub const KEY_ACTIVE_FENCE: &str = "active_fence";
pub const KEY_NAME: &str = "name";
pub const KEY_HOME_ADDRESS: &str = "home_address";
pub const KEY_EMERGENCY_CONTACT: &str = "emergency_contact";
pub const KEY_PROFILE_DONE: &str = "profile_done";

/// Simple durable key→value store of primitive values
pub trait Persistence: Send + Sync {
    fn get_string(&self, key: &str, default: &str) -> String;
    fn set_string(&self, key: &str, value: &str) -> GeoResult<()>;
    fn get_bool(&self, key: &str, default: bool) -> bool;
    fn set_bool(&self, key: &str, value: bool) -> GeoResult<()>;
}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Str(String),
    Bool(bool),
}

/// In-process persistence; survives only as long as the value
#[derive(Default)]
pub struct MemoryPersistence {
    slots: Mutex<HashMap<String, Slot>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for MemoryPersistence {
    fn get_string(&self, key: &str, default: &str) -> String {
        match self.slots.lock().get(key) {
            Some(Slot::Str(s)) => s.clone(),
            _ => default.to_string(),
        }
    }

    fn set_string(&self, key: &str, value: &str) -> GeoResult<()> {
        self.slots.lock().insert(key.to_string(), Slot::Str(value.to_string()));
        Ok(())
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.slots.lock().get(key) {
            Some(Slot::Bool(b)) => *b,
            _ => default,
        }
    }

    fn set_bool(&self, key: &str, value: bool) -> GeoResult<()> {
        self.slots.lock().insert(key.to_string(), Slot::Bool(value));
        Ok(())
    }
}

/// Persistence backed by a single JSON object file
pub struct FilePersistence {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl FilePersistence {
    /// Open the store, starting empty when the file is missing or unreadable
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Map<String, Value>>(&content) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "persistence_file_corrupt");
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "persistence_file_unreadable");
                Map::new()
            }
        };

        info!(path = %path.display(), keys = %values.len(), "persistence_opened");
        Self { path, values: Mutex::new(values) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn set_value(&self, key: &str, value: Value) -> GeoResult<()> {
        let mut values = self.values.lock();
        let previous = values.insert(key.to_string(), value);

        // Lock held across the write so the file never lags behind a later set
        if let Err(e) = self.write_file(&values) {
            match previous {
                Some(prev) => values.insert(key.to_string(), prev),
                None => values.remove(key),
            };
            warn!(path = %self.path.display(), key = %key, error = %e, "persistence_write_failed");
            return Err(GeoError::persistence(key, e));
        }
        Ok(())
    }

    fn write_file(&self, values: &Map<String, Value>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_vec_pretty(values)?;
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), bytes = %json.len(), "persistence_written");
        Ok(())
    }
}

impl Persistence for FilePersistence {
    fn get_string(&self, key: &str, default: &str) -> String {
        match self.values.lock().get(key) {
            Some(Value::String(s)) => s.clone(),
            _ => default.to_string(),
        }
    }

    fn set_string(&self, key: &str, value: &str) -> GeoResult<()> {
        self.set_value(key, Value::String(value.to_string()))
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.values.lock().get(key) {
            Some(Value::Bool(b)) => *b,
            _ => default,
        }
    }

    fn set_bool(&self, key: &str, value: bool) -> GeoResult<()> {
        self.set_value(key, Value::Bool(value))
    }
}
