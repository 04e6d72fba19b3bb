use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Session field names persisted through the host's settings storage.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const EXPIRY_TIME: &str = "expiry_time";
    pub const CATALOG_REGION: &str = "catalog_region";
    pub const MAX_BITRATE: &str = "max_bitrate";
    pub const HIRES_ENABLED: &str = "hires_enabled";
}

/// Key-value storage for session credentials, injected by the host.
/// The provider reads and writes only the keys in [`keys`].
pub trait SessionStore: Send + Sync {
    fn read(&self, key: &str) -> Option<String>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
}

pub fn read_i64(store: &dyn SessionStore, key: &str) -> Option<i64> {
    store.read(key)?.parse().ok()
}

pub fn read_u32(store: &dyn SessionStore, key: &str) -> Option<u32> {
    store.read(key)?.parse().ok()
}

pub fn read_bool(store: &dyn SessionStore, key: &str) -> Option<bool> {
    store.read(key)?.parse().ok()
}

/// In-memory store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn read(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .map_err(|e| Error::Store(e.to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// File-backed store keeping the session fields as a flat JSON object,
/// used by the CLI. The whole map is rewritten on every update; the session
/// has six small fields so this is cheap.
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Open a store at `path`, loading any previously persisted fields.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s)
                .map_err(|e| Error::Store(format!("parse {}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(Error::Store(format!("read {}: {}", path.display(), e))),
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    fn flush(path: &Path, values: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Store(format!("create {}: {}", parent.display(), e)))?;
        }
        let json = serde_json::to_string_pretty(values)
            .map_err(|e| Error::Store(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| Error::Store(format!("write {}: {}", path.display(), e)))
    }
}

impl SessionStore for JsonFileStore {
    fn read(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| Error::Store(e.to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Self::flush(&self.path, &values)
    }
}
