//! Durable keyed storage for subscription records.
//!
//! The store itself is a dumb load/save pair; the single-writer discipline
//! is enforced by the ledger's lock above it. `JsonFileStore` persists the
//! whole record set as one JSON object keyed by identity and replaces the
//! file atomically on every save.

use crate::{Error, Result, SubscriptionRecord};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

pub type RecordMap = BTreeMap<String, SubscriptionRecord>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn load(&self) -> Result<RecordMap>;
    async fn save(&self, records: &RecordMap) -> Result<()>;
}

/// File-backed store: one JSON object, written temp-then-rename so a crash
/// mid-write never leaves a truncated record set behind.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut p = self.path.clone().into_os_string();
        p.push(".tmp");
        PathBuf::from(p)
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn load(&self) -> Result<RecordMap> {
        match std::fs::read_to_string(&self.path) {
            Ok(json) => {
                // A corrupt store is an operator problem, not an empty one:
                // refusing here is what keeps a bad deploy from silently
                // resetting every subscription.
                serde_json::from_str(&json)
                    .map_err(|e| Error::StoreUnavailable(format!("{}: {e}", self.path.display())))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RecordMap::new()),
            Err(e) => Err(Error::StoreUnavailable(format!(
                "{}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn save(&self, records: &RecordMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(records)?;
        let tmp = self.tmp_path();
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<RecordMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load(&self) -> Result<RecordMap> {
        Ok(self.records.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn save(&self, records: &RecordMap) -> Result<()> {
        *self.records.lock().unwrap_or_else(|e| e.into_inner()) = records.clone();
        Ok(())
    }
}
