//! Shared fixtures for integration tests.

#![allow(dead_code)]

use accessgate::{ChannelRef, Config, Error, Ledger, MemoryStore, Notifier, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub const MONTH: i64 = 30 * 24 * 3600;

/// Captures notifications instead of sending them.
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(ChannelRef, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn messages(&self) -> Vec<(ChannelRef, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, channel: ChannelRef, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push((channel, text.to_string()));
        Ok(())
    }
}

/// Fails every delivery; for testing failure isolation.
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _channel: ChannelRef, _text: &str) -> Result<()> {
        Err(Error::Notify("transport down".to_string()))
    }
}

pub fn test_config() -> Config {
    Config::for_tests(PathBuf::from("/tmp/unused-records.json"))
}

pub fn memory_ledger() -> (Arc<Ledger>, Arc<RecordingNotifier>) {
    let notifier = RecordingNotifier::new();
    let ledger = Arc::new(Ledger::new(
        Arc::new(MemoryStore::new()),
        notifier.clone(),
        test_config(),
    ));
    (ledger, notifier)
}
