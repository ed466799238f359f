//! Periodic reconciliation: expire stale records, remind soon-to-expire
//! subscribers.
//!
//! The sweep itself (read, filter, flip, persist) lives in the ledger so it
//! shares the write lock with grants and links. This module owns the timer
//! and the notification fan-out, where every per-record failure is isolated:
//! a dead chat or a slow bot API can cost one message, never the pass.

use crate::{ChannelRef, Ledger, Notifier, Result, SweepEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

pub struct Reconciler {
    ledger: Arc<Ledger>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
}

impl Reconciler {
    pub fn new(ledger: Arc<Ledger>, notifier: Arc<dyn Notifier>, interval: Duration) -> Self {
        Self {
            ledger,
            notifier,
            interval,
        }
    }

    /// Default hourly cadence.
    pub fn with_default_interval(ledger: Arc<Ledger>, notifier: Arc<dyn Notifier>) -> Self {
        Self::new(ledger, notifier, Duration::from_secs(3600))
    }

    /// Run forever. A failed pass is logged and retried next tick.
    pub async fn run(&self) {
        loop {
            match self.run_once().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(events = n, "reconciliation pass complete"),
                Err(e) => tracing::error!(error = %e, "reconciliation pass failed"),
            }
            sleep(self.interval).await;
        }
    }

    pub async fn run_once(&self) -> Result<usize> {
        self.run_once_at(chrono::Utc::now().timestamp()).await
    }

    /// One pass at an explicit timestamp. Returns the number of sweep events
    /// handled.
    pub async fn run_once_at(&self, now: i64) -> Result<usize> {
        // Expiry flips are already persisted when sweep_at returns; from
        // here on only notifications can fail, and they never propagate.
        let events = self.ledger.sweep_at(now).await?;
        let count = events.len();

        for event in events {
            if let Err(e) = self.dispatch(&event).await {
                tracing::warn!(error = %e, ?event, "sweep notification failed, skipping");
            }
        }
        Ok(count)
    }

    async fn dispatch(&self, event: &SweepEvent) -> Result<()> {
        let config = self.ledger.config();
        match event {
            SweepEvent::ExpiringSoon(record) => {
                let expires = chrono::DateTime::from_timestamp(record.expires_at, 0)
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                    .unwrap_or_else(|| record.expires_at.to_string());
                match record.external_chat_id {
                    Some(chat_id) => {
                        let text = format!(
                            "Reminder: your {} subscription expires on {}",
                            record.plan, expires
                        );
                        self.notifier.notify(ChannelRef::Chat(chat_id), &text).await
                    }
                    None => {
                        // Nobody to remind directly; give the operator
                        // everything needed for a manual follow-up.
                        let text = format!(
                            "{} ({}) expires soon ({}) but has no linked chat. \
                             Payment ref: {}\nDeep-link: {}",
                            record.identity,
                            record.plan,
                            expires,
                            record.payment_reference,
                            config.deep_link(&record.payment_reference),
                        );
                        self.notifier.notify(ChannelRef::Admin, &text).await
                    }
                }
            }
            SweepEvent::Expired(record) => {
                let text = format!("{} subscription expired.", record.identity);
                self.notifier.notify(ChannelRef::Admin, &text).await
            }
        }
    }
}
