//! The subscription ledger: grant/renew, link, query, and the expiry
//! primitives the reconciler drives. Owns every invariant in the crate.
//!
//! All mutations follow the same shape: take the write lock, load the full
//! record set, mutate one record, save atomically, release the lock, and
//! only then perform notification I/O. The lock is what turns the store's
//! dumb load/save pair into a single-writer resource; nothing network-bound
//! ever runs inside it.

use crate::{
    ChannelRef, Config, Error, Notifier, Plan, RecordStore, Result, SubscriptionRecord,
};
use crate::store::RecordMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// What a grant call actually did, for the admin notification and the
/// webhook response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantAction {
    /// Fresh record, or a lapsed record rebuilt.
    Activated,
    /// Active record extended.
    Renewed,
    /// Duplicate reference; nothing changed.
    Unchanged,
}

impl GrantAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantAction::Activated => "activated",
            GrantAction::Renewed => "renewed",
            GrantAction::Unchanged => "unchanged",
        }
    }
}

/// One reconciliation finding. Carries a snapshot of the record so the
/// reconciler can notify after the ledger lock is gone.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepEvent {
    ExpiringSoon(SubscriptionRecord),
    Expired(SubscriptionRecord),
}

pub struct Ledger {
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn Notifier>,
    config: Config,
    // Serializes every load-mutate-save. See module docs.
    write_lock: Mutex<()>,
}

impl Ledger {
    pub fn new(store: Arc<dyn RecordStore>, notifier: Arc<dyn Notifier>, config: Config) -> Self {
        Self {
            store,
            notifier,
            config,
            write_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    /// Apply a payment to the record set.
    ///
    /// Idempotent per reference: a reference that has already been applied
    /// to this identity returns the record untouched, so webhook redelivery
    /// (in any order) cannot extend a subscription twice.
    pub async fn grant_or_renew(
        &self,
        identity: &str,
        plan: Plan,
        reference: &str,
    ) -> Result<(SubscriptionRecord, GrantAction)> {
        self.grant_or_renew_at(identity, plan, reference, Self::now())
            .await
    }

    pub async fn grant_or_renew_at(
        &self,
        identity: &str,
        plan: Plan,
        reference: &str,
        now: i64,
    ) -> Result<(SubscriptionRecord, GrantAction)> {
        if identity.is_empty() || reference.is_empty() {
            return Err(Error::Validation(
                "identity and reference are required".to_string(),
            ));
        }

        let (record, action) = {
            let _guard = self.write_lock.lock().await;
            let mut records = self.store.load().await?;

            let action = match records.get(identity).cloned() {
                Some(existing) if existing.has_applied(reference) => GrantAction::Unchanged,
                Some(mut existing) if !existing.is_expired_at(now) => {
                    // Extension only: a renewal never shortens.
                    existing.expires_at =
                        existing.expires_at.max(now + self.config.plan_duration(plan));
                    existing.plan = plan;
                    existing.payment_reference = reference.to_string();
                    existing.applied_references.push(reference.to_string());
                    existing.active = true;
                    records.insert(identity.to_string(), existing);
                    GrantAction::Renewed
                }
                prev => {
                    // New subscriber, or a lapsed record rebuilt. The replay
                    // guard survives the rebuild; the chat link does not
                    // (the subscriber re-links through the new deep link).
                    let mut fresh = SubscriptionRecord::new(
                        identity,
                        plan,
                        reference,
                        now + self.config.plan_duration(plan),
                    );
                    if let Some(prev) = prev {
                        fresh.applied_references = prev.applied_references;
                        fresh.applied_references.push(reference.to_string());
                    }
                    records.insert(identity.to_string(), fresh);
                    GrantAction::Activated
                }
            };

            if action != GrantAction::Unchanged {
                self.store.save(&records).await?;
            }
            let record = records
                .get(identity)
                .cloned()
                .ok_or(Error::NotFound)?;
            (record, action)
        };

        if action != GrantAction::Unchanged {
            let text = format!(
                "{} {} ({}). Payment ref: {}\nDeep-link: {}",
                record.identity,
                action.as_str(),
                record.plan,
                reference,
                self.config.deep_link(reference),
            );
            if let Err(e) = self.notifier.notify(ChannelRef::Admin, &text).await {
                tracing::warn!(identity, error = %e, "admin grant notification failed");
            }
        }

        Ok((record, action))
    }

    /// Link a chat identity to the record that carries `reference`.
    ///
    /// The reference must be the record's *current* one, which is what stops
    /// a stale reference from cross-linking a chat to somebody else's
    /// record. A chat id may be linked to at most one record; re-linking the
    /// same record is idempotent.
    pub async fn link_identity(&self, chat_id: i64, reference: &str) -> Result<SubscriptionRecord> {
        if reference.is_empty() {
            return Err(Error::Validation("reference is required".to_string()));
        }

        let record = {
            let _guard = self.write_lock.lock().await;
            let mut records = self.store.load().await?;

            let identity = records
                .values()
                .find(|r| r.payment_reference == reference)
                .map(|r| r.identity.clone())
                .ok_or_else(|| Error::ReferenceNotFound(reference.to_string()))?;

            let clash = records
                .values()
                .any(|r| r.identity != identity && r.external_chat_id == Some(chat_id));
            if clash {
                return Err(Error::ChatAlreadyLinked(chat_id));
            }

            let record = records.get_mut(&identity).ok_or(Error::NotFound)?;
            record.external_chat_id = Some(chat_id);
            record.active = true;
            let snapshot = record.clone();
            self.store.save(&records).await?;
            snapshot
        };

        let text = format!(
            "Payment verified! You now have {} access.",
            record.plan
        );
        let sent = match self.config.group_link(record.plan) {
            Some(link) => {
                self.notifier
                    .notify_with_join_button(ChannelRef::Chat(chat_id), &text, link)
                    .await
            }
            None => self.notifier.notify(ChannelRef::Chat(chat_id), &text).await,
        };
        if let Err(e) = sent {
            tracing::warn!(chat_id, error = %e, "welcome notification failed");
        }

        Ok(record)
    }

    /// Status lookup by linked chat identity.
    pub async fn query_by_chat(&self, chat_id: i64) -> Result<SubscriptionRecord> {
        let records = self.store.load().await?;
        records
            .into_values()
            .find(|r| r.external_chat_id == Some(chat_id))
            .ok_or(Error::NotFound)
    }

    /// Full snapshot for the admin endpoint.
    pub async fn records(&self) -> Result<RecordMap> {
        self.store.load().await
    }

    /// One reconciliation pass over the record set.
    ///
    /// Expiry flips are persisted here, inside the lock; the returned events
    /// are snapshots for the reconciler to notify on afterwards. A record in
    /// the reminder window and one past expiry each produce exactly one
    /// event per pass.
    pub async fn sweep_at(&self, now: i64) -> Result<Vec<SweepEvent>> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.store.load().await?;

        let mut events = Vec::new();
        let mut changed = false;
        for record in records.values_mut() {
            if !record.active || record.expires_at == 0 {
                continue;
            }
            if record.in_reminder_window(now, self.config.alert_window) {
                events.push(SweepEvent::ExpiringSoon(record.clone()));
            }
            if record.is_expired_at(now) {
                record.active = false;
                changed = true;
                events.push(SweepEvent::Expired(record.clone()));
            }
        }

        if changed {
            self.store.save(&records).await?;
        }
        Ok(events)
    }
}
