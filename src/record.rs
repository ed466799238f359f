use crate::Plan;
use serde::{Deserialize, Serialize};

/// One subscription record per subscriber identity.
///
/// Records are never deleted; expiry flips `active` to false and the record
/// stays behind as history. `applied_references` is the durable replay guard:
/// every payment reference that has ever extended this record, kept across
/// renewals and across rebuilds of a lapsed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub identity: String,
    pub plan: Plan,
    /// Idempotency key of the payment event that last affected this record.
    pub payment_reference: String,
    #[serde(default)]
    pub applied_references: Vec<String>,
    /// Seconds since epoch, UTC. Non-decreasing over the record's lifetime.
    pub expires_at: i64,
    pub active: bool,
    /// Linked notification channel, set by the link operation.
    #[serde(default)]
    pub external_chat_id: Option<i64>,
}

impl SubscriptionRecord {
    pub fn new(identity: &str, plan: Plan, reference: &str, expires_at: i64) -> Self {
        Self {
            identity: identity.to_string(),
            plan,
            payment_reference: reference.to_string(),
            applied_references: vec![reference.to_string()],
            expires_at,
            active: true,
            external_chat_id: None,
        }
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    /// True when the record expires within the alert window but has not
    /// expired yet.
    pub fn in_reminder_window(&self, now: i64, alert_window: i64) -> bool {
        let remaining = self.expires_at - now;
        remaining > 0 && remaining <= alert_window
    }

    pub fn has_applied(&self, reference: &str) -> bool {
        self.applied_references.iter().any(|r| r == reference)
    }
}
