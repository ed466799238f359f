//! # Accessgate
//!
//! Subscription ledger for a payment-gated community. Payment webhooks are
//! validated and normalized by [`intake::EventIntake`], applied to the
//! durable record set by [`ledger::Ledger`], and swept on a timer by
//! [`reconciler::Reconciler`], which expires lapsed records and emits
//! reminders.
//!
//! ## Correctness properties
//!
//! - Exactly-once grant: a payment reference is applied to a record at most
//!   once, no matter how many times the gateway redelivers the webhook.
//! - Monotonic expiry: a renewal only ever moves `expires_at` forward.
//! - No lost updates: every load-mutate-save against the record set is
//!   serialized behind a single async mutex owned by the ledger.
//! - At most one record per chat identity: a link that would duplicate an
//!   `external_chat_id` across records is rejected.

pub mod config;
pub mod intake;
pub mod ledger;
pub mod notify;
pub mod plan;
pub mod reconciler;
pub mod record;
pub mod server;
pub mod store;
pub mod verify;

pub use config::Config;
pub use intake::{EventIntake, IntakeOutcome, NormalizedPayment};
pub use ledger::{GrantAction, Ledger, SweepEvent};
pub use notify::{ChannelRef, Notifier, TelegramNotifier};
pub use plan::Plan;
pub use reconciler::Reconciler;
pub use record::SubscriptionRecord;
pub use server::{router, AppState};
pub use store::{JsonFileStore, MemoryStore, RecordMap, RecordStore};
pub use verify::{PaystackOracle, VerificationOracle, VerifiedPayment};

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy for every operation in the crate.
///
/// Handlers map these onto HTTP statuses; only `StoreUnavailable` and
/// `VerificationUnavailable` are transient (safe for the caller to retry,
/// which the grant idempotency check makes harmless).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("no record for payment reference {0}")]
    ReferenceNotFound(String),

    #[error("record not found")]
    NotFound,

    #[error("chat {0} is already linked to a different record")]
    ChatAlreadyLinked(i64),

    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("payment verification failed: {0}")]
    VerificationFailed(String),

    #[error("verification oracle unreachable: {0}")]
    VerificationUnavailable(String),

    #[error("notification delivery failed: {0}")]
    Notify(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::StoreUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::StoreUnavailable(e.to_string())
    }
}

impl Error {
    /// Whether a caller may safely retry the failed operation.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable(_) | Error::VerificationUnavailable(_) | Error::Notify(_)
        )
    }
}
