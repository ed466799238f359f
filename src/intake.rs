//! Payment event intake: signature verification and normalization.
//!
//! Everything here is side-effect free validation. The output of a
//! successful pass is a [`NormalizedPayment`] the ledger can apply without
//! looking at the wire format again.

use crate::{Config, Error, Plan, Result, VerificationOracle};
use serde::Deserialize;
use sha2::Sha512;
use std::sync::Arc;
use subtle::ConstantTimeEq;

type HmacSha512 = hmac::Hmac<Sha512>;

/// The one event kind that grants access.
const PAYMENT_EVENT: &str = "charge.success";

/// A validated, normalized payment ready for the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPayment {
    pub identity: String,
    pub reference: String,
    /// Major units.
    pub amount: i64,
    pub plan: Plan,
}

/// Outcome of event normalization. Non-payment events are acknowledged as
/// ignored, not treated as errors.
#[derive(Debug, Clone, PartialEq)]
pub enum IntakeOutcome {
    Payment(NormalizedPayment),
    Ignored { event: String },
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    data: RawData,
}

#[derive(Deserialize, Default)]
struct RawData {
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    customer: Option<RawCustomer>,
    #[serde(default)]
    customer_email: Option<String>,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    metadata: serde_json::Value,
}

#[derive(Deserialize)]
struct RawCustomer {
    #[serde(default)]
    email: Option<String>,
}

pub struct EventIntake {
    config: Config,
    oracle: Option<Arc<dyn VerificationOracle>>,
}

impl EventIntake {
    pub fn new(config: Config, oracle: Option<Arc<dyn VerificationOracle>>) -> Self {
        Self { config, oracle }
    }

    /// Verify the keyed signature over the raw request body.
    ///
    /// With no secret configured verification is skipped; that is an
    /// explicit permissive mode for local testing and it is logged on every
    /// request so it can never pass unnoticed in a production posture.
    pub fn verify_signature(&self, body: &[u8], signature: Option<&str>) -> Result<()> {
        let Some(secret) = self.config.webhook_secret.as_deref() else {
            tracing::warn!("no webhook secret configured, accepting unsigned event");
            return Ok(());
        };
        let Some(signature) = signature else {
            return Err(Error::Unauthorized);
        };

        use hmac::Mac;
        let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
            .map_err(|e| Error::Validation(format!("webhook secret unusable: {e}")))?;
        mac.update(body);
        let expected = hex::encode(mac.finalize().into_bytes());

        if bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            Ok(())
        } else {
            Err(Error::Unauthorized)
        }
    }

    /// Normalize a payment notification body.
    ///
    /// Plan policy: event metadata is authoritative when it names a known
    /// plan; otherwise the paid amount decides against the short-cycle
    /// threshold. When an oracle is configured the reference is re-verified
    /// before anything is trusted, and verified payer/amount win over the
    /// event's own claims.
    pub async fn normalize(&self, body: &[u8]) -> Result<IntakeOutcome> {
        let raw: RawEvent = serde_json::from_slice(body)
            .map_err(|e| Error::Validation(format!("malformed event payload: {e}")))?;

        let event = raw.event.unwrap_or_default();
        if event != PAYMENT_EVENT {
            return Ok(IntakeOutcome::Ignored { event });
        }

        let reference = raw
            .data
            .reference
            .filter(|r| !r.is_empty())
            .ok_or_else(|| Error::Validation("missing payment reference".to_string()))?;
        let mut identity = raw
            .data
            .customer
            .and_then(|c| c.email)
            .or(raw.data.customer_email)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| Error::Validation("missing customer email".to_string()))?;
        // Gateway amounts arrive in minor units.
        let mut amount = raw.data.amount.unwrap_or(0) / 100;

        if let Some(oracle) = &self.oracle {
            let verified = oracle.verify(&reference).await?;
            if let Some(v) = verified.identity {
                identity = v;
            }
            if let Some(v) = verified.amount {
                amount = v;
            }
        }

        let plan = raw
            .data
            .metadata
            .get("plan_type")
            .and_then(|v| v.as_str())
            .and_then(Plan::from_metadata)
            .unwrap_or_else(|| {
                if amount >= self.config.short_cycle_threshold {
                    Plan::ShortCycle
                } else {
                    Plan::ExtendedCycle
                }
            });

        Ok(IntakeOutcome::Payment(NormalizedPayment {
            identity,
            reference,
            amount,
            plan,
        }))
    }
}
