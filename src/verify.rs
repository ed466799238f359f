//! Remote transaction verification.
//!
//! When the gateway secret key is configured, every webhook reference is
//! re-verified against the gateway's transaction-verify endpoint before any
//! grant happens. The oracle's answer is authoritative: its payer identity
//! and amount override whatever the webhook body claimed.

use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Verified transaction data. Fields are optional because the oracle may
/// omit them; callers fall back to the event-supplied values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerifiedPayment {
    pub identity: Option<String>,
    /// Major units.
    pub amount: Option<i64>,
}

#[async_trait]
pub trait VerificationOracle: Send + Sync {
    /// Verify a payment reference. `Ok` means the gateway confirms a
    /// successful transaction; anything else must fail closed.
    async fn verify(&self, reference: &str) -> Result<VerifiedPayment>;
}

/// Paystack transaction-verify client.
pub struct PaystackOracle {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct VerifyResponse {
    status: bool,
    #[serde(default)]
    data: VerifyData,
}

#[derive(Deserialize, Default)]
struct VerifyData {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    customer: Option<VerifyCustomer>,
    #[serde(default)]
    customer_email: Option<String>,
}

#[derive(Deserialize)]
struct VerifyCustomer {
    #[serde(default)]
    email: Option<String>,
}

impl PaystackOracle {
    pub fn new(base_url: &str, secret_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(VERIFY_TIMEOUT)
            .build()
            .map_err(|e| {
                Error::VerificationUnavailable(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }
}

#[async_trait]
impl VerificationOracle for PaystackOracle {
    async fn verify(&self, reference: &str) -> Result<VerifiedPayment> {
        let url = format!("{}/transaction/verify/{}", self.base_url, reference);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| Error::VerificationUnavailable(e.to_string()))?;

        let status = resp.status();
        // A 5xx is the gateway's problem, so let the caller retry; anything
        // else non-2xx is a rejection of this reference.
        if status.is_server_error() {
            return Err(Error::VerificationUnavailable(format!(
                "verify endpoint returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(Error::VerificationFailed(format!(
                "verify endpoint returned {status}"
            )));
        }

        let body: VerifyResponse = resp
            .json()
            .await
            .map_err(|e| Error::VerificationUnavailable(e.to_string()))?;

        if !body.status || body.data.status.as_deref() != Some("success") {
            return Err(Error::VerificationFailed(format!(
                "transaction {reference} not confirmed"
            )));
        }

        Ok(VerifiedPayment {
            identity: body
                .data
                .customer
                .and_then(|c| c.email)
                .or(body.data.customer_email),
            // Wire amounts are minor units.
            amount: body.data.amount.map(|a| a / 100),
        })
    }
}
