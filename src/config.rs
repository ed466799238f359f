use crate::{Error, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

const DAY: i64 = 24 * 3600;

/// Service configuration, sourced from the environment.
///
/// Every knob has a deployment default; the only values that change the
/// service's security posture when absent are `webhook_secret` (signature
/// checks skipped), `gateway_secret_key` (oracle re-verification skipped)
/// and `admin_key` (admin endpoint open). All three degradations are logged
/// loudly at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub store_path: PathBuf,

    /// Shared secret for webhook signature verification.
    pub webhook_secret: Option<String>,
    /// Gateway API key; presence enables oracle re-verification.
    pub gateway_secret_key: Option<String>,
    pub gateway_base_url: String,
    /// Shared secret guarding the admin records endpoint.
    pub admin_key: Option<String>,

    pub bot_token: Option<String>,
    pub bot_username: String,
    pub admin_chat_id: Option<i64>,
    pub group_link_short: Option<String>,
    pub group_link_extended: Option<String>,

    /// Paid amount (major units) at or above which a payment without plan
    /// metadata is treated as short-cycle.
    pub short_cycle_threshold: i64,
    pub short_cycle_duration: i64,
    pub extended_cycle_duration: i64,

    /// How close to expiry a record must be before reminders fire.
    pub alert_window: i64,
    pub reconcile_interval: std::time::Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bind_addr: parse_var("ACCESSGATE_ADDR", "0.0.0.0:5000")?,
            store_path: PathBuf::from(var_or("ACCESSGATE_STORE", "data/records.json")),
            webhook_secret: non_empty(std::env::var("PAYSTACK_WEBHOOK_SECRET").ok()),
            gateway_secret_key: non_empty(std::env::var("PAYSTACK_SECRET_KEY").ok()),
            gateway_base_url: var_or("PAYSTACK_BASE_URL", "https://api.paystack.co"),
            admin_key: non_empty(std::env::var("ADMIN_API_KEY").ok()),
            bot_token: non_empty(std::env::var("ACCESS_BOT_TOKEN").ok()),
            bot_username: var_or("ACCESS_BOT_USERNAME", "AccessGateBot"),
            admin_chat_id: parse_opt_var("ADMIN_CHAT_ID")?,
            group_link_short: non_empty(std::env::var("SHORT_CYCLE_GROUP_LINK").ok()),
            group_link_extended: non_empty(std::env::var("EXTENDED_CYCLE_GROUP_LINK").ok()),
            short_cycle_threshold: parse_var("SHORT_CYCLE_AMOUNT", "50000")?,
            short_cycle_duration: parse_var::<i64>("SHORT_CYCLE_DURATION_DAYS", "30")? * DAY,
            extended_cycle_duration: parse_var::<i64>("EXTENDED_CYCLE_DURATION_DAYS", "30")? * DAY,
            alert_window: parse_var::<i64>("EXPIRY_ALERT_DAYS", "3")? * DAY,
            reconcile_interval: std::time::Duration::from_secs(parse_var(
                "RECONCILE_INTERVAL_SECS",
                "3600",
            )?),
        })
    }

    /// Deterministic configuration for tests: no secrets, no notifier
    /// transport, short plan durations left at their defaults.
    pub fn for_tests(store_path: PathBuf) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".parse().expect("literal addr"),
            store_path,
            webhook_secret: None,
            gateway_secret_key: None,
            gateway_base_url: "https://api.paystack.co".to_string(),
            admin_key: None,
            bot_token: None,
            bot_username: "AccessGateBot".to_string(),
            admin_chat_id: None,
            group_link_short: None,
            group_link_extended: None,
            short_cycle_threshold: 50_000,
            short_cycle_duration: 30 * DAY,
            extended_cycle_duration: 30 * DAY,
            alert_window: 3 * DAY,
            reconcile_interval: std::time::Duration::from_secs(3600),
        }
    }

    pub fn plan_duration(&self, plan: crate::Plan) -> i64 {
        match plan {
            crate::Plan::ShortCycle => self.short_cycle_duration,
            crate::Plan::ExtendedCycle => self.extended_cycle_duration,
        }
    }

    /// Deep link that opens the access bot with the payment reference
    /// pre-filled, for manual follow-up and post-payment linking.
    pub fn deep_link(&self, reference: &str) -> String {
        format!("https://t.me/{}?start={}", self.bot_username, reference)
    }

    pub fn group_link(&self, plan: crate::Plan) -> Option<&str> {
        match plan {
            crate::Plan::ShortCycle => self.group_link_short.as_deref(),
            crate::Plan::ExtendedCycle => self.group_link_extended.as_deref(),
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> Result<T> {
    let raw = var_or(name, default);
    raw.parse()
        .map_err(|_| Error::Validation(format!("{name}: cannot parse {raw:?}")))
}

fn parse_opt_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match non_empty(std::env::var(name).ok()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| Error::Validation(format!("{name}: cannot parse {raw:?}"))),
    }
}
