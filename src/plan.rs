use serde::{Deserialize, Serialize};

/// Subscription tier. Determines renewal duration and which community
/// channel the subscriber is invited to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    /// The premium daily-access tier.
    ShortCycle,
    /// The weekend-only tier.
    ExtendedCycle,
}

impl Plan {
    /// Parse a plan label from payment metadata. The gateway has sent both
    /// the current labels and the legacy daily/weekend ones.
    pub fn from_metadata(label: &str) -> Option<Plan> {
        match label {
            "short_cycle" | "daily" => Some(Plan::ShortCycle),
            "extended_cycle" | "weekend" => Some(Plan::ExtendedCycle),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::ShortCycle => "short_cycle",
            Plan::ExtendedCycle => "extended_cycle",
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
