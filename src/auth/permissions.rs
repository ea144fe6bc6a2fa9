//! CRM roles and their fixed permission sets.
//!
//! Permission sets are static per role, not computed from dynamic rules:
//! managers get full CRUD plus user/report/audit administration, agents get
//! read/write on their own records only.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Manager,
    Agent,
}

const MANAGER_PERMISSIONS: &[&str] = &[
    "audit:read",
    "leads:delete",
    "leads:read",
    "leads:write",
    "messages:read",
    "messages:write",
    "reports:manage",
    "reports:read",
    "users:manage",
    "visits:delete",
    "visits:read",
    "visits:write",
];

const AGENT_PERMISSIONS: &[&str] = &[
    "leads:read:own",
    "leads:write:own",
    "messages:read:own",
    "messages:write:own",
    "visits:read:own",
    "visits:write:own",
];

impl Role {
    /// Parse a stored role string; unknown values are `None` so callers can
    /// fall back explicitly.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "manager" => Some(Self::Manager),
            "agent" => Some(Self::Agent),
            _ => None,
        }
    }

    /// Default when no role can be resolved from any source.
    #[must_use]
    pub const fn least_privileged() -> Self {
        Self::Agent
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Agent => "agent",
        }
    }

    #[must_use]
    pub fn permissions(self) -> BTreeSet<String> {
        let names = match self {
            Self::Manager => MANAGER_PERMISSIONS,
            Self::Agent => AGENT_PERMISSIONS,
        };
        names.iter().map(ToString::to_string).collect()
    }
}
