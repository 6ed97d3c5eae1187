//! Legal rule definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rule priority. Variant order defines precedence: `Critical > High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LawPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for LawPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LawPriority::Low => write!(f, "LOW"),
            LawPriority::Medium => write!(f, "MEDIUM"),
            LawPriority::High => write!(f, "HIGH"),
            LawPriority::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Where a rule's authority comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegalBasis {
    StateStatute,
    LocalOrdinance,
}

impl fmt::Display for LegalBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegalBasis::StateStatute => write!(f, "state statute"),
            LegalBasis::LocalOrdinance => write!(f, "local ordinance"),
        }
    }
}

/// An immutable legal rule loaded from a rule table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LawRule {
    pub id: String,
    pub name: String,
    pub legal_basis: LegalBasis,
    pub priority: LawPriority,
    /// Response deadline in minutes; `None` means the rule sets no deadline.
    #[serde(default)]
    pub sla_minutes: Option<u32>,
    #[serde(default)]
    pub requires_immediate: bool,
    #[serde(default)]
    pub citations: Vec<String>,
}
