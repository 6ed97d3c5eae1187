use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type DispatchId = Uuid;
pub type NotificationId = Uuid;
pub type AuditEntryId = Uuid;

/// Identifier of an enforcement officer / responder account.
pub type OfficerId = String;

/// Reference to the incident record a dispatch was raised from.
pub type CaseId = String;

/// Jurisdiction path, most general first: `US-CA`, `US-CA/los-angeles`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Jurisdiction(String);

impl Jurisdiction {
    pub fn new(path: impl Into<String>) -> Self {
        let raw: String = path.into();
        let normalized = raw
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// This jurisdiction followed by each ancestor, most specific first.
    ///
    /// `US-CA/los-angeles/venice` yields itself, `US-CA/los-angeles`, `US-CA`.
    pub fn lineage(&self) -> Vec<Jurisdiction> {
        let parts: Vec<&str> = self.0.split('/').filter(|s| !s.is_empty()).collect();
        (1..=parts.len())
            .rev()
            .map(|n| Jurisdiction(parts[..n].join("/")))
            .collect()
    }

    /// Number of path segments; higher is more specific.
    pub fn depth(&self) -> usize {
        self.0.split('/').filter(|s| !s.is_empty()).count()
    }
}

impl std::fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Jurisdiction {
    fn from(s: &str) -> Self {
        Jurisdiction::new(s)
    }
}

impl From<String> for Jurisdiction {
    fn from(s: String) -> Self {
        Jurisdiction::new(s)
    }
}

impl From<Jurisdiction> for String {
    fn from(j: Jurisdiction) -> Self {
        j.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lineage_most_specific_first() {
        let j = Jurisdiction::new("US-CA/los-angeles/venice");
        let lineage: Vec<String> = j.lineage().iter().map(|j| j.to_string()).collect();
        assert_eq!(lineage, vec!["US-CA/los-angeles/venice", "US-CA/los-angeles", "US-CA"]);
        assert_eq!(j.depth(), 3);
    }

    #[test]
    fn normalizes_slashes_and_whitespace() {
        let j = Jurisdiction::new(" US-CA / los-angeles/ ");
        assert_eq!(j.as_str(), "US-CA/los-angeles");
        assert!(Jurisdiction::new("  ").is_empty());
    }
}
