//! In-memory structured audit log for rule evaluation.
//!
//! Stores per-jurisdiction entries capped at a configurable maximum (default
//! 500) with FIFO eviction. Fail-open fallbacks land here so they can be
//! reviewed out-of-band. Uses `std::sync::RwLock` so it can be written from
//! both async and plain threads.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity level for audit log entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Numeric severity for comparison (higher = more severe).
    pub fn as_severity(&self) -> u8 {
        match self {
            LogLevel::Debug => 0,
            LogLevel::Info => 1,
            LogLevel::Warning => 2,
            LogLevel::Error => 3,
        }
    }
}

/// Phase of evaluation that produced the entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationPhase {
    Lookup,
    Aggregate,
    FailOpen,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub jurisdiction: String,
    pub level: LogLevel,
    pub phase: EvaluationPhase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Query parameters for filtering audit log entries.
#[derive(Debug, Default, Deserialize)]
pub struct LogQueryParams {
    /// Minimum log level (inclusive).
    pub level: Option<LogLevel>,
    pub phase: Option<EvaluationPhase>,
    /// Maximum number of entries to return (default 100).
    pub limit: Option<u32>,
    /// Only return entries at or after this ISO 8601 timestamp.
    pub since: Option<String>,
}

/// In-memory per-jurisdiction audit log with FIFO eviction.
pub struct EvaluationAuditLog {
    entries: Arc<RwLock<HashMap<String, VecDeque<LogEntry>>>>,
    max_entries_per_jurisdiction: usize,
}

impl EvaluationAuditLog {
    pub fn new() -> Self {
        Self::with_max_entries(500)
    }

    pub fn with_max_entries(max: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            max_entries_per_jurisdiction: max,
        }
    }

    pub fn log(
        &self,
        jurisdiction: &str,
        level: LogLevel,
        phase: EvaluationPhase,
        message: impl Into<String>,
    ) {
        self.log_with_details(jurisdiction, level, phase, message, None, None);
    }

    pub fn log_with_details(
        &self,
        jurisdiction: &str,
        level: LogLevel,
        phase: EvaluationPhase,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
        duration_ms: Option<u64>,
    ) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            jurisdiction: jurisdiction.to_string(),
            level,
            phase,
            message: message.into(),
            details,
            duration_ms,
        };

        let mut guard = self.entries.write().expect("audit_log lock poisoned");
        let deque = guard.entry(jurisdiction.to_string()).or_default();
        deque.push_back(entry);
        while deque.len() > self.max_entries_per_jurisdiction {
            deque.pop_front();
        }
    }

    /// Query entries for a jurisdiction, newest first.
    pub fn query(&self, jurisdiction: &str, params: &LogQueryParams) -> Vec<LogEntry> {
        let guard = self.entries.read().expect("audit_log lock poisoned");
        let Some(deque) = guard.get(jurisdiction) else {
            return Vec::new();
        };

        let min_severity = params.level.as_ref().map(|l| l.as_severity()).unwrap_or(0);
        let since: Option<DateTime<Utc>> = params
            .since
            .as_ref()
            .and_then(|s| s.parse::<DateTime<Utc>>().ok());
        let limit = params.limit.unwrap_or(100) as usize;

        deque
            .iter()
            .rev()
            .filter(|e| e.level.as_severity() >= min_severity)
            .filter(|e| params.phase.as_ref().map_or(true, |p| &e.phase == p))
            .filter(|e| since.map_or(true, |s| e.timestamp >= s))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Count fail-open fallbacks across all jurisdictions.
    pub fn fail_open_count(&self) -> usize {
        let guard = self.entries.read().expect("audit_log lock poisoned");
        guard
            .values()
            .flat_map(|d| d.iter())
            .filter(|e| e.phase == EvaluationPhase::FailOpen)
            .count()
    }

    pub fn clear(&self, jurisdiction: &str) {
        let mut guard = self.entries.write().expect("audit_log lock poisoned");
        guard.remove(jurisdiction);
    }
}

impl Default for EvaluationAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_log_and_query() {
        let log = EvaluationAuditLog::new();
        log.log("US-CA", LogLevel::Info, EvaluationPhase::Lookup, "lookup");
        log.log("US-CA", LogLevel::Info, EvaluationPhase::Aggregate, "aggregate");

        let entries = log.query("US-CA", &LogQueryParams::default());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].phase, EvaluationPhase::Aggregate);
    }

    #[test]
    fn test_level_and_phase_filter() {
        let log = EvaluationAuditLog::new();
        log.log("US-CA", LogLevel::Debug, EvaluationPhase::Lookup, "debug");
        log.log("US-CA", LogLevel::Error, EvaluationPhase::FailOpen, "store down");
        log.log("US-CA", LogLevel::Info, EvaluationPhase::Aggregate, "ok");

        let params = LogQueryParams {
            level: Some(LogLevel::Warning),
            ..Default::default()
        };
        let entries = log.query("US-CA", &params);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "store down");

        let params = LogQueryParams {
            phase: Some(EvaluationPhase::Aggregate),
            ..Default::default()
        };
        assert_eq!(log.query("US-CA", &params).len(), 1);
    }

    #[test]
    fn test_fifo_eviction() {
        let log = EvaluationAuditLog::with_max_entries(2);
        for i in 0..4 {
            log.log("US-CA", LogLevel::Info, EvaluationPhase::Lookup, format!("msg {}", i));
        }
        let entries = log.query("US-CA", &LogQueryParams::default());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "msg 3");
        assert_eq!(entries[1].message, "msg 2");
    }

    #[test]
    fn test_fail_open_count_spans_jurisdictions() {
        let log = EvaluationAuditLog::new();
        log.log("US-CA", LogLevel::Error, EvaluationPhase::FailOpen, "a");
        log.log("US-NV", LogLevel::Error, EvaluationPhase::FailOpen, "b");
        log.log("US-NV", LogLevel::Info, EvaluationPhase::Aggregate, "c");
        assert_eq!(log.fail_open_count(), 2);
        log.clear("US-NV");
        assert_eq!(log.fail_open_count(), 1);
    }
}
