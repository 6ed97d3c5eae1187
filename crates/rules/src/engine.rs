//! Rule engine: orders and aggregates the rules a lookup returns.
//!
//! Evaluation is a pure function of the rule rows: the engine sorts by
//! priority, picks the primary rule, deduplicates citations and ORs the
//! immediate-response flags. The only side effect is reporting lookup
//! failures, which fail open (no dispatch) and are recorded in the
//! [`EvaluationAuditLog`].

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error};
use welfare_core::Jurisdiction;

use crate::audit_log::{EvaluationAuditLog, EvaluationPhase, LogLevel};
use crate::lookup::RuleLookup;
use crate::schema::{LawRule, TriggerCategory};

/// Verdict of one evaluation. Recomputed on every call, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LawTriggerResult {
    pub triggers_dispatch: bool,
    /// Matched rules, highest priority first.
    pub rules: Vec<LawRule>,
    /// First rule in `rules`.
    pub primary_rule: Option<LawRule>,
    /// Union of all matched citations, first occurrence order.
    pub citations: Vec<String>,
    pub requires_immediate: bool,
    /// Set when the lookup failed and the engine fell back to "no dispatch".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookup_failed: Option<String>,
}

impl LawTriggerResult {
    /// No rules matched.
    pub fn no_dispatch() -> Self {
        Self {
            triggers_dispatch: false,
            rules: Vec::new(),
            primary_rule: None,
            citations: Vec::new(),
            requires_immediate: false,
            lookup_failed: None,
        }
    }

    fn failed_open(reason: String) -> Self {
        Self {
            lookup_failed: Some(reason),
            ..Self::no_dispatch()
        }
    }

    /// Aggregate raw rule rows into a verdict.
    ///
    /// Rules are ordered by priority descending with ties broken by rule id,
    /// so the same rows always yield the same result regardless of the order
    /// the lookup returned them in.
    pub fn from_rules(mut rules: Vec<LawRule>) -> Self {
        if rules.is_empty() {
            return Self::no_dispatch();
        }

        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));

        let mut seen = HashSet::new();
        let citations = rules
            .iter()
            .flat_map(|r| r.citations.iter())
            .filter(|c| seen.insert(c.as_str()))
            .cloned()
            .collect();

        Self {
            triggers_dispatch: true,
            primary_rule: rules.first().cloned(),
            requires_immediate: rules.iter().any(|r| r.requires_immediate),
            citations,
            rules,
            lookup_failed: None,
        }
    }

    /// SLA of the primary rule, if it defines one.
    pub fn sla_minutes(&self) -> Option<u32> {
        self.primary_rule.as_ref().and_then(|r| r.sla_minutes)
    }

    pub fn is_fail_open(&self) -> bool {
        self.lookup_failed.is_some()
    }
}

/// Evaluates trigger sets against a jurisdiction's rule tables.
pub struct RuleEngine {
    lookup: Arc<dyn RuleLookup>,
    audit: Arc<EvaluationAuditLog>,
}

impl RuleEngine {
    pub fn new(lookup: Arc<dyn RuleLookup>) -> Self {
        Self {
            lookup,
            audit: Arc::new(EvaluationAuditLog::new()),
        }
    }

    /// Share an existing audit log (e.g. one exposed to operators).
    pub fn with_audit_log(lookup: Arc<dyn RuleLookup>, audit: Arc<EvaluationAuditLog>) -> Self {
        Self { lookup, audit }
    }

    pub fn audit_log(&self) -> &Arc<EvaluationAuditLog> {
        &self.audit
    }

    /// Evaluate `triggers` for `jurisdiction`.
    ///
    /// An empty trigger set yields "no dispatch" without consulting the
    /// lookup. A lookup error also yields "no dispatch" (fail-open): the
    /// emergency path keeps moving, and the failure is logged at error level
    /// and recorded in the audit log with `lookup_failed` set on the result.
    pub async fn evaluate(
        &self,
        jurisdiction: &Jurisdiction,
        triggers: &BTreeSet<TriggerCategory>,
    ) -> LawTriggerResult {
        if triggers.is_empty() {
            debug!(jurisdiction = %jurisdiction, "empty trigger set, no dispatch");
            return LawTriggerResult::no_dispatch();
        }

        let start = Instant::now();
        let rows = self.lookup.lookup_rules(jurisdiction, triggers).await;

        match rows {
            Ok(rules) => {
                let result = LawTriggerResult::from_rules(rules);
                debug!(
                    jurisdiction = %jurisdiction,
                    matched = result.rules.len(),
                    triggers_dispatch = result.triggers_dispatch,
                    "rule evaluation complete"
                );
                result
            }
            Err(e) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                let trigger_names: Vec<&str> = triggers.iter().map(|t| t.as_str()).collect();
                error!(
                    jurisdiction = %jurisdiction,
                    triggers = ?trigger_names,
                    error = %e,
                    "rule lookup failed, failing open with no dispatch"
                );
                self.audit.log_with_details(
                    jurisdiction.as_str(),
                    LogLevel::Error,
                    EvaluationPhase::FailOpen,
                    format!("rule lookup failed: {e}"),
                    Some(serde_json::json!({ "triggers": trigger_names })),
                    Some(duration_ms),
                );
                LawTriggerResult::failed_open(e.to_string())
            }
        }
    }
}
