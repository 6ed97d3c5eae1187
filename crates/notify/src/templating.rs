//! Minijinja template rendering for dispatch notification messages.
//!
//! Templates are arbitrary strings (not pre-registered), so a fresh
//! [`minijinja::Environment`] is created per render call.

use serde::Serialize;

use crate::error::NotifyError;
use crate::types::NotificationType;

/// Dispatch data available to notification templates.
#[derive(Debug, Clone, Serialize)]
pub struct AlertContext {
    pub dispatch_id: String,
    /// Case priority label (`CRITICAL`, `HIGH`, ...).
    pub priority: String,
    pub species: String,
    pub condition: String,
    pub location: String,
    pub jurisdiction: String,
    pub rule_name: Option<String>,
    pub legal_basis: Option<String>,
    pub citations: Vec<String>,
    /// Response deadline in ISO 8601.
    pub expires_at: String,
    pub requires_immediate: bool,
}

/// A subject/body pair of template strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    pub subject: String,
    pub body: String,
}

impl MessageTemplate {
    /// Built-in templates per notification type.
    pub fn for_type(notification_type: NotificationType) -> Self {
        let (subject, body) = match notification_type {
            NotificationType::DispatchAlert => (
                "[{{ priority }}] Animal welfare dispatch: {{ species }} at {{ location }}",
                "{{ condition }}\n\
                 {% if requires_immediate %}IMMEDIATE RESPONSE REQUIRED\n{% endif %}\
                 {% if rule_name %}Law: {{ rule_name }}{% if legal_basis %} ({{ legal_basis }}){% endif %}\n{% endif %}\
                 {% if citations %}Citations: {{ citations | join(', ') }}\n{% endif %}\
                 Respond by {{ expires_at }}. Dispatch {{ dispatch_id }}",
            ),
            NotificationType::DispatchReminder => (
                "Reminder: dispatch {{ dispatch_id }} awaiting response",
                "{{ species }} at {{ location }} is still unacknowledged. Respond by {{ expires_at }}.",
            ),
            NotificationType::DispatchEscalation => (
                "[ESCALATION] Dispatch {{ dispatch_id }} unanswered",
                "No responder accepted the {{ priority | lower }} dispatch for {{ species }} at {{ location }} \
                 before {{ expires_at }}. Supervisor action required.",
            ),
            NotificationType::PoliceNotice => (
                "Animal welfare notice: {{ species }} at {{ location }}",
                "{{ condition }}\n{% if citations %}Applicable law: {{ citations | join(', ') }}\n{% endif %}\
                 Reference dispatch {{ dispatch_id }} ({{ jurisdiction }}).",
            ),
            NotificationType::StatusUpdate => (
                "Dispatch {{ dispatch_id }} updated",
                "{{ species }} at {{ location }}: {{ condition }}",
            ),
            NotificationType::System => ("{{ condition }}", "{{ condition }}"),
        };
        Self {
            subject: subject.to_string(),
            body: body.to_string(),
        }
    }
}

/// Renders notification templates using minijinja.
#[derive(Debug)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();

        env.add_filter("round", round_filter);
        env.add_filter("lower", lower_filter);
        env.add_filter("upper", upper_filter);

        env
    }

    /// Render a template string with any serializable context.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if the template is invalid or
    /// rendering fails.
    pub fn render<S: Serialize>(&self, template_str: &str, ctx: &S) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Render a subject/body pair.
    pub fn render_message<S: Serialize>(
        &self,
        template: &MessageTemplate,
        ctx: &S,
    ) -> Result<(String, String), NotifyError> {
        Ok((
            self.render(&template.subject, ctx)?,
            self.render(&template.body, ctx)?,
        ))
    }

    /// Check that a template string parses without evaluating it.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Round a float to N decimal places.
fn round_filter(value: f64, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0);
    format!("{:.prec$}", value, prec = n as usize)
}

fn lower_filter(value: String) -> String {
    value.to_lowercase()
}

fn upper_filter(value: String) -> String {
    value.to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_context() -> AlertContext {
        AlertContext {
            dispatch_id: "d-123".to_string(),
            priority: "CRITICAL".to_string(),
            species: "dog".to_string(),
            condition: "Dog locked in car, 95F".to_string(),
            location: "100 Main St".to_string(),
            jurisdiction: "US-CA/los-angeles".to_string(),
            rule_name: Some("Animal in unattended vehicle".to_string()),
            legal_basis: Some("state_statute".to_string()),
            citations: vec!["Cal. Penal Code § 597.7".to_string()],
            expires_at: "2026-03-04T12:15:00Z".to_string(),
            requires_immediate: true,
        }
    }

    #[test]
    fn render_basic_template() {
        let renderer = TemplateRenderer::new();
        let result = renderer
            .render("{{ species }} at {{ location }}", &sample_context())
            .unwrap();
        assert_eq!(result, "dog at 100 Main St");
    }

    #[test]
    fn render_filters() {
        let renderer = TemplateRenderer::new();
        let ctx = sample_context();
        assert_eq!(renderer.render("{{ priority | lower }}", &ctx).unwrap(), "critical");
        assert_eq!(renderer.render("{{ species | upper }}", &ctx).unwrap(), "DOG");
        assert_eq!(
            renderer.render("{{ v | round(1) }}", &serde_json::json!({"v": 2.46})).unwrap(),
            "2.5"
        );
    }

    #[test]
    fn dispatch_alert_template_includes_citations_and_deadline() {
        let renderer = TemplateRenderer::new();
        let (subject, body) = renderer
            .render_message(&MessageTemplate::for_type(NotificationType::DispatchAlert), &sample_context())
            .unwrap();
        assert_eq!(subject, "[CRITICAL] Animal welfare dispatch: dog at 100 Main St");
        assert!(body.contains("IMMEDIATE RESPONSE REQUIRED"));
        assert!(body.contains("Cal. Penal Code § 597.7"));
        assert!(body.contains("Respond by 2026-03-04T12:15:00Z"));
    }

    #[test]
    fn dispatch_alert_template_without_rule() {
        let renderer = TemplateRenderer::new();
        let mut ctx = sample_context();
        ctx.rule_name = None;
        ctx.citations.clear();
        ctx.requires_immediate = false;
        let (_, body) = renderer
            .render_message(&MessageTemplate::for_type(NotificationType::DispatchAlert), &ctx)
            .unwrap();
        assert!(!body.contains("Law:"));
        assert!(!body.contains("Citations:"));
        assert!(!body.contains("IMMEDIATE"));
    }

    #[test]
    fn every_builtin_template_renders() {
        let renderer = TemplateRenderer::new();
        for t in [
            NotificationType::DispatchAlert,
            NotificationType::DispatchReminder,
            NotificationType::DispatchEscalation,
            NotificationType::PoliceNotice,
            NotificationType::StatusUpdate,
            NotificationType::System,
        ] {
            let tmpl = MessageTemplate::for_type(t);
            assert!(renderer.render_message(&tmpl, &sample_context()).is_ok(), "{t}");
        }
    }

    #[test]
    fn invalid_template_produces_error() {
        let renderer = TemplateRenderer::new();
        match renderer.render("{{ unclosed", &sample_context()).unwrap_err() {
            NotifyError::Template(msg) => assert!(!msg.is_empty()),
            other => panic!("Expected Template error, got: {:?}", other),
        }
        assert!(renderer.validate("{{ unclosed").is_err());
        assert!(renderer.validate("Hello {{ species }}").is_ok());
    }
}
