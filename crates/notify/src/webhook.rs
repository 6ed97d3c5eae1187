//! HTTP gateway carrier.
//!
//! Posts outbound messages as JSON to a delivery gateway (an SMS/voice/email
//! relay) with optional custom headers and request body templates.

use std::collections::HashMap;
use std::sync::Arc;

use crate::carrier::{CarrierError, CarrierReceipt, MessageCarrier, OutboundMessage};
use crate::error::NotifyError;
use crate::templating::TemplateRenderer;

/// Delivers outbound messages as JSON over HTTP to a configured gateway.
///
/// Environment variable references (`${VAR_NAME}`) in the URL and header
/// values are resolved at construction time.
#[derive(Debug)]
pub struct WebhookCarrier {
    /// Target URL (env vars already resolved).
    url: String,
    method: reqwest::Method,
    headers: HashMap<String, String>,
    /// Optional minijinja body template rendered with the outbound
    /// message; otherwise the message is serialized as JSON directly.
    body_template: Option<String>,
    renderer: Arc<TemplateRenderer>,
    client: reqwest::Client,
}

impl WebhookCarrier {
    /// Create a new gateway carrier. `method` defaults to `POST`.
    pub fn new(
        url: String,
        method: Option<reqwest::Method>,
        headers: HashMap<String, String>,
        body_template: Option<String>,
        renderer: Arc<TemplateRenderer>,
    ) -> Result<Self, NotifyError> {
        let resolved_url = resolve_env_vars(&url)?;

        let mut resolved_headers = HashMap::with_capacity(headers.len());
        for (key, value) in &headers {
            resolved_headers.insert(key.clone(), resolve_env_vars(value)?);
        }

        if let Some(ref tmpl) = body_template {
            renderer
                .validate(tmpl)
                .map_err(|e| NotifyError::Config(format!("invalid body template: {e}")))?;
        }

        Ok(Self {
            url: resolved_url,
            method: method.unwrap_or(reqwest::Method::POST),
            headers: resolved_headers,
            body_template,
            renderer,
            client: reqwest::Client::new(),
        })
    }

    /// Construct from config-level primitives; `method` is parsed case-insensitively.
    pub fn from_config(
        url: String,
        method: Option<String>,
        headers: Option<HashMap<String, String>>,
        body_template: Option<String>,
        renderer: Arc<TemplateRenderer>,
    ) -> Result<Self, NotifyError> {
        let parsed_method = match method {
            Some(m) => {
                let upper = m.to_uppercase();
                upper
                    .parse::<reqwest::Method>()
                    .map(Some)
                    .map_err(|_| NotifyError::Config(format!("invalid HTTP method: {m}")))?
            }
            None => None,
        };

        Self::new(
            url,
            parsed_method,
            headers.unwrap_or_default(),
            body_template,
            renderer,
        )
    }

    fn render_body(&self, message: &OutboundMessage) -> Result<String, CarrierError> {
        match &self.body_template {
            Some(tmpl) => self
                .renderer
                .render(tmpl, message)
                .map_err(|e| CarrierError::Config(e.to_string())),
            None => serde_json::to_string(message)
                .map_err(|e| CarrierError::Config(format!("failed to serialize message: {e}"))),
        }
    }
}

#[async_trait::async_trait]
impl MessageCarrier for WebhookCarrier {
    async fn send(&self, message: &OutboundMessage) -> Result<CarrierReceipt, CarrierError> {
        if message.address.trim().is_empty() {
            return Err(CarrierError::InvalidAddress(message.address.clone()));
        }

        let body = self.render_body(message)?;

        let mut request = self
            .client
            .request(self.method.clone(), &self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);

        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(CarrierError::RateLimited { retry_after_secs });
        }

        let body_text = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());

        if !status.is_success() {
            tracing::warn!(
                url = %self.url,
                %status,
                body = %body_text,
                notification_id = %message.notification_id,
                "gateway returned non-2xx status"
            );
            if status.is_server_error() {
                return Err(CarrierError::Unavailable(format!("gateway returned {status}")));
            }
            return Err(CarrierError::Rejected {
                status: status.as_u16(),
                body: body_text,
            });
        }

        tracing::debug!(
            url = %self.url,
            method = %self.method,
            %status,
            notification_id = %message.notification_id,
            channel = %message.channel,
            "gateway accepted message"
        );

        Ok(receipt_from_body(&body_text, message))
    }

    fn carrier_name(&self) -> &str {
        "webhook"
    }
}

/// Pull the provider's message id from a JSON response, falling back to
/// the notification id when the gateway returns none.
fn receipt_from_body(body: &str, message: &OutboundMessage) -> CarrierReceipt {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    CarrierReceipt {
        provider_id: field("id")
            .or_else(|| field("message_id"))
            .unwrap_or_else(|| message.notification_id.to_string()),
        provider_status: field("status").unwrap_or_else(|| "accepted".to_string()),
    }
}

/// Resolve `${VAR_NAME}` patterns in a string using `std::env::var`.
fn resolve_env_vars(input: &str) -> Result<String, NotifyError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                var_name.push(c);
            }
            if !closed {
                return Err(NotifyError::Config(format!(
                    "unclosed env var reference in: {input}"
                )));
            }
            let value = std::env::var(&var_name).map_err(|_| {
                NotifyError::Config(format!("env var not found: {var_name}"))
            })?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Channel, NotificationPriority};

    fn message() -> OutboundMessage {
        OutboundMessage {
            notification_id: uuid::Uuid::new_v4(),
            channel: Channel::Sms,
            address: "+15550100".to_string(),
            subject: "Dispatch".to_string(),
            body: "Dog in hot vehicle".to_string(),
            priority: NotificationPriority::Critical,
        }
    }

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("GATEWAY_TEST_HOST", "gateway.example.com");
        let result = resolve_env_vars("https://${GATEWAY_TEST_HOST}/send").unwrap();
        assert_eq!(result, "https://gateway.example.com/send");
        std::env::remove_var("GATEWAY_TEST_HOST");
    }

    #[test]
    fn resolve_env_vars_missing() {
        match resolve_env_vars("https://${ABSOLUTELY_NOT_SET_12345}/send").unwrap_err() {
            NotifyError::Config(msg) => assert!(msg.contains("ABSOLUTELY_NOT_SET_12345")),
            other => panic!("expected Config error, got: {other:?}"),
        }
    }

    #[test]
    fn resolve_env_vars_unclosed() {
        match resolve_env_vars("https://${UNCLOSED/send").unwrap_err() {
            NotifyError::Config(msg) => assert!(msg.contains("unclosed")),
            other => panic!("expected Config error, got: {other:?}"),
        }
    }

    #[test]
    fn from_config_methods() {
        let renderer = Arc::new(TemplateRenderer::new());
        let carrier =
            WebhookCarrier::from_config("https://example.com".into(), None, None, None, renderer.clone())
                .unwrap();
        assert_eq!(carrier.method, reqwest::Method::POST);

        let carrier = WebhookCarrier::from_config(
            "https://example.com".into(),
            Some("put".into()),
            None,
            None,
            renderer.clone(),
        )
        .unwrap();
        assert_eq!(carrier.method, reqwest::Method::PUT);

        let result = WebhookCarrier::from_config(
            "https://example.com".into(),
            Some("NOT_A_METHOD\0".into()),
            None,
            None,
            renderer,
        );
        assert!(result.is_err());
    }

    #[test]
    fn from_config_resolves_header_env_vars() {
        std::env::set_var("GW_API_KEY", "secret-key-123");
        let headers = HashMap::from([("X-Api-Key".to_string(), "${GW_API_KEY}".to_string())]);
        let carrier = WebhookCarrier::from_config(
            "https://example.com".into(),
            None,
            Some(headers),
            None,
            Arc::new(TemplateRenderer::new()),
        )
        .unwrap();
        assert_eq!(carrier.headers["X-Api-Key"], "secret-key-123");
        std::env::remove_var("GW_API_KEY");
    }

    #[test]
    fn invalid_body_template_is_rejected() {
        let result = WebhookCarrier::from_config(
            "https://example.com".into(),
            None,
            None,
            Some("{{ unclosed".into()),
            Arc::new(TemplateRenderer::new()),
        );
        match result.unwrap_err() {
            NotifyError::Config(msg) => assert!(msg.contains("invalid body template")),
            other => panic!("expected Config error, got: {other:?}"),
        }
    }

    #[test]
    fn body_template_renders_message_fields() {
        let carrier = WebhookCarrier::from_config(
            "https://example.com".into(),
            None,
            None,
            Some(r#"{"to":"{{ address }}","text":"{{ body }}"}"#.into()),
            Arc::new(TemplateRenderer::new()),
        )
        .unwrap();
        let body = carrier.render_body(&message()).unwrap();
        assert_eq!(body, r#"{"to":"+15550100","text":"Dog in hot vehicle"}"#);
    }

    #[test]
    fn default_body_is_message_json() {
        let carrier = WebhookCarrier::from_config(
            "https://example.com".into(),
            None,
            None,
            None,
            Arc::new(TemplateRenderer::new()),
        )
        .unwrap();
        let body: serde_json::Value = serde_json::from_str(&carrier.render_body(&message()).unwrap()).unwrap();
        assert_eq!(body["channel"], "sms");
        assert_eq!(body["priority"], "critical");
    }

    #[test]
    fn receipt_prefers_gateway_id() {
        let msg = message();
        let receipt = receipt_from_body(r#"{"message_id":"gw-42","status":"queued"}"#, &msg);
        assert_eq!(receipt.provider_id, "gw-42");
        assert_eq!(receipt.provider_status, "queued");

        let receipt = receipt_from_body("OK", &msg);
        assert_eq!(receipt.provider_id, msg.notification_id.to_string());
        assert_eq!(receipt.provider_status, "accepted");
    }

    #[test]
    fn carrier_name_is_webhook() {
        let carrier = WebhookCarrier::from_config(
            "https://example.com".into(),
            None,
            None,
            None,
            Arc::new(TemplateRenderer::new()),
        )
        .unwrap();
        assert_eq!(carrier.carrier_name(), "webhook");
    }
}
