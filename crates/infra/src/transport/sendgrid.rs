//! SendGrid v3 transport.

use std::time::Duration;

use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use super::{MailTransport, OutboundMessage, TransportError};

const DEFAULT_BASE_URL: &str = "https://api.sendgrid.com";

/// Posts messages to `/v3/mail/send` with open and click tracking enabled.
#[derive(Debug, Clone)]
pub struct SendGridTransport {
    client: Client,
    base_url: String,
}

impl SendGridTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

/// Request body for one message.
pub fn request_body(message: &OutboundMessage) -> Value {
    let mut content = vec![json!({ "type": "text/plain", "value": message.text })];
    if let Some(html) = &message.html {
        content.push(json!({ "type": "text/html", "value": html }));
    }

    let mut body = json!({
        "personalizations": [{ "to": [{ "email": message.to }] }],
        "from": { "email": message.from_email, "name": message.from_name },
        "subject": message.subject,
        "content": content,
        "tracking_settings": {
            "click_tracking": { "enable": true, "enable_text": true },
            "open_tracking": { "enable": true }
        }
    });

    if !message.reply_email.is_empty() {
        body["reply_to"] = json!({ "email": message.reply_email, "name": message.reply_name });
    }
    if !message.category.is_empty() {
        body["categories"] = json!([message.category]);
    }
    if !message.ip_pool.is_empty() {
        body["ip_pool_name"] = json!(message.ip_pool);
    }
    body
}

#[async_trait::async_trait]
impl MailTransport for SendGridTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<Option<String>, TransportError> {
        if message.api_token.is_empty() {
            return Err(TransportError::MissingCredentials);
        }

        let response = self
            .client
            .post(format!("{}/v3/mail/send", self.base_url))
            .bearer_auth(&message.api_token)
            .json(&request_body(message))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(email_id = %message.email_id, message_id = ?message_id, "provider accepted message");
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use warmsend_core::{EmailId, IdentityAttrs, SendingIdentity};

    fn message(html: Option<&str>) -> OutboundMessage {
        let identity = SendingIdentity::new(
            IdentityAttrs {
                api_token: "SG.key".into(),
                category: "newsletter".into(),
                ip_pool: "warm-pool".into(),
                from_email: "news@sender.test".into(),
                from_name: "News".into(),
                reply_email: "reply@sender.test".into(),
                reply_name: "Replies".into(),
            },
            Utc::now(),
        );
        OutboundMessage::new(
            &identity,
            EmailId::new(),
            "jane@example.com",
            "Hello",
            "plain body",
            html.map(str::to_string),
        )
    }

    #[test]
    fn body_carries_envelope_and_tracking() {
        let body = request_body(&message(None));
        assert_eq!(body["personalizations"][0]["to"][0]["email"], "jane@example.com");
        assert_eq!(body["from"]["email"], "news@sender.test");
        assert_eq!(body["reply_to"]["email"], "reply@sender.test");
        assert_eq!(body["categories"][0], "newsletter");
        assert_eq!(body["ip_pool_name"], "warm-pool");
        assert_eq!(body["tracking_settings"]["open_tracking"]["enable"], true);
        assert_eq!(body["content"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn html_part_only_when_present() {
        let body = request_body(&message(Some("<p>hi</p>")));
        let content = body["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[1]["type"], "text/html");

        let blank = message(Some("   "));
        assert!(blank.html.is_none());
    }

    #[tokio::test]
    async fn missing_token_fails_before_any_request() {
        let transport = SendGridTransport::with_base_url("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let mut msg = message(None);
        msg.api_token.clear();
        assert_eq!(transport.send(&msg).await, Err(TransportError::MissingCredentials));
    }
}
