//! services/api/src/adapters/email.rs
//!
//! SendGrid v3 adapter for the `EmailService` port.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};
use weather_to_ride_core::ports::{EmailService, PortError, PortResult};
use weather_to_ride_core::quota::UsageMeter;

use super::transport_error;

pub const PROVIDER: &str = "e-mail";

fn mail_body(from: &str, to: &str, subject: &str, html: &str) -> Value {
    json!({
        "personalizations": [{ "to": [{ "email": to }] }],
        "from": { "email": from },
        "subject": subject,
        "content": [{ "type": "text/html", "value": html }],
    })
}

#[derive(Clone)]
pub struct SendGridMailer {
    client: Client,
    base_url: String,
    key: Option<String>,
    from: String,
    meter: UsageMeter,
}

impl SendGridMailer {
    pub fn new(
        client: Client,
        base_url: String,
        key: Option<String>,
        from: String,
        meter: UsageMeter,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key,
            from,
            meter,
        }
    }
}

#[async_trait]
impl EmailService for SendGridMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> PortResult<()> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| PortError::Upstream("The e-mail API key is not configured.".into()))?;

        self.meter.charge().await?;

        let response = self
            .client
            .post(format!("{}/v3/mail/send", self.base_url))
            .bearer_auth(key)
            .json(&mail_body(&self.from, to, subject, html))
            .send()
            .await
            .map_err(|e| transport_error(e, "E-mail request", "Error while sending the e-mail."))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(%status, %detail, "E-mail API rejected the message");
            return Err(PortError::Upstream(format!(
                "The e-mail API responded with {status}."
            )));
        }

        info!(%subject, "E-mail sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_is_addressed_to_a_single_recipient() {
        let body = mail_body(
            "support@weathertoride.com",
            "rider@example.com",
            "Confirm your e-mail",
            "<p>Hi</p>",
        );
        assert_eq!(body["personalizations"][0]["to"][0]["email"], "rider@example.com");
        assert_eq!(body["from"]["email"], "support@weathertoride.com");
        assert_eq!(body["content"][0]["type"], "text/html");
        assert_eq!(body["content"][0]["value"], "<p>Hi</p>");
    }
}
