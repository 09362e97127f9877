use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::config::MailConfig;

/// Out-of-band mail delivery. Delivery is best-effort: callers log failures
/// and carry on, they never fail a request over a lost email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, text: &str, html: &str) -> anyhow::Result<()>;
}

/// Development sender: logs the message instead of delivering it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, text: &str, _html: &str) -> anyhow::Result<()> {
        info!(to = %to, subject = %subject, body = %text, "mail send stub");
        Ok(())
    }
}

/// Sends through an HTTP mail relay (Mailgun-style JSON endpoint).
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    from: String,
}

impl HttpMailer {
    pub fn new(endpoint: &str, from: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            from: from.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, text: &str, html: &str) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "from": self.from,
                "to": to,
                "subject": subject,
                "text": text,
                "html": html,
            }))
            .send()
            .await?;
        resp.error_for_status()?;
        info!(to = %to, subject = %subject, "mail relayed");
        Ok(())
    }
}

pub fn mailer_from_config(config: &MailConfig) -> std::sync::Arc<dyn Mailer> {
    match &config.endpoint {
        Some(endpoint) => std::sync::Arc::new(HttpMailer::new(endpoint, &config.from)),
        None => std::sync::Arc::new(LogMailer),
    }
}
