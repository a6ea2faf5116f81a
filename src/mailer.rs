use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::EmailConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("provider rejected email with status {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// Resend-compatible HTTP email API.
pub struct HttpMailer {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            from: from.into(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        let resp = self
            .client
            .post(format!("{}/emails", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&SendRequest {
                from: &self.from,
                to: [&email.to],
                subject: &email.subject,
                html: &email.html,
            })
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(MailError::Rejected(resp.status().as_u16()));
        }
        Ok(())
    }
}

/// Used when no provider key is configured: emails only show up in the log.
#[derive(Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        info!(
            to = %email.to,
            subject = %email.subject,
            "email provider not configured; dropping email"
        );
        Ok(())
    }
}

pub fn build_mailer(cfg: &EmailConfig) -> Arc<dyn Mailer> {
    match &cfg.api_key {
        Some(key) => Arc::new(HttpMailer::new(cfg.api_base.clone(), key.clone(), cfg.from.clone())),
        None => Arc::new(LogMailer),
    }
}

/// Fire-and-forget send. The caller never learns whether delivery worked.
pub fn dispatch(mailer: Arc<dyn Mailer>, email: Email) {
    actix_web::rt::spawn(async move {
        let to = email.to.clone();
        if let Err(e) = mailer.send(email).await {
            warn!(%to, "email send failed: {e}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn email() -> Email {
        Email { to: "a@b.com".into(), subject: "Hi".into(), html: "<p>x</p>".into() }
    }

    #[actix_web::test]
    async fn posts_to_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(bearer_token("key"))
            .and(body_partial_json(serde_json::json!({"to": ["a@b.com"], "subject": "Hi"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "1"})))
            .expect(1)
            .mount(&server)
            .await;
        let mailer = HttpMailer::new(format!("{}/", server.uri()), "key", "from@x.com");
        mailer.send(email()).await.expect("sent");
    }

    #[actix_web::test]
    async fn provider_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;
        let mailer = HttpMailer::new(server.uri(), "key", "from@x.com");
        assert!(matches!(mailer.send(email()).await, Err(MailError::Rejected(422))));
    }
}
