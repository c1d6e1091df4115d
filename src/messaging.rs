//! Outbound email and SMS.
//!
//! Email goes over SMTP via lettre when configured. SMS has no provider yet,
//! so messages are only logged.

use std::sync::Arc;

use anyhow::Context;
use axum::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::ExposeSecret;
use tracing::info;

use crate::config::SmtpConfig;

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
    async fn send_sms(&self, phone: &str, body: &str) -> anyhow::Result<()>;
}

pub fn from_config(smtp: Option<&SmtpConfig>) -> anyhow::Result<Arc<dyn Messenger>> {
    Ok(match smtp {
        Some(cfg) => Arc::new(SmtpMessenger::new(cfg)?),
        None => {
            info!("SMTP not configured; emails will be logged only");
            Arc::new(LogMessenger)
        }
    })
}

#[derive(Clone)]
pub struct SmtpMessenger {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMessenger {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let credentials = Credentials::new(
            cfg.username.clone(),
            cfg.password.expose_secret().to_string(),
        );
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
            .context("smtp relay")?
            .port(cfg.port)
            .credentials(credentials)
            .build();
        Ok(Self {
            mailer,
            from_address: cfg.from_address.clone(),
        })
    }
}

#[async_trait]
impl Messenger for SmtpMessenger {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let email = Message::builder()
            .from(self.from_address.parse().context("invalid from address")?)
            .to(to.parse().context("invalid recipient address")?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("build email")?;

        self.mailer.send(email).await.context("smtp send")?;
        info!(to = %to, subject = %subject, "email sent");
        Ok(())
    }

    async fn send_sms(&self, phone: &str, body: &str) -> anyhow::Result<()> {
        LogMessenger.send_sms(phone, body).await
    }
}

/// Logs messages instead of delivering them.
#[derive(Clone, Copy)]
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        info!(to = %to, subject = %subject, body = %body, "email (not delivered)");
        Ok(())
    }

    async fn send_sms(&self, phone: &str, body: &str) -> anyhow::Result<()> {
        info!(phone = %phone, body = %body, "sms (mock)");
        Ok(())
    }
}
