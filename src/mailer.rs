use std::env;

use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid email address: {0}")]
    InvalidAddress(String),
    #[error("failed to build email: {0}")]
    Build(String),
    #[error("smtp delivery failed: {0}")]
    Send(String),
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

impl SmtpSettings {
    /// Returns `None` unless host, port, user and password are all present,
    /// leaving the dispatcher in its reported-but-not-fatal unconfigured
    /// state.
    pub fn from_env() -> Option<Self> {
        Self::from_parts(
            env::var("SMTP_HOST").ok(),
            env::var("SMTP_PORT").ok(),
            env::var("SMTP_USER").ok(),
            env::var("SMTP_PASS").ok(),
        )
    }

    fn from_parts(
        host: Option<String>,
        port: Option<String>,
        user: Option<String>,
        pass: Option<String>,
    ) -> Option<Self> {
        let host = host.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())?;
        let port = port.and_then(|v| v.trim().parse::<u16>().ok())?;
        let user = user.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())?;
        let pass = pass.filter(|v| !v.is_empty())?;
        Some(Self {
            host,
            port,
            user,
            pass,
        })
    }
}

#[derive(Debug, Clone)]
pub struct OutboundAlert {
    pub from: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub message: String,
}

#[async_trait]
pub trait AlertTransport: Send + Sync {
    async fn deliver(&self, alert: &OutboundAlert) -> Result<(), TransportError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> Result<Self, TransportError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .map_err(|err| TransportError::Build(err.to_string()))?
            .credentials(Credentials::new(
                settings.user.clone(),
                settings.pass.clone(),
            ))
            .port(settings.port)
            .build();
        Ok(Self { transport })
    }
}

#[async_trait]
impl AlertTransport for SmtpMailer {
    async fn deliver(&self, alert: &OutboundAlert) -> Result<(), TransportError> {
        let from: Mailbox = alert
            .from
            .parse()
            .map_err(|_| TransportError::InvalidAddress(alert.from.clone()))?;

        let mut builder = Message::builder().from(from).subject(alert.subject.clone());
        for recipient in &alert.recipients {
            let to: Mailbox = recipient
                .parse()
                .map_err(|_| TransportError::InvalidAddress(recipient.clone()))?;
            builder = builder.to(to);
        }

        let email = builder
            .multipart(MultiPart::alternative_plain_html(
                alert.message.clone(),
                html_body(&alert.message),
            ))
            .map_err(|err| TransportError::Build(err.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|err| TransportError::Send(err.to_string()))?;
        Ok(())
    }
}

pub fn html_body(message: &str) -> String {
    let escaped = message
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!("<p>{}</p>", escaped.replace('\n', "<br>"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_require_every_field() {
        let full = SmtpSettings::from_parts(
            Some("smtp.x.com".into()),
            Some("587".into()),
            Some("robo@x.com".into()),
            Some("secret".into()),
        );
        assert!(full.is_some());

        let missing_pass = SmtpSettings::from_parts(
            Some("smtp.x.com".into()),
            Some("587".into()),
            Some("robo@x.com".into()),
            None,
        );
        assert!(missing_pass.is_none());

        let bad_port = SmtpSettings::from_parts(
            Some("smtp.x.com".into()),
            Some("not-a-port".into()),
            Some("robo@x.com".into()),
            Some("secret".into()),
        );
        assert!(bad_port.is_none());

        let blank_host = SmtpSettings::from_parts(
            Some("  ".into()),
            Some("587".into()),
            Some("robo@x.com".into()),
            Some("secret".into()),
        );
        assert!(blank_host.is_none());
    }

    #[test]
    fn html_body_escapes_and_breaks_lines() {
        assert_eq!(
            html_body("a < b & c > d\nnext"),
            "<p>a &lt; b &amp; c &gt; d<br>next</p>"
        );
    }
}
