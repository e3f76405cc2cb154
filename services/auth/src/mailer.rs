//! Outgoing account emails
//!
//! Codes go out over SMTP through lettre. The log mailer only stands in
//! when `HOP_LOG_MAILER` is set for local development, and it never writes
//! the code itself.

use anyhow::{Context, Result};
use axum::async_trait;
use lettre::{
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::CodePurpose;

const DEFAULT_FROM: &str = "House of Paradise <no-reply@houseofparadise.com>";

/// Errors that can occur when sending email
#[derive(Debug, Error)]
pub enum MailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
}

/// Delivers one-time codes to users
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_code(
        &self,
        email: &str,
        name: &str,
        code: &str,
        purpose: CodePurpose,
    ) -> Result<(), MailError>;
}

/// SMTP relay settings
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

impl SmtpConfig {
    /// Read the relay settings from the environment
    ///
    /// # Environment Variables
    /// - `SMTP_HOST`: relay host (required)
    /// - `SMTP_PORT`: STARTTLS port (default: 587)
    /// - `SMTP_USERNAME` / `SMTP_PASSWORD`: relay credentials, both or neither
    /// - `SMTP_FROM`: sender mailbox (default: "House of Paradise <no-reply@houseofparadise.com>")
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("SMTP_HOST")
            .context("SMTP_HOST must be set unless HOP_LOG_MAILER is enabled")?;

        let port = match std::env::var("SMTP_PORT") {
            Ok(port) => port.parse().context("SMTP_PORT must be a port number")?,
            Err(_) => 587,
        };

        let username = std::env::var("SMTP_USERNAME").ok().filter(|v| !v.is_empty());
        let password = std::env::var("SMTP_PASSWORD").ok().filter(|v| !v.is_empty());
        if username.is_some() != password.is_some() {
            anyhow::bail!("SMTP_USERNAME and SMTP_PASSWORD must be set together");
        }

        let from = std::env::var("SMTP_FROM").unwrap_or_else(|_| DEFAULT_FROM.to_string());

        Ok(SmtpConfig {
            host,
            port,
            username,
            password,
            from,
        })
    }
}

fn subject(purpose: CodePurpose) -> &'static str {
    match purpose {
        CodePurpose::EmailVerification => "Verify your House of Paradise account",
        CodePurpose::PasswordReset => "Reset your House of Paradise password",
        CodePurpose::AccountUnlock => "Unlock your House of Paradise account",
        CodePurpose::EmailChange => "Confirm your new House of Paradise email address",
    }
}

fn body(name: &str, code: &str, purpose: CodePurpose) -> String {
    let action = match purpose {
        CodePurpose::EmailVerification => "verify your email address",
        CodePurpose::PasswordReset => "reset your password",
        CodePurpose::AccountUnlock => "unlock your account",
        CodePurpose::EmailChange => "confirm your new email address",
    };

    format!(
        "Hello {name},\n\n\
         Use this code to {action}:\n\n\
         {code}\n\n\
         The code expires in {} minutes.\n\
         If you did not ask for it, you can ignore this email.\n\n\
         House of Paradise\n",
        purpose.lifetime().num_minutes()
    )
}

/// Build the email carrying `code` to `email`
pub fn compose(
    from: &Mailbox,
    email: &str,
    name: &str,
    code: &str,
    purpose: CodePurpose,
) -> Result<Message, MailError> {
    let address: Address = email
        .parse()
        .map_err(|_| MailError::InvalidAddress(email.to_string()))?;

    let message = Message::builder()
        .from(from.clone())
        .to(Mailbox::new(Some(name.to_string()), address))
        .subject(subject(purpose))
        .header(ContentType::TEXT_PLAIN)
        .body(body(name, code, purpose))?;

    Ok(message)
}

/// Sends codes through an SMTP relay with STARTTLS
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let from = config
            .from
            .parse()
            .map_err(|_| MailError::InvalidAddress(config.from.clone()))?;

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?.port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        info!("SMTP mailer configured for {}:{}", config.host, config.port);
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_code(
        &self,
        email: &str,
        name: &str,
        code: &str,
        purpose: CodePurpose,
    ) -> Result<(), MailError> {
        let message = compose(&self.from, email, name, code, purpose)?;
        self.transport.send(message).await?;
        info!("Sent {} code to {}", purpose.as_str(), email);
        Ok(())
    }
}

/// Records that a code was issued without delivering it
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_code(
        &self,
        email: &str,
        _name: &str,
        _code: &str,
        purpose: CodePurpose,
    ) -> Result<(), MailError> {
        warn!(
            "Email delivery disabled; {} code for {} was not sent",
            purpose.as_str(),
            email
        );
        Ok(())
    }
}
