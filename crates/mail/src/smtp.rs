//! Campaign mail delivery via SMTP.
//!
//! [`SmtpMailer`] wraps the `lettre` async SMTP transport. The transport is
//! built once and reused for every message of every batch. Configuration is
//! loaded from environment variables; if `SMTP_HOST` is not set,
//! [`EmailConfig::from_env`] returns `None` and [`DisabledTransport`] should be
//! used instead, which reports the transport as unavailable.

use std::time::Duration;

use async_trait::async_trait;
use clinic_core::mail::{MailTransport, OutgoingEmail, SendError};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::response::{Category, Code, Detail, Severity};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for building the transport or a message.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `SMTP_FROM` is not set.
const DEFAULT_FROM_ADDRESS: &str = "noreply@clinic.local";

/// Default per-command SMTP timeout in seconds.
const DEFAULT_SMTP_TIMEOUT_SECS: u64 = 30;

/// Configuration for the SMTP transport.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// SMTP server hostname.
    pub smtp_host: String,
    /// SMTP server port (defaults to 587).
    pub smtp_port: u16,
    /// Sender used when a campaign has no `from_email` of its own.
    pub from_address: String,
    /// Optional SMTP username.
    pub smtp_user: Option<String>,
    /// Optional SMTP password.
    pub smtp_password: Option<String>,
    /// Applied by lettre to every SMTP command.
    pub timeout: Duration,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `SMTP_HOST` is not set, signalling that no mailer
    /// should be constructed.
    ///
    /// | Variable            | Required | Default                |
    /// |---------------------|----------|------------------------|
    /// | `SMTP_HOST`         | yes      |                        |
    /// | `SMTP_PORT`         | no       | `587`                  |
    /// | `SMTP_FROM`         | no       | `noreply@clinic.local` |
    /// | `SMTP_USER`         | no       |                        |
    /// | `SMTP_PASSWORD`     | no       |                        |
    /// | `SMTP_TIMEOUT_SECS` | no       | `30`                   |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
            timeout: Duration::from_secs(
                std::env::var("SMTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_SMTP_TIMEOUT_SECS),
            ),
        })
    }
}

// ---------------------------------------------------------------------------
// SmtpMailer
// ---------------------------------------------------------------------------

/// Delivers campaign messages over SMTP.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    default_from: Mailbox,
}

impl SmtpMailer {
    /// Build the pooled transport from configuration.
    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .timeout(Some(config.timeout));

        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            default_from: config.from_address.parse()?,
        })
    }

    /// Assemble the MIME message for one recipient.
    pub fn build_message(&self, email: &OutgoingEmail) -> Result<Message, EmailError> {
        let from = match &email.from {
            Some(from) => from.parse::<Mailbox>()?,
            None => self.default_from.clone(),
        };
        let mut builder = Message::builder()
            .from(from)
            .to(email.to.parse::<Mailbox>()?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_HTML);
        if let Some(reply_to) = &email.reply_to {
            builder = builder.reply_to(reply_to.parse::<Mailbox>()?);
        }
        builder
            .body(email.html.clone())
            .map_err(|e| EmailError::Build(e.to_string()))
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn check_available(&self) -> Result<(), SendError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SendError::Unavailable(
                "SMTP server did not accept the connection".to_string(),
            )),
            Err(e) => Err(SendError::Unavailable(e.to_string())),
        }
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), SendError> {
        let message = self
            .build_message(email)
            .map_err(|e| SendError::Rejected(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| classify_smtp_error(&e))?;

        tracing::debug!(to = %email.to, "Campaign email sent");
        Ok(())
    }
}

/// Only replies about this recipient's mailbox, and local message errors,
/// fail the recipient. Connection, TLS and timeout errors and relay-wide
/// replies mean the transport is down and the row stays pending.
fn classify_smtp_error(err: &lettre::transport::smtp::Error) -> SendError {
    let reason = err.to_string();
    match err.status() {
        Some(code) if is_recipient_reply(code) => SendError::Rejected(reason),
        Some(_) => SendError::Unavailable(reason),
        None if err.is_client() => SendError::Rejected(reason),
        None => SendError::Unavailable(reason),
    }
}

/// Whether an SMTP error reply concerns the recipient rather than the relay.
///
/// - 5xx: rejected, except x2x connection replies (521, 554 on connect) and
///   53x authentication replies, which would fail every recipient alike.
/// - 450 (mailbox busy or unavailable): rejected.
/// - Every other 4xx (421 closing channel, 451 local error or rate limit,
///   452 insufficient storage, 454 TLS unavailable): relay-wide.
fn is_recipient_reply(code: Code) -> bool {
    match code.severity {
        Severity::PermanentNegativeCompletion => !matches!(
            code.category,
            Category::Connections | Category::Unspecified3
        ),
        Severity::TransientNegativeCompletion => {
            matches!((code.category, code.detail), (Category::MailSystem, Detail::Zero))
        }
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// DisabledTransport
// ---------------------------------------------------------------------------

/// Stand-in used when SMTP is not configured. Every dispatch fails fast with
/// `TransportUnavailable` and no recipient row is touched.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledTransport;

#[async_trait]
impl MailTransport for DisabledTransport {
    async fn check_available(&self) -> Result<(), SendError> {
        Err(SendError::Unavailable("SMTP is not configured".to_string()))
    }

    async fn send(&self, _email: &OutgoingEmail) -> Result<(), SendError> {
        Err(SendError::Unavailable("SMTP is not configured".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn config() -> EmailConfig {
        EmailConfig {
            smtp_host: "localhost".to_string(),
            smtp_port: 2525,
            from_address: "news@clinic.example".to_string(),
            smtp_user: None,
            smtp_password: None,
            timeout: Duration::from_secs(5),
        }
    }

    fn email(to: &str) -> OutgoingEmail {
        OutgoingEmail {
            to: to.to_string(),
            subject: "Spring newsletter".to_string(),
            html: "<p>Hello</p>".to_string(),
            from: None,
            reply_to: None,
        }
    }

    fn reply(severity: Severity, category: Category, detail: Detail) -> bool {
        is_recipient_reply(Code::new(severity, category, detail))
    }

    #[test]
    fn mailbox_replies_fail_the_recipient() {
        use Severity::*;
        // 550 mailbox unavailable, 553 bad address, 552 over quota, 450 busy.
        assert!(reply(PermanentNegativeCompletion, Category::MailSystem, Detail::Zero));
        assert!(reply(PermanentNegativeCompletion, Category::MailSystem, Detail::Three));
        assert!(reply(PermanentNegativeCompletion, Category::MailSystem, Detail::Two));
        assert!(reply(TransientNegativeCompletion, Category::MailSystem, Detail::Zero));
        // 501 bad recipient syntax.
        assert!(reply(PermanentNegativeCompletion, Category::Syntax, Detail::One));
    }

    #[test]
    fn relay_wide_replies_mean_transport_down() {
        use Severity::*;
        // 421 closing channel, 451 local error, 452 insufficient storage.
        assert!(!reply(TransientNegativeCompletion, Category::Connections, Detail::One));
        assert!(!reply(TransientNegativeCompletion, Category::MailSystem, Detail::One));
        assert!(!reply(TransientNegativeCompletion, Category::MailSystem, Detail::Two));
        // 454 TLS not available.
        assert!(!reply(TransientNegativeCompletion, Category::MailSystem, Detail::Four));
        // 535 authentication failed, 521 does not accept mail.
        assert!(!reply(PermanentNegativeCompletion, Category::Unspecified3, Detail::Five));
        assert!(!reply(PermanentNegativeCompletion, Category::Connections, Detail::One));
    }

    #[test]
    fn email_error_display_build() {
        let err = EmailError::Build("missing body".to_string());
        assert_eq!(err.to_string(), "Email build error: missing body");
    }

    #[test]
    fn email_error_display_address() {
        let addr_err: Result<lettre::Address, _> = "not-an-email".parse();
        let err = EmailError::Address(addr_err.unwrap_err());
        assert!(err.to_string().contains("Email address parse error"));
    }

    #[tokio::test]
    async fn builds_message_with_default_sender() {
        let mailer = SmtpMailer::new(&config()).unwrap();
        let message = mailer.build_message(&email("ann@clinic.example")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("From: news@clinic.example"));
        assert!(raw.contains("To: ann@clinic.example"));
        assert!(raw.contains("text/html"));
    }

    #[tokio::test]
    async fn builds_message_with_campaign_sender_and_reply_to() {
        let mailer = SmtpMailer::new(&config()).unwrap();
        let mut outgoing = email("ann@clinic.example");
        outgoing.from = Some("Clinic <hello@clinic.example>".to_string());
        outgoing.reply_to = Some("desk@clinic.example".to_string());
        let raw = String::from_utf8(mailer.build_message(&outgoing).unwrap().formatted()).unwrap();
        assert!(raw.contains("hello@clinic.example"));
        assert!(raw.contains("Reply-To: desk@clinic.example"));
    }

    #[tokio::test]
    async fn invalid_recipient_is_rejected_without_contacting_server() {
        let mailer = SmtpMailer::new(&config()).unwrap();
        let result = mailer.send(&email("not-an-address")).await;
        assert_matches!(result, Err(SendError::Rejected(_)));
    }

    #[tokio::test]
    async fn disabled_transport_is_unavailable() {
        assert_matches!(
            DisabledTransport.check_available().await,
            Err(SendError::Unavailable(_))
        );
        assert_matches!(
            DisabledTransport.send(&email("ann@clinic.example")).await,
            Err(SendError::Unavailable(_))
        );
    }
}
