//! Mail collaborator seams.
//!
//! The dispatch engine never talks SMTP or loads templates itself. It goes
//! through [`MailTransport`] and [`TemplateRenderer`], implemented by the
//! `clinic-mail` crate in production and by fakes in tests.

use std::collections::BTreeMap;

use async_trait::async_trait;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A fully personalised message ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    /// `"Name <address>"` or a bare address. `None` uses the transport default.
    pub from: Option<String>,
    pub reply_to: Option<String>,
}

/// Output of a template render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure reported by a [`MailTransport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The transport itself cannot be reached. Nothing was attempted.
    #[error("Mail transport unavailable: {0}")]
    Unavailable(String),

    /// The message was attempted and refused for this recipient.
    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

/// Failure reported by a [`TemplateRenderer`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// No template exists under the slug, for any locale.
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// The template exists but could not be rendered for these variables.
    #[error("Template render failed: {0}")]
    Invalid(String),

    /// The template source could not be consulted at all.
    #[error("Template store unavailable: {0}")]
    Unavailable(String),
}

impl RenderError {
    /// Whether the failure applies to every recipient rather than just one.
    pub fn is_campaign_wide(&self) -> bool {
        matches!(self, RenderError::TemplateNotFound(_) | RenderError::Unavailable(_))
    }
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Outbound mail transport. Implementations apply their own per-message timeout.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Cheap reachability check run once before a batch.
    async fn check_available(&self) -> Result<(), SendError>;

    /// Deliver one message.
    async fn send(&self, email: &OutgoingEmail) -> Result<(), SendError>;
}

/// Renders a stored template for one recipient.
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render(
        &self,
        template_slug: &str,
        variables: &BTreeMap<String, String>,
        locale: &str,
    ) -> Result<RenderedEmail, RenderError>;
}

// ---------------------------------------------------------------------------
// Variable substitution
// ---------------------------------------------------------------------------

/// Replace every `{{name}}` placeholder with its value.
///
/// Unknown placeholders are left untouched.
pub fn replace_variables(template: &str, variables: &BTreeMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in variables {
        result = result.replace(&format!("{{{{{key}}}}}"), value);
    }
    result
}

/// Format a sender header from an optional display name and address.
pub fn format_mailbox(name: Option<&str>, address: &str) -> String {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("{name} <{address}>"),
        None => address.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn replaces_all_occurrences() {
        let out = replace_variables(
            "Hi {{firstName}}, {{firstName}}!",
            &vars(&[("firstName", "Ann")]),
        );
        assert_eq!(out, "Hi Ann, Ann!");
    }

    #[test]
    fn unknown_placeholders_are_kept() {
        let out = replace_variables("Hi {{nickname}}", &vars(&[("firstName", "Ann")]));
        assert_eq!(out, "Hi {{nickname}}");
    }

    #[test]
    fn mailbox_with_and_without_name() {
        assert_eq!(
            format_mailbox(Some("Clinic"), "news@clinic.example"),
            "Clinic <news@clinic.example>"
        );
        assert_eq!(format_mailbox(Some(" "), "news@clinic.example"), "news@clinic.example");
        assert_eq!(format_mailbox(None, "news@clinic.example"), "news@clinic.example");
    }

    #[test]
    fn send_error_display() {
        let err = SendError::Rejected("550 mailbox unavailable".into());
        assert_eq!(err.to_string(), "Delivery rejected: 550 mailbox unavailable");
    }
}
