//! Production mail collaborators for the campaign engine.
//!
//! [`smtp::SmtpMailer`] delivers through `lettre`'s async SMTP transport and
//! [`template::DbTemplateRenderer`] renders templates stored in
//! `email_templates`. Both implement the seams from `clinic_core::mail`.

pub mod smtp;
pub mod template;

pub use smtp::{DisabledTransport, EmailConfig, EmailError, SmtpMailer};
pub use template::DbTemplateRenderer;
