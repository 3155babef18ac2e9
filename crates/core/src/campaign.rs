//! Campaign delivery rules: targeting, batch partitioning math, and
//! validation of operator-supplied settings.
//!
//! Pure functions and constants used by the dispatch engine and the API.

use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Recipients per batch when the operator does not choose one.
pub const DEFAULT_BATCH_SIZE: i32 = 10;

/// Upper bound on recipients per batch. Larger batches defeat the throttle.
pub const MAX_BATCH_SIZE: i32 = 500;

/// Delay between batch starts when the operator does not choose one (5 min).
pub const DEFAULT_BATCH_INTERVAL_MS: i64 = 300_000;

/// Longest accepted delay between batch starts (24 h).
pub const MAX_BATCH_INTERVAL_MS: i64 = 86_400_000;

/// Locale used when a campaign does not specify one.
pub const DEFAULT_LOCALE: &str = "en-GB";

/// Maximum length of a campaign name.
const MAX_NAME_LEN: usize = 200;

/// Maximum length of a campaign subject line.
const MAX_SUBJECT_LEN: usize = 998;

// ---------------------------------------------------------------------------
// Targeting
// ---------------------------------------------------------------------------

/// Who a campaign is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Targeting {
    /// Subscribed members of one contact group.
    Group(DbId),
    /// Every subscribed contact.
    AllSubscribed,
}

impl Targeting {
    /// Interpret a campaign's `group_id` / `send_to_all` pair.
    ///
    /// Exactly one of the two must be set.
    pub fn from_parts(group_id: Option<DbId>, send_to_all: bool) -> Result<Self, CoreError> {
        match (group_id, send_to_all) {
            (Some(group_id), false) => Ok(Targeting::Group(group_id)),
            (None, true) => Ok(Targeting::AllSubscribed),
            (Some(_), true) => Err(CoreError::Validation(
                "A campaign cannot target a group and all contacts at the same time".to_string(),
            )),
            (None, false) => Err(CoreError::Validation(
                "A campaign must target a group or all subscribed contacts".to_string(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Batch math
// ---------------------------------------------------------------------------

/// Zero-based batch a recipient lands in, given its position in resolution order.
///
/// `batch_size` must be at least 1.
pub fn batch_number_for(index: usize, batch_size: i32) -> i32 {
    (index / batch_size.max(1) as usize) as i32
}

/// Number of batches needed for `total` recipients.
pub fn batch_count(total: i64, batch_size: i32) -> i64 {
    if total <= 0 {
        return 0;
    }
    let size = i64::from(batch_size.max(1));
    (total + size - 1) / size
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate recipients-per-batch. Must be in `1..=MAX_BATCH_SIZE`.
pub fn validate_batch_size(batch_size: i32) -> Result<(), CoreError> {
    if !(1..=MAX_BATCH_SIZE).contains(&batch_size) {
        return Err(CoreError::Validation(format!(
            "Batch size must be between 1 and {MAX_BATCH_SIZE}, got {batch_size}"
        )));
    }
    Ok(())
}

/// Validate the delay between batch starts. Must be in `0..=MAX_BATCH_INTERVAL_MS`.
pub fn validate_batch_interval_ms(interval_ms: i64) -> Result<(), CoreError> {
    if !(0..=MAX_BATCH_INTERVAL_MS).contains(&interval_ms) {
        return Err(CoreError::Validation(format!(
            "Batch interval must be between 0 and {MAX_BATCH_INTERVAL_MS} ms, got {interval_ms}"
        )));
    }
    Ok(())
}

/// Convert an operator-facing interval in minutes to milliseconds.
pub fn minutes_to_ms(minutes: i64) -> Result<i64, CoreError> {
    let ms = minutes.checked_mul(60_000).ok_or_else(|| {
        CoreError::Validation(format!("Batch interval of {minutes} minutes is out of range"))
    })?;
    validate_batch_interval_ms(ms)?;
    Ok(ms)
}

/// Validate the campaign name.
pub fn validate_name(name: &str) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation(
            "Campaign name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Campaign name must not exceed {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

/// Validate the subject line.
pub fn validate_subject(subject: &str) -> Result<(), CoreError> {
    if subject.trim().is_empty() {
        return Err(CoreError::Validation(
            "Campaign subject must not be empty".to_string(),
        ));
    }
    if subject.len() > MAX_SUBJECT_LEN {
        return Err(CoreError::Validation(format!(
            "Campaign subject must not exceed {MAX_SUBJECT_LEN} characters"
        )));
    }
    Ok(())
}

/// A campaign needs either a renderer template or an inline HTML body.
pub fn has_content(template_slug: Option<&str>, html_body: Option<&str>) -> bool {
    let present = |s: Option<&str>| s.is_some_and(|s| !s.trim().is_empty());
    present(template_slug) || present(html_body)
}

/// Minimal shape check for a sender or reply-to address.
pub fn validate_email_address(field: &str, address: &str) -> Result<(), CoreError> {
    let valid = match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !address.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(CoreError::Validation(format!(
            "{field} is not a valid email address: {address}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Personalisation
// ---------------------------------------------------------------------------

/// Build the per-recipient unsubscribe link.
pub fn unsubscribe_url(base_url: &str, email: &str) -> String {
    format!(
        "{}/unsubscribe?email={}",
        base_url.trim_end_matches('/'),
        encode_query_component(email)
    )
}

/// Variables available to templates and inline bodies for one recipient.
///
/// `recipientName` falls back to the email when the contact has no name.
pub fn recipient_variables(
    email: &str,
    first_name: Option<&str>,
    last_name: Option<&str>,
    base_url: &str,
) -> BTreeMap<String, String> {
    let first = first_name.unwrap_or_default().trim();
    let last = last_name.unwrap_or_default().trim();
    let full = [first, last]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    let recipient_name = if full.is_empty() { email.to_string() } else { full };

    BTreeMap::from([
        ("recipientName".to_string(), recipient_name),
        ("firstName".to_string(), first.to_string()),
        ("lastName".to_string(), last.to_string()),
        ("email".to_string(), email.to_string()),
        ("unsubscribeUrl".to_string(), unsubscribe_url(base_url, email)),
    ])
}

/// Percent-encode a query-string value (RFC 3986 unreserved set kept as-is).
fn encode_query_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- Targeting ------------------------------------------------------------

    #[test]
    fn targeting_group_only() {
        assert_eq!(Targeting::from_parts(Some(7), false).unwrap(), Targeting::Group(7));
    }

    #[test]
    fn targeting_all_only() {
        assert_eq!(
            Targeting::from_parts(None, true).unwrap(),
            Targeting::AllSubscribed
        );
    }

    #[test]
    fn targeting_both_rejected() {
        assert!(Targeting::from_parts(Some(7), true).is_err());
    }

    #[test]
    fn targeting_neither_rejected() {
        assert!(Targeting::from_parts(None, false).is_err());
    }

    // -- Batch math -----------------------------------------------------------

    #[test]
    fn batch_numbers_are_consecutive_runs() {
        let numbers: Vec<i32> = (0..23).map(|i| batch_number_for(i, 10)).collect();
        assert_eq!(numbers[0], 0);
        assert_eq!(numbers[9], 0);
        assert_eq!(numbers[10], 1);
        assert_eq!(numbers[19], 1);
        assert_eq!(numbers[20], 2);
        assert_eq!(numbers[22], 2);
    }

    #[test]
    fn batch_count_rounds_up() {
        assert_eq!(batch_count(23, 10), 3);
        assert_eq!(batch_count(20, 10), 2);
        assert_eq!(batch_count(1, 10), 1);
        assert_eq!(batch_count(0, 10), 0);
    }

    #[test]
    fn batch_size_of_one_gives_one_batch_per_recipient() {
        assert_eq!(batch_number_for(4, 1), 4);
        assert_eq!(batch_count(5, 1), 5);
    }

    // -- Validation -----------------------------------------------------------

    #[test]
    fn batch_size_bounds() {
        assert!(validate_batch_size(0).is_err());
        assert!(validate_batch_size(1).is_ok());
        assert!(validate_batch_size(MAX_BATCH_SIZE).is_ok());
        assert!(validate_batch_size(MAX_BATCH_SIZE + 1).is_err());
    }

    #[test]
    fn interval_bounds() {
        assert!(validate_batch_interval_ms(-1).is_err());
        assert!(validate_batch_interval_ms(0).is_ok());
        assert!(validate_batch_interval_ms(MAX_BATCH_INTERVAL_MS + 1).is_err());
    }

    #[test]
    fn minutes_convert_to_ms() {
        assert_eq!(minutes_to_ms(5).unwrap(), 300_000);
        assert!(minutes_to_ms(i64::MAX).is_err());
    }

    #[test]
    fn content_requires_template_or_body() {
        assert!(has_content(Some("NEWSLETTER"), None));
        assert!(has_content(None, Some("<p>Hi</p>")));
        assert!(!has_content(None, None));
        assert!(!has_content(Some("  "), Some("")));
    }

    #[test]
    fn email_shape_check() {
        assert!(validate_email_address("from_email", "support@clinic.example").is_ok());
        assert!(validate_email_address("from_email", "support").is_err());
        assert!(validate_email_address("from_email", "a b@clinic.example").is_err());
    }

    // -- Personalisation ------------------------------------------------------

    #[test]
    fn unsubscribe_url_encodes_email() {
        assert_eq!(
            unsubscribe_url("https://clinic.example/", "a+b@x.io"),
            "https://clinic.example/unsubscribe?email=a%2Bb%40x.io"
        );
    }

    #[test]
    fn recipient_name_falls_back_to_email() {
        let vars = recipient_variables("ann@x.io", None, None, "http://localhost");
        assert_eq!(vars["recipientName"], "ann@x.io");
        assert_eq!(vars["firstName"], "");
    }

    #[test]
    fn recipient_name_joins_parts() {
        let vars = recipient_variables("ann@x.io", Some("Ann"), Some("Lee"), "http://localhost");
        assert_eq!(vars["recipientName"], "Ann Lee");
        assert_eq!(vars["lastName"], "Lee");
    }
}
