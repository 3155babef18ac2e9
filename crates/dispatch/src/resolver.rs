//! Expands a campaign's targeting into the ordered recipient list.

use clinic_core::campaign::Targeting;
use clinic_db::models::contact::Contact;

use crate::error::DispatchError;
use crate::store::ContactDirectory;

/// Resolve `targeting` to subscribed contacts, ordered by id with duplicates
/// removed. Performs no writes.
pub async fn resolve_recipients(
    directory: &dyn ContactDirectory,
    targeting: Targeting,
) -> Result<Vec<Contact>, DispatchError> {
    let contacts = match targeting {
        Targeting::AllSubscribed => directory.subscribed_contacts().await?,
        Targeting::Group(group_id) => {
            if !directory.group_exists(group_id).await? {
                return Err(DispatchError::GroupNotFound(group_id));
            }
            directory.subscribed_group_members(group_id).await?
        }
    };

    let resolved = normalize(contacts);
    if resolved.is_empty() {
        return Err(DispatchError::EmptyRecipientSet);
    }
    Ok(resolved)
}

/// Sort by id, drop duplicates and anyone who is not subscribed.
fn normalize(mut contacts: Vec<Contact>) -> Vec<Contact> {
    contacts.retain(|c| c.subscribed);
    contacts.sort_by_key(|c| c.id);
    contacts.dedup_by_key(|c| c.id);
    contacts
}
