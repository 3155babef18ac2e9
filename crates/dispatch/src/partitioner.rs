//! Splits a resolved recipient list into fixed-size batches.

use clinic_core::campaign::{batch_count, batch_number_for, MAX_BATCH_SIZE};
use clinic_db::models::campaign_recipient::RecipientSeed;
use clinic_db::models::contact::Contact;

use crate::error::DispatchError;
use crate::store::BatchPlan;

/// Assign `batch_number = index / batch_size` in resolution order.
pub fn partition(
    recipients: &[Contact],
    batch_size: i32,
) -> Result<(Vec<RecipientSeed>, BatchPlan), DispatchError> {
    if !(1..=MAX_BATCH_SIZE).contains(&batch_size) {
        return Err(DispatchError::InvalidBatchSize(batch_size));
    }

    let seeds: Vec<RecipientSeed> = recipients
        .iter()
        .enumerate()
        .map(|(index, contact)| RecipientSeed {
            contact_id: contact.id,
            batch_number: batch_number_for(index, batch_size),
        })
        .collect();

    let total = seeds.len() as i64;
    let plan = BatchPlan {
        recipients: total,
        batches: batch_count(total, batch_size),
    };
    Ok((seeds, plan))
}

/// Plan for rows that were enrolled earlier: `max(batch_number) + 1` batches.
pub fn plan_from_existing(recipients: i64, max_batch_number: Option<i32>) -> BatchPlan {
    BatchPlan {
        recipients,
        batches: max_batch_number.map_or(0, |max| i64::from(max) + 1),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;

    fn contacts(n: i64) -> Vec<Contact> {
        (1..=n)
            .map(|id| Contact {
                id,
                email: format!("c{id}@clinic.example"),
                first_name: None,
                last_name: None,
                subscribed: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn twenty_three_by_ten_gives_three_batches() {
        let (seeds, plan) = partition(&contacts(23), 10).unwrap();
        assert_eq!(plan, BatchPlan { recipients: 23, batches: 3 });
        assert_eq!(seeds[9].batch_number, 0);
        assert_eq!(seeds[10].batch_number, 1);
        assert_eq!(seeds[22].batch_number, 2);
        assert_eq!(seeds.iter().filter(|s| s.batch_number == 2).count(), 3);
    }

    #[test]
    fn batch_numbers_never_decrease() {
        let (seeds, _) = partition(&contacts(17), 4).unwrap();
        assert!(seeds.windows(2).all(|w| w[0].batch_number <= w[1].batch_number));
    }

    #[test]
    fn zero_batch_size_rejected() {
        assert_matches!(partition(&contacts(3), 0), Err(DispatchError::InvalidBatchSize(0)));
    }

    #[test]
    fn existing_plan_uses_highest_batch() {
        assert_eq!(plan_from_existing(23, Some(2)).batches, 3);
        assert_eq!(plan_from_existing(0, None).batches, 0);
    }
}
