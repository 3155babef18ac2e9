//! Status helper enums mapping to SMALLSERIAL/SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Look up a variant by its database status ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Seed `name` column value, used as the wire representation.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }

            /// Parse a seed `name` (case-insensitive).
            pub fn from_name(name: &str) -> Option<Self> {
                $(
                    if name.eq_ignore_ascii_case($label) {
                        return Some(Self::$variant);
                    }
                )+
                None
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.name())
            }
        }
    };
}

define_status_enum! {
    /// Campaign lifecycle status.
    CampaignStatus {
        Draft = 1 => "draft",
        Sending = 2 => "sending",
        Paused = 3 => "paused",
        Completed = 4 => "completed",
        Cancelled = 5 => "cancelled",
    }
}

define_status_enum! {
    /// Per-recipient delivery status.
    RecipientStatus {
        Pending = 1 => "pending",
        Sent = 2 => "sent",
        Failed = 3 => "failed",
    }
}

impl CampaignStatus {
    /// No transition is permitted out of a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn campaign_status_ids_match_seed_data() {
        assert_eq!(CampaignStatus::Draft.id(), 1);
        assert_eq!(CampaignStatus::Sending.id(), 2);
        assert_eq!(CampaignStatus::Paused.id(), 3);
        assert_eq!(CampaignStatus::Completed.id(), 4);
        assert_eq!(CampaignStatus::Cancelled.id(), 5);
    }

    #[test]
    fn recipient_status_ids_match_seed_data() {
        assert_eq!(RecipientStatus::Pending.id(), 1);
        assert_eq!(RecipientStatus::Sent.id(), 2);
        assert_eq!(RecipientStatus::Failed.id(), 3);
    }

    #[test]
    fn from_id_round_trips_and_rejects_unknown() {
        assert_eq!(CampaignStatus::from_id(3), Some(CampaignStatus::Paused));
        assert_eq!(CampaignStatus::from_id(0), None);
        assert_eq!(RecipientStatus::from_id(9), None);
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!(CampaignStatus::from_name("SENDING"), Some(CampaignStatus::Sending));
        assert_eq!(RecipientStatus::from_name("failed"), Some(RecipientStatus::Failed));
        assert_eq!(CampaignStatus::from_name("archived"), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(CampaignStatus::Completed.is_terminal());
        assert!(CampaignStatus::Cancelled.is_terminal());
        assert!(!CampaignStatus::Paused.is_terminal());
    }

    #[test]
    fn serializes_as_name() {
        let json = serde_json::to_string(&CampaignStatus::Sending).unwrap();
        assert_eq!(json, "\"sending\"");
    }
}
