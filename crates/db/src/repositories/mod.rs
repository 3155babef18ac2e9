//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` (or an open transaction) as the first argument.

pub mod activity_repo;
pub mod campaign_recipient_repo;
pub mod campaign_repo;
pub mod contact_repo;
pub mod template_repo;

pub use activity_repo::ActivityRepo;
pub use campaign_recipient_repo::CampaignRecipientRepo;
pub use campaign_repo::CampaignRepo;
pub use contact_repo::ContactRepo;
pub use template_repo::TemplateRepo;
