//! Domain model structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row, plus `Deserialize` DTOs where the row is written from
//! operator input.

pub mod activity;
pub mod campaign;
pub mod campaign_recipient;
pub mod contact;
pub mod status;
pub mod template;
