//! Clinic campaign domain primitives.
//!
//! Pure types, constants and validation rules shared by the database,
//! mail and dispatch crates. Nothing in here performs I/O; the async
//! collaborator seams in [`mail`] are only trait definitions.

pub mod campaign;
pub mod error;
pub mod mail;
pub mod types;
