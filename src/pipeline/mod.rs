//! Pipeline entry points.
//!
//! - `run_archive`: Archive one account's timeline
//! - `run_accounts`: Archive several accounts with a shared mirror pool

pub mod archive;

pub use archive::{run_accounts, run_archive};
