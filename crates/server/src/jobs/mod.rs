// crates/server/src/jobs/mod.rs
//! Background job scheduling: keyed idempotent creation, detached
//! execution, and the store seam the progress channel polls.

pub mod key;
pub mod runner;
pub mod store;

pub use runner::ProgressReporter;
pub use store::{JobStore, StoreError};
